//! Server-side core of an [OpenID4VP] verifier: the party that requests
//! Verifiable Presentations from a Wallet and validates what comes back.
//!
//! [OpenID4VP]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Flow
//!
//! ```ignore
//! use std::sync::Arc;
//! use oid4vp_verifier::{
//!     store::MemoryStore,
//!     verifier::{request_signer::P256Signer, InitTransactionRequest, Verifier},
//! };
//!
//! let verifier = Verifier::builder()
//!     .with_config(config)
//!     .with_store(Arc::new(MemoryStore::default()))
//!     .with_signer(Arc::new(P256Signer::generate()?))
//!     .build()?;
//!
//! // 1. The front-end opens a transaction and receives a request_uri to
//! //    hand to the Wallet (QR code, deep link, ...).
//! let initiated = verifier.init_transaction(request).await?;
//!
//! // 2. The Wallet fetches the signed Request Object.
//! let jar = verifier.get_request_object(&request_id).await?;
//!
//! // 3. The Wallet posts its Authorisation Response; the core verifies
//! //    JARM, SD-JWTs, mdocs and ZKP challenges before committing.
//! let accepted = verifier.post_wallet_response(response).await?;
//!
//! // 4. The front-end collects the validated response.
//! let wallet_response = verifier
//!     .get_wallet_response(&initiated.transaction_id, response_code)
//!     .await?;
//! ```
//!
//! Each transaction walks a fixed lifecycle — `Requested` →
//! `RequestObjectRetrieved` → `Submitted` → consumption — with timeout as
//! the terminal escape hatch; see [core::presentation]. State transitions
//! are compare-and-set against the [store::PresentationStore], which makes
//! concurrent submissions produce exactly one winner.
//!
//! HTTP routing, configuration loading and persistence drivers live
//! outside this crate; [store::MemoryStore] covers the single-process
//! case and the traits at the seams ([store::PresentationStore],
//! [verifier::request_signer::RequestSigner], [verifier::Clock]) are the
//! replacement points.

pub mod config;
pub mod core;
pub mod error;
pub mod jarm;
pub mod store;
pub mod utils;
pub mod verification;
pub mod verifier;

pub use config::VerifierConfig;
pub use verifier::Verifier;
