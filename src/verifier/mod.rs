//! The verifier aggregate: configuration, store, JAR signer and clock,
//! with one method per operation of the presentation lifecycle.

use std::{fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::VerifierConfig;
use crate::core::identifiers::{RequestId, ResponseCode, TransactionId};
use crate::core::presentation::{Presentation, WalletResponseTO};
use crate::core::presentation_exchange::PresentationDefinition;
use crate::core::response::AuthorisationResponse;
use crate::error::{InitError, RequestObjectError, RetrievalError, SubmissionError};
use crate::store::PresentationStore;

pub mod request_builder;
pub mod request_object;
pub mod request_signer;
pub mod response;
pub mod retrieval;

pub use request_builder::{InitTransactionRequest, InitTransactionResponse};
pub use response::Accepted;

use request_signer::RequestSigner;

/// Time source, injectable so tests can move past `max_age`.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An OpenID4VP verifier back-end.
#[derive(Debug, Clone)]
pub struct Verifier {
    config: Arc<VerifierConfig>,
    store: Arc<dyn PresentationStore + Send + Sync>,
    signer: Arc<dyn RequestSigner + Send + Sync>,
    clock: Arc<dyn Clock>,
}

impl Verifier {
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    /// Open a presentation transaction on behalf of the Verifier
    /// front-end.
    pub async fn init_transaction(
        &self,
        request: InitTransactionRequest,
    ) -> Result<InitTransactionResponse, InitError> {
        request_builder::init_transaction(self, request).await
    }

    /// Hand the signed Request Object to the Wallet.
    ///
    /// Succeeds at most once per transaction; the successful fetch moves
    /// the presentation to `RequestObjectRetrieved`.
    pub async fn get_request_object(
        &self,
        request_id: &RequestId,
    ) -> Result<String, RequestObjectError> {
        request_object::get_request_object(self, request_id).await
    }

    /// The presentation definition behind `presentation_definition_uri`,
    /// for transactions that pass it by reference.
    pub async fn get_presentation_definition(
        &self,
        request_id: &RequestId,
    ) -> Option<PresentationDefinition> {
        match self.store.load_by_request_id(request_id).await? {
            Presentation::Requested(p) => p.presentation_type.presentation_definition().cloned(),
            Presentation::RequestObjectRetrieved(p) => {
                p.presentation_type.presentation_definition().cloned()
            }
            _ => None,
        }
    }

    /// Validate and commit the Wallet's Authorisation Response.
    pub async fn post_wallet_response(
        &self,
        response: AuthorisationResponse,
    ) -> Result<Option<Accepted>, SubmissionError> {
        response::post_wallet_response(self, response).await
    }

    /// Hand the stored wallet response to the Verifier front-end.
    pub async fn get_wallet_response(
        &self,
        transaction_id: &TransactionId,
        response_code: Option<&ResponseCode>,
    ) -> Result<WalletResponseTO, RetrievalError> {
        retrieval::get_wallet_response(self, transaction_id, response_code).await
    }

    /// Time out every live presentation older than `max_age`.
    ///
    /// Idempotent: records that already left the live lifecycle are
    /// skipped, and losing a compare-and-set to a concurrent handler is
    /// not an error. Returns the number of records transitioned. Adapters
    /// run this on whatever schedule suits them.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let stale = self.store.load_stale(now - self.config.max_age).await;

        let mut swept = 0;
        for presentation in stale {
            let expected = presentation.state();
            if let Ok(timed_out) = presentation.timeout(now) {
                if self.store.swap(expected, timed_out).await {
                    swept += 1;
                }
            }
        }
        if swept > 0 {
            debug!(count = swept, "presentations timed out");
        }
        swept
    }

    pub(crate) fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &(dyn PresentationStore + Send + Sync) {
        &*self.store
    }

    pub(crate) fn signer(&self) -> &(dyn RequestSigner + Send + Sync) {
        &*self.signer
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Builder struct for [Verifier].
#[derive(Debug, Default, Clone)]
pub struct VerifierBuilder {
    config: Option<VerifierConfig>,
    store: Option<Arc<dyn PresentationStore + Send + Sync>>,
    signer: Option<Arc<dyn RequestSigner + Send + Sync>>,
    clock: Option<Arc<dyn Clock>>,
}

impl VerifierBuilder {
    /// Build the verifier. Configuration inconsistencies fail here, before
    /// any transaction exists.
    pub fn build(self) -> Result<Verifier> {
        let Self {
            config,
            store,
            signer,
            clock,
        } = self;

        let Some(config) = config else {
            bail!("config is required, see `with_config`")
        };
        let Some(store) = store else {
            bail!("presentation store is required, see `with_store`")
        };
        let Some(signer) = signer else {
            bail!("request signer is required, see `with_signer`")
        };

        config.validate()?;

        Ok(Verifier {
            config: Arc::new(config),
            store,
            signer,
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PresentationStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner + Send + Sync>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}
