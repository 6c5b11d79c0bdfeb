//! The presentation lifecycle, modeled as a tagged variant.
//!
//! State is data and transitions are total functions: each transition
//! consumes the current state value and produces the next one, so a record
//! can never be observed mid-transition. The store owns every record;
//! callers work on snapshots and commit them back explicitly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::identifiers::{Nonce, RequestId, ResponseCode, TransactionId};
use crate::core::presentation_exchange::{PresentationDefinition, PresentationSubmission};

/// Transport discipline for the Wallet's Authorisation Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    #[serde(rename = "direct_post")]
    DirectPost,
    #[serde(rename = "direct_post.jwt")]
    DirectPostJwt,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::DirectPost => f.write_str("direct_post"),
            ResponseMode::DirectPostJwt => f.write_str("direct_post.jwt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdTokenType {
    #[serde(rename = "subject_signed_id_token")]
    SubjectSigned,
    #[serde(rename = "attester_signed_id_token")]
    AttesterSigned,
}

/// What the Verifier asked the Wallet to present. Fixed at initiation.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationType {
    IdTokenRequest {
        id_token_type: IdTokenType,
    },
    VpTokenRequest {
        presentation_definition: PresentationDefinition,
    },
    IdAndVpToken {
        id_token_type: IdTokenType,
        presentation_definition: PresentationDefinition,
    },
}

impl PresentationType {
    pub fn presentation_definition(&self) -> Option<&PresentationDefinition> {
        match self {
            PresentationType::IdTokenRequest { .. } => None,
            PresentationType::VpTokenRequest {
                presentation_definition,
            }
            | PresentationType::IdAndVpToken {
                presentation_definition,
                ..
            } => Some(presentation_definition),
        }
    }

    pub fn requires_id_token(&self) -> bool {
        matches!(
            self,
            PresentationType::IdTokenRequest { .. } | PresentationType::IdAndVpToken { .. }
        )
    }

    pub fn requires_vp_token(&self) -> bool {
        matches!(
            self,
            PresentationType::VpTokenRequest { .. } | PresentationType::IdAndVpToken { .. }
        )
    }

    /// The `response_type` claim of the Request Object.
    pub fn response_type(&self) -> &'static str {
        match self {
            PresentationType::IdTokenRequest { .. } => "id_token",
            PresentationType::VpTokenRequest { .. } => "vp_token",
            PresentationType::IdAndVpToken { .. } => "vp_token id_token",
        }
    }
}

/// How the Verifier front-end learns that the wallet response is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetWalletResponseMethod {
    /// The front-end polls `GET /ui/presentations/{transactionId}`.
    Poll,
    /// The Wallet is redirected to the front-end, carrying a one-shot
    /// [ResponseCode] expanded into the template.
    Redirect { uri_template: String },
}

/// Placeholder the redirect template must contain exactly once.
pub const RESPONSE_CODE_PLACEHOLDER: &str = "{RESPONSE_CODE}";

impl GetWalletResponseMethod {
    pub fn redirect_uri(&self, code: &ResponseCode) -> Option<String> {
        match self {
            GetWalletResponseMethod::Poll => None,
            GetWalletResponseMethod::Redirect { uri_template } => {
                Some(uri_template.replace(RESPONSE_CODE_PLACEHOLDER, code.as_str()))
            }
        }
    }
}

/// The validated payload of the Wallet's Authorisation Response, in the
/// shape the transaction's [PresentationType] required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletResponse {
    IdToken {
        id_token: String,
    },
    VpToken {
        vp_token: Json,
        presentation_submission: PresentationSubmission,
    },
    IdAndVpToken {
        id_token: String,
        vp_token: Json,
        presentation_submission: PresentationSubmission,
    },
    Error {
        error: String,
        description: Option<String>,
    },
}

/// Wire view of [WalletResponse] for the Verifier front-end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletResponseTO {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_token: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&WalletResponse> for WalletResponseTO {
    fn from(response: &WalletResponse) -> Self {
        match response {
            WalletResponse::IdToken { id_token } => WalletResponseTO {
                id_token: Some(id_token.clone()),
                ..Default::default()
            },
            WalletResponse::VpToken {
                vp_token,
                presentation_submission,
            } => WalletResponseTO {
                vp_token: Some(vp_token.clone()),
                presentation_submission: Some(presentation_submission.clone()),
                ..Default::default()
            },
            WalletResponse::IdAndVpToken {
                id_token,
                vp_token,
                presentation_submission,
            } => WalletResponseTO {
                id_token: Some(id_token.clone()),
                vp_token: Some(vp_token.clone()),
                presentation_submission: Some(presentation_submission.clone()),
                ..Default::default()
            },
            WalletResponse::Error { error, description } => WalletResponseTO {
                error: Some(error.clone()),
                error_description: description.clone(),
                ..Default::default()
            },
        }
    }
}

/// Why a presentation left the live part of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    Expired,
}

/// Discriminant of [Presentation], used for compare-and-set updates in the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTag {
    Requested,
    RequestObjectRetrieved,
    Submitted,
    TimedOut,
    Consumed,
}

/// Awaiting the Wallet's fetch of the Request Object.
#[derive(Debug, Clone)]
pub struct Requested {
    pub id: TransactionId,
    pub request_id: RequestId,
    pub initiated_at: DateTime<Utc>,
    pub presentation_type: PresentationType,
    pub response_mode: ResponseMode,
    pub presentation_definition_by_reference: bool,
    pub get_wallet_response_method: GetWalletResponseMethod,
    pub nonce: Nonce,
    /// Present iff `response_mode` is `direct_post.jwt`; the matching public
    /// key travels in the Request Object's `client_metadata.jwks`. Held as
    /// a private EC JWK.
    pub ephemeral_ec_private_key: Option<Json>,
    /// Per input-descriptor public keys for ZKP challenge verification.
    pub zkp_keys: Option<BTreeMap<String, Json>>,
}

impl Requested {
    pub fn retrieve(self, at: DateTime<Utc>) -> RequestObjectRetrieved {
        RequestObjectRetrieved {
            id: self.id,
            request_id: self.request_id,
            initiated_at: self.initiated_at,
            presentation_type: self.presentation_type,
            response_mode: self.response_mode,
            get_wallet_response_method: self.get_wallet_response_method,
            nonce: self.nonce,
            ephemeral_ec_private_key: self.ephemeral_ec_private_key,
            zkp_keys: self.zkp_keys,
            request_object_retrieved_at: at,
        }
    }
}

/// The Wallet holds the Request Object; awaiting its Authorisation Response.
#[derive(Debug, Clone)]
pub struct RequestObjectRetrieved {
    pub id: TransactionId,
    pub request_id: RequestId,
    pub initiated_at: DateTime<Utc>,
    pub presentation_type: PresentationType,
    pub response_mode: ResponseMode,
    pub get_wallet_response_method: GetWalletResponseMethod,
    pub nonce: Nonce,
    pub ephemeral_ec_private_key: Option<Json>,
    pub zkp_keys: Option<BTreeMap<String, Json>>,
    pub request_object_retrieved_at: DateTime<Utc>,
}

impl RequestObjectRetrieved {
    pub fn submit(
        self,
        at: DateTime<Utc>,
        wallet_response: WalletResponse,
        response_code: Option<ResponseCode>,
    ) -> Submitted {
        Submitted {
            id: self.id,
            request_id: self.request_id,
            initiated_at: self.initiated_at,
            presentation_type: self.presentation_type,
            get_wallet_response_method: self.get_wallet_response_method,
            submitted_at: at,
            wallet_response,
            response_code,
        }
    }
}

/// A validated wallet response is stored, awaiting front-end retrieval.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub id: TransactionId,
    pub request_id: RequestId,
    pub initiated_at: DateTime<Utc>,
    pub presentation_type: PresentationType,
    pub get_wallet_response_method: GetWalletResponseMethod,
    pub submitted_at: DateTime<Utc>,
    pub wallet_response: WalletResponse,
    /// Present iff `get_wallet_response_method` is `Redirect`.
    pub response_code: Option<ResponseCode>,
}

impl Submitted {
    pub fn consume(self, at: DateTime<Utc>) -> Consumed {
        Consumed {
            id: self.id,
            consumed_at: at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimedOut {
    pub id: TransactionId,
    pub reason: TimeoutReason,
    pub timed_out_at: DateTime<Utc>,
}

/// Terminal: the response code was exchanged; the record answers nothing
/// further, indistinguishably from absence.
#[derive(Debug, Clone)]
pub struct Consumed {
    pub id: TransactionId,
    pub consumed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Presentation {
    Requested(Requested),
    RequestObjectRetrieved(RequestObjectRetrieved),
    Submitted(Submitted),
    TimedOut(TimedOut),
    Consumed(Consumed),
}

impl Presentation {
    pub fn id(&self) -> &TransactionId {
        match self {
            Presentation::Requested(p) => &p.id,
            Presentation::RequestObjectRetrieved(p) => &p.id,
            Presentation::Submitted(p) => &p.id,
            Presentation::TimedOut(p) => &p.id,
            Presentation::Consumed(p) => &p.id,
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Presentation::Requested(p) => Some(&p.request_id),
            Presentation::RequestObjectRetrieved(p) => Some(&p.request_id),
            Presentation::Submitted(p) => Some(&p.request_id),
            Presentation::TimedOut(_) | Presentation::Consumed(_) => None,
        }
    }

    pub fn state(&self) -> StateTag {
        match self {
            Presentation::Requested(_) => StateTag::Requested,
            Presentation::RequestObjectRetrieved(_) => StateTag::RequestObjectRetrieved,
            Presentation::Submitted(_) => StateTag::Submitted,
            Presentation::TimedOut(_) => StateTag::TimedOut,
            Presentation::Consumed(_) => StateTag::Consumed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Presentation::TimedOut(_) | Presentation::Consumed(_)
        )
    }

    pub fn initiated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Presentation::Requested(p) => Some(p.initiated_at),
            Presentation::RequestObjectRetrieved(p) => Some(p.initiated_at),
            Presentation::Submitted(p) => Some(p.initiated_at),
            Presentation::TimedOut(_) | Presentation::Consumed(_) => None,
        }
    }

    /// Whether the record has outlived `max_age` at `now`.
    ///
    /// Terminal records are never considered expired; they already left the
    /// live lifecycle.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.initiated_at() {
            Some(initiated_at) => now - initiated_at >= max_age,
            None => false,
        }
    }

    /// Move a live record to `TimedOut`. Terminal records are refused, which
    /// is what makes the sweeper idempotent.
    pub fn timeout(self, at: DateTime<Utc>) -> Result<Presentation, Presentation> {
        if self.is_terminal() {
            return Err(self);
        }
        Ok(Presentation::TimedOut(TimedOut {
            id: self.id().clone(),
            reason: TimeoutReason::Expired,
            timed_out_at: at,
        }))
    }
}
