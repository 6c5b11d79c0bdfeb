//! The error taxonomy of the verifier core.
//!
//! Each public operation fails with its own sum type; the wire shape for
//! all of them is [ErrorTO]. Codes are coarse on purpose: cryptographic
//! failures must not leak which verification step rejected the token.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::presentation::ResponseMode;

/// Failures of `InitTransaction`. Configuration inconsistencies are fatal
/// at startup; request inconsistencies are reported to the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failures of the Wallet's Request Object fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestObjectError {
    #[error("no presentation corresponds to the request id")]
    NotFound,
    #[error("request object is no longer available")]
    InvalidState,
    #[error("presentation has timed out")]
    Expired,
    #[error("request object could not be produced")]
    Internal,
}

impl RequestObjectError {
    pub fn status(&self) -> u16 {
        match self {
            RequestObjectError::NotFound => 404,
            RequestObjectError::InvalidState => 400,
            RequestObjectError::Expired => 410,
            RequestObjectError::Internal => 500,
        }
    }
}

/// Failures of `PostWalletResponse`, in the order the validator can raise
/// them. All surface as HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("'state' is missing from the response")]
    MissingState,
    #[error("no presentation corresponds to the supplied state")]
    PresentationDefinitionNotFound,
    #[error("presentation is not awaiting a wallet response")]
    PresentationNotInExpectedState,
    #[error("expected response mode '{expected}', got '{actual}'")]
    UnexpectedResponseMode {
        expected: ResponseMode,
        actual: ResponseMode,
    },
    #[error("presentation has timed out")]
    Expired,
    #[error("JARM could not be decrypted or verified")]
    InvalidJarm,
    #[error("'state' inside the JARM does not match the outer 'state'")]
    IncorrectStateInJarm,
    #[error("'id_token' is required but missing")]
    MissingIdToken,
    #[error("'vp_token' or 'presentation_submission' is required but missing")]
    MissingVpTokenOrPresentationSubmission,
    #[error("SD-JWT verification failed")]
    InvalidSdJwt,
    #[error("mdoc verification failed")]
    InvalidMdoc,
    #[error("vp_token verification failed")]
    InvalidVpToken,
    #[error("unsupported presentation format '{0}'")]
    InvalidFormat(String),
}

impl SubmissionError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmissionError::MissingState => "missing_state",
            SubmissionError::PresentationDefinitionNotFound => {
                "presentation_definition_not_found"
            }
            SubmissionError::PresentationNotInExpectedState => {
                "presentation_not_in_expected_state"
            }
            SubmissionError::UnexpectedResponseMode { .. } => "unexpected_response_mode",
            SubmissionError::Expired => "expired",
            SubmissionError::InvalidJarm => "invalid_jarm",
            SubmissionError::IncorrectStateInJarm => "incorrect_state_in_jarm",
            SubmissionError::MissingIdToken => "missing_id_token",
            SubmissionError::MissingVpTokenOrPresentationSubmission => {
                "missing_vp_token_or_presentation_submission"
            }
            SubmissionError::InvalidSdJwt => "invalid_sd_jwt",
            SubmissionError::InvalidMdoc => "invalid_mdoc",
            SubmissionError::InvalidVpToken => "invalid_vp_token",
            SubmissionError::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// Failures of the front-end's wallet-response retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("no wallet response is available")]
    NotFound,
    #[error("presentation has not been submitted")]
    InvalidState,
    #[error("presentation has timed out")]
    Expired,
}

impl RetrievalError {
    pub fn status(&self) -> u16 {
        match self {
            RetrievalError::NotFound => 404,
            RetrievalError::InvalidState | RetrievalError::Expired => 400,
        }
    }
}

/// Structured error body for the HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTO {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&SubmissionError> for ErrorTO {
    fn from(error: &SubmissionError) -> Self {
        ErrorTO {
            error: error.code().to_string(),
            error_description: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn submission_errors_carry_coarse_codes() {
        let error = SubmissionError::InvalidSdJwt;
        let to = ErrorTO::from(&error);
        assert_eq!(to.error, "invalid_sd_jwt");
        // no verification internals in the description
        assert_eq!(to.error_description.unwrap(), "SD-JWT verification failed");
    }

    #[test]
    fn unexpected_response_mode_names_both_modes() {
        let error = SubmissionError::UnexpectedResponseMode {
            expected: ResponseMode::DirectPost,
            actual: ResponseMode::DirectPostJwt,
        };
        assert_eq!(
            error.to_string(),
            "expected response mode 'direct_post', got 'direct_post.jwt'"
        );
    }

    #[test]
    fn status_mapping_matches_the_http_contract() {
        assert_eq!(RequestObjectError::NotFound.status(), 404);
        assert_eq!(RequestObjectError::InvalidState.status(), 400);
        assert_eq!(RequestObjectError::Expired.status(), 410);
        assert_eq!(RetrievalError::NotFound.status(), 404);
        assert_eq!(RetrievalError::InvalidState.status(), 400);
    }
}
