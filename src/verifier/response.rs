//! PostWalletResponse: parse, authenticate and verify the Wallet's
//! Authorisation Response, then commit it.
//!
//! Every step is ordered and failure-stop. No `Submitted` record is ever
//! written for a response that failed any check; the commit itself is a
//! compare-and-set, so concurrent submissions for the same request id
//! produce exactly one winner.

use serde::Serialize;
use tracing::debug;

use crate::core::identifiers::{RequestId, ResponseCode};
use crate::core::presentation::{
    GetWalletResponseMethod, Presentation, PresentationType, RequestObjectRetrieved, StateTag,
    WalletResponse,
};
use crate::core::response::{AuthorisationResponse, AuthorisationResponsePayload};
use crate::error::SubmissionError;
use crate::jarm;
use crate::verification::{verify_vp_token, VpVerificationContext};
use crate::verifier::Verifier;

/// Returned to the Wallet when the front-end asked to be called back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub redirect_uri: String,
}

pub(crate) async fn post_wallet_response(
    verifier: &Verifier,
    response: AuthorisationResponse,
) -> Result<Option<Accepted>, SubmissionError> {
    let config = verifier.config();
    let now = verifier.now();

    // (1) the response must carry the state we handed out
    let state = response
        .state()
        .ok_or(SubmissionError::MissingState)?
        .to_string();
    let request_id = RequestId::new(state.clone());

    // (2) load the presentation and gate on its lifecycle state
    let presentation = verifier
        .store()
        .load_by_request_id(&request_id)
        .await
        .ok_or(SubmissionError::PresentationDefinitionNotFound)?;
    let retrieved = match presentation {
        Presentation::TimedOut(_) => return Err(SubmissionError::Expired),
        Presentation::RequestObjectRetrieved(retrieved) => retrieved,
        _ => return Err(SubmissionError::PresentationNotInExpectedState),
    };
    if now - retrieved.initiated_at >= config.max_age {
        if let Ok(timed_out) = Presentation::RequestObjectRetrieved(retrieved).timeout(now) {
            verifier
                .store()
                .swap(StateTag::RequestObjectRetrieved, timed_out)
                .await;
        }
        return Err(SubmissionError::Expired);
    }

    // (3) the transport must match the transaction's response mode
    let actual = response.response_mode();
    if actual != retrieved.response_mode {
        return Err(SubmissionError::UnexpectedResponseMode {
            expected: retrieved.response_mode,
            actual,
        });
    }

    // (4) unwrap JARM for direct_post.jwt
    let payload = match response {
        AuthorisationResponse::DirectPost(payload) => payload,
        AuthorisationResponse::DirectPostJwt { response, .. } => {
            let inner = jarm::verify_jarm(
                &config.jarm,
                retrieved.ephemeral_ec_private_key.as_ref(),
                &response,
            )
            .map_err(|e| {
                debug!("JARM verification failed: {e:#}");
                SubmissionError::InvalidJarm
            })?;
            if inner.state.as_deref() != Some(state.as_str()) {
                return Err(SubmissionError::IncorrectStateInJarm);
            }
            inner
        }
    };

    // (5)-(7) classify the payload and verify every presented credential
    let wallet_response = classify_and_verify(verifier, &retrieved, &payload)?;

    // (8) a response code exists only for the redirect handoff
    let response_code = match &retrieved.get_wallet_response_method {
        GetWalletResponseMethod::Poll => None,
        GetWalletResponseMethod::Redirect { .. } => Some(ResponseCode::random()),
    };

    // (9) commit; a concurrent submission for the same request id loses here
    let method = retrieved.get_wallet_response_method.clone();
    let submitted = retrieved.submit(now, wallet_response, response_code.clone());
    let committed = verifier
        .store()
        .swap(
            StateTag::RequestObjectRetrieved,
            Presentation::Submitted(submitted),
        )
        .await;
    if !committed {
        return Err(SubmissionError::PresentationNotInExpectedState);
    }

    // (10)
    Ok(response_code
        .and_then(|code| method.redirect_uri(&code))
        .map(|redirect_uri| Accepted { redirect_uri }))
}

fn classify_and_verify(
    verifier: &Verifier,
    retrieved: &RequestObjectRetrieved,
    payload: &AuthorisationResponsePayload,
) -> Result<WalletResponse, SubmissionError> {
    // an error response is stored as-is; there is nothing to verify
    if let Some(error) = &payload.error {
        return Ok(WalletResponse::Error {
            error: error.clone(),
            description: payload.error_description.clone(),
        });
    }

    let id_token = || payload.id_token.clone().ok_or(SubmissionError::MissingIdToken);
    let vp_token = || {
        match (&payload.vp_token, &payload.presentation_submission) {
            (Some(vp_token), Some(submission)) => Ok((vp_token.clone(), submission.clone())),
            _ => Err(SubmissionError::MissingVpTokenOrPresentationSubmission),
        }
    };

    let config = verifier.config();
    let verify = |vp_token: &serde_json::Value,
                  submission: &crate::core::presentation_exchange::PresentationSubmission| {
        let ctx = VpVerificationContext {
            issuer: &config.issuer,
            nonce: &retrieved.nonce,
            client_id: &config.client_id,
            zkp_keys: retrieved.zkp_keys.as_ref(),
            now: verifier.now(),
        };
        verify_vp_token(&ctx, vp_token, submission)
    };

    match &retrieved.presentation_type {
        PresentationType::IdTokenRequest { .. } => Ok(WalletResponse::IdToken {
            id_token: id_token()?,
        }),
        PresentationType::VpTokenRequest { .. } => {
            let (vp_token, presentation_submission) = vp_token()?;
            verify(&vp_token, &presentation_submission)?;
            Ok(WalletResponse::VpToken {
                vp_token,
                presentation_submission,
            })
        }
        PresentationType::IdAndVpToken { .. } => {
            let id_token = id_token()?;
            let (vp_token, presentation_submission) = vp_token()?;
            verify(&vp_token, &presentation_submission)?;
            Ok(WalletResponse::IdAndVpToken {
                id_token,
                vp_token,
                presentation_submission,
            })
        }
    }
}
