//! The Request Object (JAR): the signed JWT the Wallet fetches, and the
//! state transition that fetch performs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::warn;

use crate::config::VerifierConfig;
use crate::core::identifiers::RequestId;
use crate::core::presentation::{
    IdTokenType, Presentation, PresentationType, Requested, ResponseMode, StateTag,
};
use crate::error::RequestObjectError;
use crate::utils::base64url_encode;
use crate::verifier::request_signer::RequestSigner;
use crate::verifier::Verifier;

/// Claim set of the Request Object, per RFC 9101 and OpenID4VP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestObject {
    pub client_id: String,
    pub client_id_scheme: String,
    pub response_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub response_mode: ResponseMode,
    pub response_uri: String,
    pub aud: String,
    pub nonce: String,
    /// The transaction's [RequestId]; the Wallet echoes it as `state`.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_type: Option<IdTokenType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<crate::core::presentation_exchange::PresentationDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_definition_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<Json>,
    pub iat: i64,
}

pub(crate) fn request_object(config: &VerifierConfig, presentation: &Requested) -> RequestObject {
    let (scope, id_token_type) = match &presentation.presentation_type {
        PresentationType::IdTokenRequest { id_token_type }
        | PresentationType::IdAndVpToken { id_token_type, .. } => {
            (Some("openid".to_string()), Some(*id_token_type))
        }
        PresentationType::VpTokenRequest { .. } => (None, None),
    };

    let (presentation_definition, presentation_definition_uri) =
        match presentation.presentation_type.presentation_definition() {
            Some(_) if presentation.presentation_definition_by_reference => (
                None,
                Some(config.presentation_definition_uri(presentation.request_id.as_str())),
            ),
            Some(pd) => (Some(pd.clone()), None),
            None => (None, None),
        };

    RequestObject {
        client_id: config.client_id.clone(),
        client_id_scheme: config.client_id_scheme.clone(),
        response_type: presentation.presentation_type.response_type().to_string(),
        scope,
        response_mode: presentation.response_mode,
        response_uri: config.response_uri(presentation.response_mode),
        aud: "https://self-issued.me/v2".to_string(),
        nonce: presentation.nonce.to_string(),
        state: presentation.request_id.to_string(),
        id_token_type,
        presentation_definition,
        presentation_definition_uri,
        client_metadata: Some(client_metadata(
            config,
            presentation.ephemeral_ec_private_key.as_ref(),
        )),
        iat: presentation.initiated_at.timestamp(),
    }
}

/// The `client_metadata` claim: declared algorithms, vp formats and — for
/// `direct_post.jwt` — the transaction's ephemeral encryption key.
fn client_metadata(config: &VerifierConfig, ephemeral_key: Option<&Json>) -> Json {
    let mut metadata = json!({
        "vp_formats": {
            "vc+sd-jwt": {
                "sd-jwt_alg_values": ["ES256"],
                "kb-jwt_alg_values": ["ES256"],
            },
            "mso_mdoc": { "alg": ["ES256"] },
        },
    });

    if let Some(alg) = config.jarm.signing() {
        metadata["authorization_signed_response_alg"] = json!(alg);
    }
    if let Some((alg, enc)) = config.jarm.encryption() {
        metadata["authorization_encrypted_response_alg"] = json!(alg);
        metadata["authorization_encrypted_response_enc"] = json!(enc);
    }
    if let Some(private_jwk) = ephemeral_key {
        let mut public = private_jwk.clone();
        if let Some(map) = public.as_object_mut() {
            map.remove("d");
        }
        metadata["jwks"] = json!({ "keys": [public] });
    }

    metadata
}

/// Serialize and sign the Request Object as a compact JWS with
/// `typ: oauth-authz-req+jwt`.
pub(crate) async fn sign_request_object<S: RequestSigner + ?Sized>(
    signer: &S,
    request_object: &RequestObject,
) -> Result<String> {
    let mut header = json!({
        "alg": signer.alg(),
        "typ": "oauth-authz-req+jwt",
    });
    if let Some(kid) = signer.kid() {
        header["kid"] = json!(kid);
    }

    let header_b64 = serde_json::to_vec(&header)
        .map(base64url_encode)
        .context("failed to serialize JWS header")?;
    let body_b64 = serde_json::to_vec(request_object)
        .map(base64url_encode)
        .context("failed to serialize request object")?;
    let payload = [header_b64.as_bytes(), b".", body_b64.as_bytes()].concat();
    let signature = signer.sign(&payload).await;
    let signature_b64 = base64url_encode(signature);
    Ok(format!("{header_b64}.{body_b64}.{signature_b64}"))
}

/// The Wallet's fetch of the Request Object.
///
/// At-most-once: the `Requested → RequestObjectRetrieved` transition is a
/// compare-and-set, so a repeated fetch (or a raced one) fails with
/// `InvalidState` rather than handing out a second JAR.
pub(crate) async fn get_request_object(
    verifier: &Verifier,
    request_id: &RequestId,
) -> Result<String, RequestObjectError> {
    let now = verifier.now();
    let Some(presentation) = verifier.store().load_by_request_id(request_id).await else {
        return Err(RequestObjectError::NotFound);
    };

    let requested = match presentation {
        Presentation::TimedOut(_) => return Err(RequestObjectError::Expired),
        Presentation::Requested(requested) => requested,
        _ => return Err(RequestObjectError::InvalidState),
    };

    if now - requested.initiated_at >= verifier.config().max_age {
        if let Ok(timed_out) = Presentation::Requested(requested).timeout(now) {
            verifier.store().swap(StateTag::Requested, timed_out).await;
        }
        return Err(RequestObjectError::Expired);
    }

    let claims = request_object(verifier.config(), &requested);
    let jar = sign_request_object(verifier.signer(), &claims)
        .await
        .map_err(|e| {
            warn!("failed to sign request object: {e:#}");
            RequestObjectError::Internal
        })?;

    let retrieved = Presentation::RequestObjectRetrieved(requested.retrieve(now));
    if !verifier.store().swap(StateTag::Requested, retrieved).await {
        return Err(RequestObjectError::InvalidState);
    }

    Ok(jar)
}
