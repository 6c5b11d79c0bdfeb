//! Cryptographic verification of the Verifiable Presentations inside a
//! `vp_token`, dispatched per presentation-submission descriptor.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::IssuerKey;
use crate::core::identifiers::Nonce;
use crate::core::presentation_exchange::{PresentationSubmission, VpFormat};
use crate::error::SubmissionError;

pub mod mdoc;
pub mod sd_jwt;
pub mod zkp;

/// Everything a descriptor verification can depend on, read-only.
pub(crate) struct VpVerificationContext<'a> {
    pub issuer: &'a IssuerKey,
    pub nonce: &'a Nonce,
    pub client_id: &'a str,
    pub zkp_keys: Option<&'a BTreeMap<String, Json>>,
    pub now: DateTime<Utc>,
}

/// Walk the descriptor map, extract each sub-token from `vp_token` and
/// verify it according to its declared format. Short-circuits on the first
/// failure; no partial result escapes.
pub(crate) fn verify_vp_token(
    ctx: &VpVerificationContext<'_>,
    vp_token: &Json,
    submission: &PresentationSubmission,
) -> Result<(), SubmissionError> {
    for descriptor in &submission.descriptor_map {
        let Some(token) = descriptor.extract(vp_token) else {
            return Err(SubmissionError::MissingVpTokenOrPresentationSubmission);
        };

        match &descriptor.format {
            VpFormat::SdJwt => {
                let vp = token.as_str().ok_or(SubmissionError::InvalidSdJwt)?;
                sd_jwt::verify_sd_jwt_vp(vp, &ctx.issuer.key, ctx.nonce, ctx.client_id)
                    .map_err(|e| {
                        debug!("sd-jwt verification failed: {e:#}");
                        SubmissionError::InvalidSdJwt
                    })?;
            }
            VpFormat::MsoMdoc => {
                let vp = token.as_str().ok_or(SubmissionError::InvalidMdoc)?;
                mdoc::verify_device_response(vp, ctx.issuer, ctx.now).map_err(|e| {
                    debug!("mdoc verification failed: {e:#}");
                    SubmissionError::InvalidMdoc
                })?;
            }
            VpFormat::SdJwtZkp => {
                let key = zkp_key(ctx, &descriptor.id)?;
                let vp = token.as_str().ok_or(SubmissionError::InvalidVpToken)?;
                let sd_jwt = vp.split('~').next().unwrap_or(vp);
                let ok = zkp::verify_challenge(zkp::ZkpFormat::SdJwt, sd_jwt, &key)
                    .unwrap_or(false);
                if !ok {
                    return Err(SubmissionError::InvalidVpToken);
                }
            }
            VpFormat::MsoMdocZkp => {
                let key = zkp_key(ctx, &descriptor.id)?;
                let vp = token.as_str().ok_or(SubmissionError::InvalidVpToken)?;
                let documents = mdoc::parse_device_response(vp)
                    .map_err(|_| SubmissionError::InvalidVpToken)?;
                for document in &documents {
                    let encoded = mdoc::encode_document(document)
                        .map_err(|_| SubmissionError::InvalidVpToken)?;
                    let ok = zkp::verify_challenge(zkp::ZkpFormat::MsoMdoc, &encoded, &key)
                        .unwrap_or(false);
                    if !ok {
                        return Err(SubmissionError::InvalidVpToken);
                    }
                }
            }
            VpFormat::Unsupported(format) => {
                return Err(SubmissionError::InvalidFormat(format.clone()));
            }
        }
    }
    Ok(())
}

fn zkp_key(
    ctx: &VpVerificationContext<'_>,
    descriptor_id: &str,
) -> Result<VerifyingKey, SubmissionError> {
    ctx.zkp_keys
        .and_then(|keys| keys.get(descriptor_id))
        .and_then(|jwk| verifying_key_from_jwk(jwk).ok())
        .ok_or(SubmissionError::InvalidVpToken)
}

/// Decode one base64url JWT part into JSON.
pub(crate) fn decode_part(part: &str) -> Result<Json> {
    let bytes = crate::utils::base64url_decode(part).context("not base64url")?;
    serde_json::from_slice(&bytes).context("not JSON")
}

/// Verify an ES256 compact JWS and return its decoded header and claims.
pub(crate) fn verify_jws_es256(compact: &str, key: &VerifyingKey) -> Result<(Json, Json)> {
    let mut parts = compact.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        bail!("not a compact JWS");
    };

    let header = decode_part(header_b64).context("JWS header")?;
    if header.get("alg").and_then(Json::as_str) != Some("ES256") {
        bail!("unexpected JWS algorithm");
    }

    let signature_bytes =
        crate::utils::base64url_decode(signature_b64).context("JWS signature")?;
    let signature =
        Signature::from_slice(&signature_bytes).context("malformed ES256 signature")?;
    let signing_input = format!("{header_b64}.{payload_b64}");
    key.verify(signing_input.as_bytes(), &signature)
        .map_err(|_| anyhow!("JWS signature verification failed"))?;

    let claims = decode_part(payload_b64).context("JWS payload")?;
    Ok((header, claims))
}

/// Read an EC P-256 verification key out of a JWK object.
pub(crate) fn verifying_key_from_jwk(jwk: &Json) -> Result<VerifyingKey> {
    if jwk.get("kty").and_then(Json::as_str) != Some("EC")
        || jwk.get("crv").and_then(Json::as_str) != Some("P-256")
    {
        bail!("not an EC P-256 JWK");
    }
    let x = coordinate(jwk, "x")?;
    let y = coordinate(jwk, "y")?;
    let point = p256::EncodedPoint::from_affine_coordinates(&x.into(), &y.into(), false);
    VerifyingKey::from_encoded_point(&point).context("JWK coordinates are not on the curve")
}

fn coordinate(jwk: &Json, name: &str) -> Result<[u8; 32]> {
    let value = jwk
        .get(name)
        .and_then(Json::as_str)
        .with_context(|| format!("JWK is missing '{name}'"))?;
    let bytes = crate::utils::base64url_decode(value)
        .with_context(|| format!("JWK '{name}' is not base64url"))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("JWK '{name}' is not a 32-byte coordinate"))
}
