//! JARM envelope verification for `direct_post.jwt` responses.
//!
//! The Wallet protects its Authorisation Response as a JWT: signed,
//! encrypted to the transaction's ephemeral key, or signed then encrypted.
//! Which of these is acceptable is configuration, not negotiation, so the
//! verifier dispatches on [JarmOption] and rejects anything else.

use anyhow::{bail, Context, Result};
use josekit::jwk::Jwk;
use serde_json::Value as Json;

use crate::core::response::AuthorisationResponsePayload;
use crate::utils::base64url_decode;

/// Algorithms this verifier supports for JARM.
const SIGNING_ALG: &str = "ES256";
const KEY_AGREEMENT_ALG: &str = "ECDH-ES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JarmOption {
    /// Plain `direct_post` only; attempting `direct_post.jwt` is a
    /// configuration error.
    Unsigned,
    Signed {
        alg: String,
    },
    Encrypted {
        alg: String,
        enc: String,
    },
    SignedAndEncrypted {
        sign_alg: String,
        alg: String,
        enc: String,
    },
}

impl JarmOption {
    pub fn signing(&self) -> Option<&str> {
        match self {
            JarmOption::Signed { alg } => Some(alg),
            JarmOption::SignedAndEncrypted { sign_alg, .. } => Some(sign_alg),
            _ => None,
        }
    }

    pub fn encryption(&self) -> Option<(&str, &str)> {
        match self {
            JarmOption::Encrypted { alg, enc }
            | JarmOption::SignedAndEncrypted { alg, enc, .. } => Some((alg, enc)),
            _ => None,
        }
    }
}

/// Unwrap a JARM envelope into the response parameters it protects.
///
/// `ephemeral_key` is the transaction's EC private key as a JWK object; it
/// is required for the encrypted variants and unused for `Signed`.
pub fn verify_jarm(
    option: &JarmOption,
    ephemeral_key: Option<&Json>,
    jarm: &str,
) -> Result<AuthorisationResponsePayload> {
    match option {
        JarmOption::Unsigned => bail!("JARM is not configured for this verifier"),
        JarmOption::Signed { alg } => verify_signed(jarm, alg),
        JarmOption::Encrypted { alg, enc } => {
            let payload = decrypt(jarm, alg, enc, ephemeral_key)?;
            serde_json::from_slice(&payload).context("decrypted JARM is not a response object")
        }
        JarmOption::SignedAndEncrypted { sign_alg, alg, enc } => {
            let payload = decrypt(jarm, alg, enc, ephemeral_key)?;
            let nested =
                String::from_utf8(payload).context("decrypted JARM is not a nested JWS")?;
            verify_signed(&nested, sign_alg)
        }
    }
}

fn decrypt(jarm: &str, alg: &str, enc: &str, ephemeral_key: Option<&Json>) -> Result<Vec<u8>> {
    if alg != KEY_AGREEMENT_ALG {
        bail!("unsupported key agreement algorithm: {alg} (only {KEY_AGREEMENT_ALG} is supported)");
    }
    let jwk_value = ephemeral_key.context("presentation has no ephemeral decryption key")?;
    let jwk = Jwk::from_bytes(serde_json::to_vec(jwk_value)?)
        .context("ephemeral key is not a valid JWK")?;

    let decrypter = josekit::jwe::ECDH_ES
        .decrypter_from_jwk(&jwk)
        .context("failed to create ECDH-ES decrypter")?;
    let (payload, header) =
        josekit::jwe::deserialize_compact(jarm, &decrypter).context("failed to decrypt JARM")?;

    let actual_enc = header.content_encryption();
    if actual_enc != Some(enc) {
        bail!(
            "JARM content encryption mismatch: expected {enc}, got {}",
            actual_enc.unwrap_or("none")
        );
    }

    Ok(payload)
}

/// Verify a signed JARM JWS. The Wallet's ephemeral signing key travels in
/// the JWS `jwk` header, like its other per-transaction keys.
fn verify_signed(jws: &str, alg: &str) -> Result<AuthorisationResponsePayload> {
    if alg != SIGNING_ALG {
        bail!("unsupported JARM signing algorithm: {alg} (only {SIGNING_ALG} is supported)");
    }

    let header_b64 = jws
        .split('.')
        .next()
        .context("JARM JWS is not in compact form")?;
    let header: Json = serde_json::from_slice(
        &base64url_decode(header_b64).context("JARM JWS header is not base64url")?,
    )
    .context("JARM JWS header is not JSON")?;

    if header.get("alg").and_then(Json::as_str) != Some(alg) {
        bail!("JARM JWS algorithm does not match the configured algorithm");
    }
    let jwk_value = header
        .get("jwk")
        .context("JARM JWS carries no 'jwk' header")?;
    let jwk = Jwk::from_bytes(serde_json::to_vec(jwk_value)?)
        .context("JARM JWS 'jwk' header is not a valid key")?;

    let verifier = josekit::jws::ES256
        .verifier_from_jwk(&jwk)
        .context("failed to create ES256 verifier")?;
    let (payload, _header) = josekit::jwt::decode_with_verifier(jws, &verifier)
        .context("JARM JWS signature verification failed")?;

    serde_json::from_value(Json::Object(payload.claims_set().clone()))
        .context("JARM claims are not a response object")
}
