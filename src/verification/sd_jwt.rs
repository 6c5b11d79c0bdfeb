//! SD-JWT presentation verification.
//!
//! A presented SD-JWT is `<issuer-jwt>~<disclosure>~...~<kb-jwt>`. The
//! issuer JWT must verify against the configured Issuer key, every
//! disclosure must hash into the credential's `_sd` digests, and the
//! key-binding JWT must be present, signed by the holder key from the
//! credential's `cnf` claim, and bound to this transaction.

use anyhow::{bail, Context, Result};
use p256::ecdsa::VerifyingKey;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use crate::core::identifiers::Nonce;
use crate::utils::{base64url_decode, base64url_encode};
use crate::verification::{decode_part, verify_jws_es256, verifying_key_from_jwk};

pub fn verify_sd_jwt_vp(
    vp: &str,
    issuer_key: &VerifyingKey,
    nonce: &Nonce,
    client_id: &str,
) -> Result<()> {
    let parts: Vec<&str> = vp.split('~').collect();
    if parts.len() < 2 {
        bail!("not an SD-JWT presentation");
    }
    let credential = parts[0];
    let disclosures = &parts[1..parts.len() - 1];
    let key_binding = parts[parts.len() - 1];
    if key_binding.is_empty() {
        bail!("key-binding JWT is required");
    }

    let (_, claims) =
        verify_jws_es256(credential, issuer_key).context("issuer signature is invalid")?;

    verify_disclosures(disclosures, &claims)?;
    verify_key_binding(vp, key_binding, &claims, nonce, client_id)
}

/// Every disclosure must decode to a JSON array and hash into the
/// credential's `_sd` digest set.
fn verify_disclosures(disclosures: &[&str], claims: &Json) -> Result<()> {
    if disclosures.is_empty() {
        return Ok(());
    }

    let digests = claims
        .get("_sd")
        .and_then(Json::as_array)
        .context("credential has no '_sd' digests")?;

    for encoded in disclosures {
        let decoded = base64url_decode(encoded).context("disclosure is not base64url")?;
        let disclosure: Json =
            serde_json::from_slice(&decoded).context("disclosure is not JSON")?;
        if !disclosure.is_array() {
            bail!("disclosure is not a JSON array");
        }

        let digest = base64url_encode(Sha256::digest(encoded.as_bytes()));
        if !digests.iter().any(|d| d.as_str() == Some(digest.as_str())) {
            bail!("disclosure digest is not in the credential's '_sd' claim");
        }
    }
    Ok(())
}

/// The KB-JWT binds the presentation to the holder key, this transaction's
/// nonce and this verifier.
fn verify_key_binding(
    vp: &str,
    key_binding: &str,
    credential_claims: &Json,
    nonce: &Nonce,
    client_id: &str,
) -> Result<()> {
    let holder_jwk = credential_claims
        .get("cnf")
        .and_then(|cnf| cnf.get("jwk"))
        .context("credential has no 'cnf.jwk' claim")?;
    let holder_key = verifying_key_from_jwk(holder_jwk)?;

    let header_b64 = key_binding
        .split('.')
        .next()
        .context("key-binding JWT is not compact")?;
    let header = decode_part(header_b64).context("key-binding header")?;
    if header.get("typ").and_then(Json::as_str) != Some("kb+jwt") {
        bail!("key-binding JWT 'typ' is not 'kb+jwt'");
    }

    let (_, kb_claims) =
        verify_jws_es256(key_binding, &holder_key).context("key-binding signature is invalid")?;

    // sd_hash covers the presentation up to and including the final '~'
    let presented = &vp[..vp.len() - key_binding.len()];
    let sd_hash = base64url_encode(Sha256::digest(presented.as_bytes()));
    if kb_claims.get("sd_hash").and_then(Json::as_str) != Some(sd_hash.as_str()) {
        bail!("key-binding 'sd_hash' does not cover the presented SD-JWT");
    }
    if kb_claims.get("nonce").and_then(Json::as_str) != Some(nonce.as_str()) {
        bail!("key-binding 'nonce' does not match the transaction nonce");
    }
    if kb_claims.get("aud").and_then(Json::as_str) != Some(client_id) {
        bail!("key-binding 'aud' does not name this verifier");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use p256::ecdsa::{signature::Signer, Signature, SigningKey};
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use serde_json::json;

    const CLIENT_ID: &str = "verifier.example.com";

    fn sign_jwt(key: &SigningKey, header: &Json, claims: &Json) -> String {
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature: Signature = key.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    fn jwk(key: &SigningKey) -> Json {
        let public = p256::PublicKey::from(key.verifying_key());
        let point = public.to_encoded_point(false);
        json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        })
    }

    struct Fixture {
        issuer: SigningKey,
        holder: SigningKey,
        nonce: Nonce,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                issuer: SigningKey::random(&mut rand::thread_rng()),
                holder: SigningKey::random(&mut rand::thread_rng()),
                nonce: Nonce::random(),
            }
        }

        fn presentation(&self) -> String {
            self.presentation_with(self.nonce.as_str(), CLIENT_ID)
        }

        fn presentation_with(&self, nonce: &str, aud: &str) -> String {
            let disclosure =
                URL_SAFE_NO_PAD.encode(json!(["salt", "given_name", "Erika"]).to_string());
            let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(disclosure.as_bytes()));

            let credential = sign_jwt(
                &self.issuer,
                &json!({ "alg": "ES256", "typ": "vc+sd-jwt" }),
                &json!({
                    "iss": "https://issuer.example.com",
                    "vct": "EmployeeIDCredential",
                    "_sd": [digest],
                    "_sd_alg": "sha-256",
                    "cnf": { "jwk": jwk(&self.holder) },
                }),
            );

            let presented = format!("{credential}~{disclosure}~");
            let sd_hash = URL_SAFE_NO_PAD.encode(Sha256::digest(presented.as_bytes()));
            let kb = sign_jwt(
                &self.holder,
                &json!({ "alg": "ES256", "typ": "kb+jwt" }),
                &json!({ "nonce": nonce, "aud": aud, "iat": 1700000000, "sd_hash": sd_hash }),
            );
            format!("{presented}{kb}")
        }
    }

    #[test]
    fn valid_presentation_passes() {
        let f = Fixture::new();
        let vp = f.presentation();
        verify_sd_jwt_vp(&vp, f.issuer.verifying_key(), &f.nonce, CLIENT_ID).unwrap();
    }

    #[test]
    fn wrong_issuer_key_fails() {
        let f = Fixture::new();
        let other = SigningKey::random(&mut rand::thread_rng());
        let vp = f.presentation();
        assert!(verify_sd_jwt_vp(&vp, other.verifying_key(), &f.nonce, CLIENT_ID).is_err());
    }

    #[test]
    fn missing_key_binding_fails() {
        let f = Fixture::new();
        let vp = f.presentation();
        let without_kb = &vp[..=vp.rfind('~').unwrap()];
        assert!(
            verify_sd_jwt_vp(without_kb, f.issuer.verifying_key(), &f.nonce, CLIENT_ID).is_err()
        );
    }

    #[test]
    fn wrong_nonce_fails() {
        let f = Fixture::new();
        let vp = f.presentation_with("different-nonce", CLIENT_ID);
        assert!(verify_sd_jwt_vp(&vp, f.issuer.verifying_key(), &f.nonce, CLIENT_ID).is_err());
    }

    #[test]
    fn wrong_audience_fails() {
        let f = Fixture::new();
        let vp = f.presentation_with(f.nonce.as_str(), "attacker.example.com");
        assert!(verify_sd_jwt_vp(&vp, f.issuer.verifying_key(), &f.nonce, CLIENT_ID).is_err());
    }

    #[test]
    fn foreign_disclosure_fails() {
        let f = Fixture::new();
        let vp = f.presentation();
        // splice in a disclosure the credential never committed to
        let foreign = URL_SAFE_NO_PAD.encode(json!(["salt", "age", 42]).to_string());
        let (head, kb) = vp.rsplit_once('~').unwrap();
        let tampered = format!("{head}~{foreign}~{kb}");
        assert!(
            verify_sd_jwt_vp(&tampered, f.issuer.verifying_key(), &f.nonce, CLIENT_ID).is_err()
        );
    }
}
