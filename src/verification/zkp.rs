//! ZKP challenge verification.
//!
//! A ZKP-wrapped presentation carries the same artifact as its plain
//! counterpart, but its trailing signature component is a proof bound to a
//! per-descriptor key registered at transaction initiation rather than to
//! the Issuer key. The challenge message is domain-tagged by format so a
//! proof for one format can never satisfy the other.

use anyhow::{bail, Context, Result};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

use crate::utils::base64url_decode;
use crate::verification::mdoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZkpFormat {
    SdJwt,
    MsoMdoc,
}

impl ZkpFormat {
    fn label(&self) -> &'static str {
        match self {
            ZkpFormat::SdJwt => "sd-jwt",
            ZkpFormat::MsoMdoc => "mso_mdoc",
        }
    }
}

/// Check the challenge proof embedded in `data` against `key`.
///
/// Returns `Ok(false)` for a well-formed artifact whose proof does not
/// verify; malformed artifacts are errors.
pub fn verify_challenge(format: ZkpFormat, data: &str, key: &VerifyingKey) -> Result<bool> {
    let (message, proof) = match format {
        ZkpFormat::SdJwt => {
            let mut parts = data.split('.');
            let (Some(header), Some(payload), Some(signature), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                bail!("SD-JWT portion is not a compact JWS");
            };
            let proof =
                base64url_decode(signature).context("proof is not base64url")?;
            let message = format!("{}:{header}.{payload}", format.label()).into_bytes();
            (message, proof)
        }
        ZkpFormat::MsoMdoc => {
            let cbor = base64url_decode(data).context("document is not base64url")?;
            let document: ciborium::value::Value = ciborium::de::from_reader(cbor.as_slice())
                .context("document is not CBOR")?;
            let cose = mdoc::issuer_auth(&document)?;
            let payload = cose
                .payload
                .as_ref()
                .context("issuerAuth has no payload")?;
            let mut message = format!("{}:", format.label()).into_bytes();
            message.extend_from_slice(payload);
            (message, cose.signature)
        }
    };

    let Ok(signature) = Signature::from_slice(&proof) else {
        return Ok(false);
    };
    Ok(key.verify(&message, &signature).is_ok())
}

#[cfg(test)]
mod test {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use p256::ecdsa::{signature::Signer, SigningKey};

    fn proof_jwt(key: &SigningKey) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"ES256","typ":"vc+sd-jwt"}"#);
        let payload = URL_SAFE_NO_PAD.encode(r#"{"vct":"EmployeeIDCredential"}"#);
        let message = format!("sd-jwt:{header}.{payload}");
        let signature: Signature = key.sign(message.as_bytes());
        format!(
            "{header}.{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    #[test]
    fn valid_sd_jwt_challenge_passes() {
        let key = SigningKey::random(&mut rand::thread_rng());
        let jwt = proof_jwt(&key);
        assert!(verify_challenge(ZkpFormat::SdJwt, &jwt, key.verifying_key()).unwrap());
    }

    #[test]
    fn challenge_against_the_wrong_key_fails() {
        let key = SigningKey::random(&mut rand::thread_rng());
        let other = SigningKey::random(&mut rand::thread_rng());
        let jwt = proof_jwt(&key);
        assert!(!verify_challenge(ZkpFormat::SdJwt, &jwt, other.verifying_key()).unwrap());
    }

    #[test]
    fn format_tags_are_not_interchangeable() {
        let key = SigningKey::random(&mut rand::thread_rng());
        // a proof over the mso_mdoc tag presented as an sd-jwt challenge
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"ES256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(r#"{}"#);
        let message = format!("mso_mdoc:{header}.{payload}");
        let signature: Signature = key.sign(message.as_bytes());
        let jwt = format!(
            "{header}.{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );
        assert!(!verify_challenge(ZkpFormat::SdJwt, &jwt, key.verifying_key()).unwrap());
    }

    #[test]
    fn malformed_artifact_is_an_error() {
        let key = SigningKey::random(&mut rand::thread_rng());
        assert!(verify_challenge(ZkpFormat::SdJwt, "not-a-jws", key.verifying_key()).is_err());
    }
}
