use anyhow::Result;
use async_trait::async_trait;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde_json::Value as Json;

/// Signs the Request Object (JAR) on behalf of the verifier.
#[async_trait]
pub trait RequestSigner: std::fmt::Debug {
    /// The algorithm that will be used to sign.
    fn alg(&self) -> &str;
    /// The public JWK of the signer.
    fn jwk(&self) -> &Json;
    /// Key id to advertise in the JWS header, when the key has one.
    fn kid(&self) -> Option<&str> {
        None
    }
    async fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

#[derive(Debug)]
pub struct P256Signer {
    key: SigningKey,
    jwk: Json,
}

impl P256Signer {
    pub fn new(key: SigningKey) -> Result<Self> {
        let pk: p256::PublicKey = key.verifying_key().into();
        let jwk = serde_json::from_str(&pk.to_jwk_string())?;
        Ok(Self { key, jwk })
    }

    /// A fresh signing key, for deployments without a provisioned keystore.
    pub fn generate() -> Result<Self> {
        Self::new(SigningKey::random(&mut rand::thread_rng()))
    }

    pub fn verifying_key(&self) -> &p256::ecdsa::VerifyingKey {
        self.key.verifying_key()
    }
}

#[async_trait]
impl RequestSigner for P256Signer {
    fn alg(&self) -> &str {
        "ES256"
    }

    fn jwk(&self) -> &Json {
        &self.jwk
    }

    async fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let sig: Signature = self.key.sign(payload);
        sig.to_vec()
    }
}
