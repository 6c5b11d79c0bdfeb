use anyhow::{Context, Result};
use chrono::Duration;
use p256::ecdsa::VerifyingKey;
use p256::pkcs8::DecodePublicKey;
use serde::Deserialize;
use url::Url;
use x509_cert::{
    der::{DecodePem, Encode},
    Certificate,
};

use crate::core::presentation::ResponseMode;
use crate::error::InitError;
use crate::jarm::JarmOption;

/// The public base of the verifier, normalized to end in `/` so wallet
/// endpoint paths can be appended without clobbering the last segment.
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        if !url.ends_with('/') {
            url.push('/');
        }
        url.parse().map(Self)
    }
}

/// Whether an artifact travels inside the Request Object or behind a URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedOption {
    ByValue,
    ByReference,
}

/// The Issuer key trusted for SD-JWT and mdoc verification.
#[derive(Debug, Clone)]
pub struct IssuerKey {
    pub key: VerifyingKey,
    /// When set, an mdoc `issuerAuth` must name this key id.
    pub kid: Option<String>,
}

impl IssuerKey {
    /// Load from a PEM-encoded X.509 certificate (`verifier.issuer.cert`).
    pub fn from_pem_certificate(pem: &str, kid: Option<String>) -> Result<Self> {
        let certificate =
            Certificate::from_pem(pem.as_bytes()).context("issuer certificate is not valid PEM")?;
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .context("issuer certificate has no encodable public key")?;
        let public_key = p256::PublicKey::from_public_key_der(&spki)
            .context("issuer public key is not an EC P-256 key")?;
        Ok(Self {
            key: VerifyingKey::from(&public_key),
            kid,
        })
    }

    /// Load from a JWK string, for deployments that configure the key
    /// directly.
    pub fn from_jwk_str(jwk: &str, kid: Option<String>) -> Result<Self> {
        let public_key =
            p256::PublicKey::from_jwk_str(jwk).context("issuer JWK is not an EC P-256 key")?;
        Ok(Self {
            key: VerifyingKey::from(&public_key),
            kid,
        })
    }
}

/// Static configuration of the verifier. Inconsistencies are fatal at
/// startup: [VerifierConfig::validate] runs when the verifier is built.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// `client_id` presented to the Wallet in the Request Object.
    pub client_id: String,
    /// `client_id_scheme`, e.g. `pre-registered`.
    pub client_id_scheme: String,
    /// Base for `request_uri`, `response_uri` and the presentation
    /// definition URI.
    pub public_url: BaseUrl,
    /// Default response mode for transactions that do not choose one.
    pub response_mode: ResponseMode,
    /// Default Request Object delivery.
    pub request_jwt_embed: EmbedOption,
    /// Default presentation definition delivery.
    pub presentation_definition_embed: EmbedOption,
    /// How the Wallet protects `direct_post.jwt` responses.
    pub jarm: JarmOption,
    /// Lifetime of a presentation before it times out.
    pub max_age: Duration,
    pub issuer: IssuerKey,
}

impl VerifierConfig {
    pub fn validate(&self) -> Result<(), InitError> {
        if self.response_mode == ResponseMode::DirectPostJwt
            && self.jarm == JarmOption::Unsigned
        {
            return Err(InitError::InvalidConfiguration(
                "direct_post.jwt requires a JARM signing or encryption algorithm".to_string(),
            ));
        }
        if self.max_age <= Duration::zero() {
            return Err(InitError::InvalidConfiguration(
                "max_age must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn request_uri(&self, request_id: &str) -> String {
        format!("{}wallet/request.jwt/{request_id}", &*self.public_url)
    }

    pub(crate) fn response_uri(&self, mode: ResponseMode) -> String {
        match mode {
            ResponseMode::DirectPost => format!("{}wallet/direct_post", &*self.public_url),
            ResponseMode::DirectPostJwt => {
                format!("{}wallet/direct_post.jwt", &*self.public_url)
            }
        }
    }

    pub(crate) fn presentation_definition_uri(&self, request_id: &str) -> String {
        format!("{}wallet/pd/{request_id}", &*self.public_url)
    }
}
