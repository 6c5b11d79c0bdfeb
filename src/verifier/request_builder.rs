//! InitTransaction: the Verifier front-end opens a presentation
//! transaction and receives what it needs to point a Wallet at it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::config::EmbedOption;
use crate::core::identifiers::{Nonce, RequestId, TransactionId};
use crate::core::presentation::{
    GetWalletResponseMethod, IdTokenType, Presentation, PresentationType, Requested,
    ResponseMode, RESPONSE_CODE_PLACEHOLDER,
};
use crate::core::presentation_exchange::PresentationDefinition;
use crate::error::InitError;
use crate::jarm::JarmOption;
use crate::verification::verifying_key_from_jwk;
use crate::verifier::request_object::{request_object, sign_request_object};
use crate::verifier::Verifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentationTypeTO {
    #[serde(rename = "id_token")]
    IdToken,
    #[default]
    #[serde(rename = "vp_token")]
    VpToken,
    #[serde(rename = "vp_token id_token")]
    IdAndVpToken,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitTransactionRequest {
    #[serde(rename = "type", default)]
    pub presentation_type: PresentationTypeTO,
    #[serde(default)]
    pub id_token_type: Option<IdTokenType>,
    #[serde(default)]
    pub presentation_definition: Option<PresentationDefinition>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub response_mode: Option<ResponseMode>,
    #[serde(default)]
    pub jar_mode: Option<EmbedOption>,
    #[serde(default)]
    pub presentation_definition_mode: Option<EmbedOption>,
    /// Present iff the front-end wants the Wallet redirected back to it;
    /// must contain the response-code placeholder exactly once.
    #[serde(default)]
    pub wallet_response_redirect_uri_template: Option<String>,
    /// Per input-descriptor public keys for ZKP challenge verification.
    #[serde(default)]
    pub zkp_keys: Option<BTreeMap<String, Json>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitTransactionResponse {
    pub transaction_id: TransactionId,
    pub client_id: String,
    /// The signed Request Object, when the JAR travels by value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    /// Where the Wallet can fetch the Request Object, when by reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<PresentationDefinition>,
}

pub(crate) async fn init_transaction(
    verifier: &Verifier,
    request: InitTransactionRequest,
) -> Result<InitTransactionResponse, InitError> {
    let config = verifier.config();

    let presentation_type = presentation_type(&request)?;
    validate_zkp_keys(&request, &presentation_type)?;
    let get_wallet_response_method = wallet_response_method(&request)?;

    let response_mode = request.response_mode.unwrap_or(config.response_mode);
    let ephemeral_ec_private_key = match response_mode {
        ResponseMode::DirectPost => None,
        ResponseMode::DirectPostJwt => {
            if config.jarm == JarmOption::Unsigned {
                return Err(InitError::InvalidConfiguration(
                    "direct_post.jwt requires a JARM signing or encryption algorithm"
                        .to_string(),
                ));
            }
            Some(generate_ephemeral_key(config.jarm.encryption().map(|(alg, _)| alg))?)
        }
    };

    let presentation_definition_by_reference = matches!(
        request
            .presentation_definition_mode
            .unwrap_or(config.presentation_definition_embed),
        EmbedOption::ByReference
    );

    let now = verifier.now();
    let requested = Requested {
        id: TransactionId::random(),
        request_id: RequestId::random(),
        initiated_at: now,
        presentation_type,
        response_mode,
        presentation_definition_by_reference,
        get_wallet_response_method,
        nonce: request.nonce.map(Nonce::new).unwrap_or_else(Nonce::random),
        ephemeral_ec_private_key,
        zkp_keys: request.zkp_keys,
    };
    debug!(
        transaction_id = %requested.id,
        request_id = %requested.request_id,
        "initiating presentation transaction"
    );

    let mut response = InitTransactionResponse {
        transaction_id: requested.id.clone(),
        client_id: config.client_id.clone(),
        request: None,
        request_uri: None,
        presentation_definition: if presentation_definition_by_reference {
            requested
                .presentation_type
                .presentation_definition()
                .cloned()
        } else {
            None
        },
    };

    match request.jar_mode.unwrap_or(config.request_jwt_embed) {
        EmbedOption::ByValue => {
            // The Wallet receives the JAR inline and will never fetch it,
            // so the transaction starts past the retrieval step.
            let claims = request_object(config, &requested);
            let jar = sign_request_object(verifier.signer(), &claims)
                .await
                .map_err(|e| InitError::InvalidConfiguration(e.to_string()))?;
            verifier
                .store()
                .store(Presentation::RequestObjectRetrieved(
                    requested.retrieve(now),
                ))
                .await;
            response.request = Some(jar);
        }
        EmbedOption::ByReference => {
            response.request_uri = Some(config.request_uri(requested.request_id.as_str()));
            verifier
                .store()
                .store(Presentation::Requested(requested))
                .await;
        }
    }

    Ok(response)
}

fn presentation_type(request: &InitTransactionRequest) -> Result<PresentationType, InitError> {
    let id_token_type = request.id_token_type.unwrap_or(IdTokenType::SubjectSigned);
    let presentation_definition = || {
        request.presentation_definition.clone().ok_or_else(|| {
            InitError::InvalidRequest(
                "a vp_token request requires a presentation_definition".to_string(),
            )
        })
    };

    match request.presentation_type {
        PresentationTypeTO::IdToken => Ok(PresentationType::IdTokenRequest { id_token_type }),
        PresentationTypeTO::VpToken => {
            let presentation_definition = presentation_definition()?;
            if presentation_definition.input_descriptors.is_empty() {
                return Err(InitError::InvalidRequest(
                    "presentation_definition has no input descriptors".to_string(),
                ));
            }
            Ok(PresentationType::VpTokenRequest {
                presentation_definition,
            })
        }
        PresentationTypeTO::IdAndVpToken => Ok(PresentationType::IdAndVpToken {
            id_token_type,
            presentation_definition: presentation_definition()?,
        }),
    }
}

fn validate_zkp_keys(
    request: &InitTransactionRequest,
    presentation_type: &PresentationType,
) -> Result<(), InitError> {
    let Some(zkp_keys) = &request.zkp_keys else {
        return Ok(());
    };
    let Some(definition) = presentation_type.presentation_definition() else {
        return Err(InitError::InvalidRequest(
            "zkp_keys require a vp_token request".to_string(),
        ));
    };
    for (descriptor_id, jwk) in zkp_keys {
        if !definition.descriptor_ids().any(|id| id == descriptor_id) {
            return Err(InitError::InvalidRequest(format!(
                "zkp_keys name unknown input descriptor '{descriptor_id}'"
            )));
        }
        if verifying_key_from_jwk(jwk).is_err() {
            return Err(InitError::InvalidRequest(format!(
                "zkp key for '{descriptor_id}' is not an EC P-256 JWK"
            )));
        }
    }
    Ok(())
}

fn wallet_response_method(
    request: &InitTransactionRequest,
) -> Result<GetWalletResponseMethod, InitError> {
    match &request.wallet_response_redirect_uri_template {
        None => Ok(GetWalletResponseMethod::Poll),
        Some(template) => {
            if template.matches(RESPONSE_CODE_PLACEHOLDER).count() != 1 {
                return Err(InitError::InvalidRequest(format!(
                    "redirect template must contain '{RESPONSE_CODE_PLACEHOLDER}' exactly once"
                )));
            }
            Ok(GetWalletResponseMethod::Redirect {
                uri_template: template.clone(),
            })
        }
    }
}

/// A fresh EC P-256 key pair for JARM encryption, as a private JWK.
fn generate_ephemeral_key(alg: Option<&str>) -> Result<Json, InitError> {
    let secret = p256::SecretKey::random(&mut rand::thread_rng());
    let mut jwk: Json = serde_json::from_str(&secret.to_jwk_string())
        .map_err(|e| InitError::InvalidConfiguration(e.to_string()))?;
    jwk["kid"] = json!(Uuid::new_v4().to_string());
    jwk["use"] = json!("enc");
    if let Some(alg) = alg {
        jwk["alg"] = json!(alg);
    }
    Ok(jwk)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn definition() -> PresentationDefinition {
        serde_json::from_value(json!({
            "id": "pd-1",
            "input_descriptors": [{ "id": "employment" }]
        }))
        .unwrap()
    }

    #[test]
    fn vp_token_requires_a_definition() {
        let request = InitTransactionRequest {
            presentation_type: PresentationTypeTO::VpToken,
            ..Default::default()
        };
        assert!(matches!(
            presentation_type(&request),
            Err(InitError::InvalidRequest(_))
        ));
    }

    #[test]
    fn id_token_type_defaults_to_subject_signed() {
        let request = InitTransactionRequest {
            presentation_type: PresentationTypeTO::IdToken,
            ..Default::default()
        };
        assert_eq!(
            presentation_type(&request).unwrap(),
            PresentationType::IdTokenRequest {
                id_token_type: IdTokenType::SubjectSigned
            }
        );
    }

    #[test]
    fn redirect_template_must_contain_the_placeholder_once() {
        let bad = InitTransactionRequest {
            wallet_response_redirect_uri_template: Some("https://ui.example.com/cb".to_string()),
            ..Default::default()
        };
        assert!(wallet_response_method(&bad).is_err());

        let twice = InitTransactionRequest {
            wallet_response_redirect_uri_template: Some(
                "https://ui.example.com/{RESPONSE_CODE}/{RESPONSE_CODE}".to_string(),
            ),
            ..Default::default()
        };
        assert!(wallet_response_method(&twice).is_err());

        let good = InitTransactionRequest {
            wallet_response_redirect_uri_template: Some(
                "https://ui.example.com/cb?code={RESPONSE_CODE}".to_string(),
            ),
            ..Default::default()
        };
        assert!(matches!(
            wallet_response_method(&good).unwrap(),
            GetWalletResponseMethod::Redirect { .. }
        ));
    }

    #[test]
    fn zkp_keys_must_name_known_descriptors() {
        let request = InitTransactionRequest {
            presentation_type: PresentationTypeTO::VpToken,
            presentation_definition: Some(definition()),
            zkp_keys: Some(BTreeMap::from([(
                "unknown".to_string(),
                json!({ "kty": "EC", "crv": "P-256" }),
            )])),
            ..Default::default()
        };
        let pt = presentation_type(&request).unwrap();
        assert!(matches!(
            validate_zkp_keys(&request, &pt),
            Err(InitError::InvalidRequest(_))
        ));
    }

    #[test]
    fn ephemeral_key_is_a_private_enc_jwk() {
        let jwk = generate_ephemeral_key(Some("ECDH-ES")).unwrap();
        assert_eq!(jwk["kty"], "EC");
        assert_eq!(jwk["crv"], "P-256");
        assert_eq!(jwk["use"], "enc");
        assert_eq!(jwk["alg"], "ECDH-ES");
        assert!(jwk.get("d").is_some());
    }

    #[test]
    fn request_type_wire_names() {
        let request: InitTransactionRequest =
            serde_json::from_value(json!({ "type": "vp_token id_token" })).unwrap();
        assert_eq!(request.presentation_type, PresentationTypeTO::IdAndVpToken);
    }
}
