use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::presentation::ResponseMode;
use crate::core::presentation_exchange::PresentationSubmission;

/// The Wallet's Authorisation Response, as posted to the submission
/// endpoint. Which variant is acceptable is decided per presentation by its
/// configured [ResponseMode].
#[derive(Debug, Clone)]
pub enum AuthorisationResponse {
    /// `POST /wallet/direct_post` — the response parameters as plain form
    /// fields.
    DirectPost(AuthorisationResponsePayload),
    /// `POST /wallet/direct_post.jwt` — the response parameters wrapped in
    /// a JARM envelope.
    DirectPostJwt {
        state: Option<String>,
        response: String,
    },
}

impl AuthorisationResponse {
    pub fn response_mode(&self) -> ResponseMode {
        match self {
            AuthorisationResponse::DirectPost(_) => ResponseMode::DirectPost,
            AuthorisationResponse::DirectPostJwt { .. } => ResponseMode::DirectPostJwt,
        }
    }

    /// The outer `state` parameter, whichever transport carried it.
    pub fn state(&self) -> Option<&str> {
        match self {
            AuthorisationResponse::DirectPost(payload) => payload.state.as_deref(),
            AuthorisationResponse::DirectPostJwt { state, .. } => state.as_deref(),
        }
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    ///
    /// A body carrying a `response` field is a `direct_post.jwt`
    /// submission; anything else is read as plain `direct_post` fields.
    pub fn from_x_www_form_urlencoded(bytes: &[u8]) -> Result<Self> {
        let fields: Vec<(String, String)> =
            serde_urlencoded::from_bytes(bytes).context("failed to decode form body")?;

        if fields.iter().any(|(k, _)| k == "response") {
            let mut state = None;
            let mut response = None;
            for (key, value) in fields {
                match key.as_str() {
                    "state" => state = Some(value),
                    "response" => response = Some(value),
                    _ => {}
                }
            }
            return Ok(AuthorisationResponse::DirectPostJwt {
                state,
                response: response.context("missing 'response' field")?,
            });
        }

        Ok(AuthorisationResponse::DirectPost(
            AuthorisationResponsePayload::from_form_fields(fields)?,
        ))
    }
}

/// The response parameters themselves: either the fields of the
/// `direct_post` form, or the claim set recovered from a JARM envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorisationResponsePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vp_token: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthorisationResponsePayload {
    /// Form values are strings; `vp_token` may be a bare token or a JSON
    /// array of tokens, and `presentation_submission` is JSON-in-a-string.
    fn from_form_fields(fields: Vec<(String, String)>) -> Result<Self> {
        let mut payload = AuthorisationResponsePayload::default();
        for (key, value) in fields {
            match key.as_str() {
                "state" => payload.state = Some(value),
                "id_token" => payload.id_token = Some(value),
                "vp_token" => {
                    payload.vp_token = Some(
                        serde_json::from_str(&value).unwrap_or(Json::String(value)),
                    );
                }
                "presentation_submission" => {
                    payload.presentation_submission = Some(
                        serde_json::from_str(&value)
                            .context("'presentation_submission' is not valid JSON")?,
                    );
                }
                "error" => payload.error = Some(value),
                "error_description" => payload.error_description = Some(value),
                _ => {}
            }
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_post_form_is_decoded() {
        let body = serde_urlencoded::to_string([
            ("state", "abc"),
            ("vp_token", "eyJh.jwt~d~kb"),
            (
                "presentation_submission",
                r#"{"id":"s","definition_id":"pd","descriptor_map":[]}"#,
            ),
        ])
        .unwrap();

        let response =
            AuthorisationResponse::from_x_www_form_urlencoded(body.as_bytes()).unwrap();
        assert_eq!(response.state(), Some("abc"));
        let AuthorisationResponse::DirectPost(payload) = response else {
            panic!("expected direct_post");
        };
        assert_eq!(payload.vp_token, Some(json!("eyJh.jwt~d~kb")));
        assert_eq!(
            payload.presentation_submission.unwrap().definition_id,
            "pd"
        );
    }

    #[test]
    fn vp_token_array_is_parsed_as_json() {
        let body =
            serde_urlencoded::to_string([("state", "abc"), ("vp_token", r#"["a","b"]"#)])
                .unwrap();
        let AuthorisationResponse::DirectPost(payload) =
            AuthorisationResponse::from_x_www_form_urlencoded(body.as_bytes()).unwrap()
        else {
            panic!("expected direct_post");
        };
        assert_eq!(payload.vp_token, Some(json!(["a", "b"])));
    }

    #[test]
    fn response_field_selects_the_jwt_variant() {
        let body =
            serde_urlencoded::to_string([("state", "abc"), ("response", "e.y.j")]).unwrap();
        let response =
            AuthorisationResponse::from_x_www_form_urlencoded(body.as_bytes()).unwrap();
        assert_eq!(response.response_mode(), ResponseMode::DirectPostJwt);
        let AuthorisationResponse::DirectPostJwt { state, response } = response else {
            panic!("expected direct_post.jwt");
        };
        assert_eq!(state.as_deref(), Some("abc"));
        assert_eq!(response, "e.y.j");
    }

    #[test]
    fn error_form_is_decoded() {
        let body = serde_urlencoded::to_string([
            ("state", "abc"),
            ("error", "access_denied"),
            ("error_description", "user declined"),
        ])
        .unwrap();
        let AuthorisationResponse::DirectPost(payload) =
            AuthorisationResponse::from_x_www_form_urlencoded(body.as_bytes()).unwrap()
        else {
            panic!("expected direct_post");
        };
        assert_eq!(payload.error.as_deref(), Some("access_denied"));
    }
}
