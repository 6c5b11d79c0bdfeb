//! Wallet-side fixtures: keys, SD-JWTs, mdocs and JARM envelopes, plus a
//! verifier wired to a controllable clock.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use ciborium::value::Value;
use coset::CborSerializable;
use josekit::jwk::Jwk;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};

use oid4vp_verifier::config::{BaseUrl, EmbedOption, IssuerKey, VerifierConfig};
use oid4vp_verifier::core::identifiers::RequestId;
use oid4vp_verifier::core::presentation::ResponseMode;
use oid4vp_verifier::jarm::JarmOption;
use oid4vp_verifier::store::MemoryStore;
use oid4vp_verifier::verifier::request_signer::P256Signer;
use oid4vp_verifier::verifier::{Clock, Verifier};

pub const CLIENT_ID: &str = "verifier.example.com";
pub const ISSUER_KID: &str = "issuer-key-1";
pub const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";

/// A clock the tests can move forward past `max_age`.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        FixedClock::now(self)
    }
}

pub struct TestContext {
    pub verifier: Verifier,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub issuer_key: SigningKey,
}

pub fn context(response_mode: ResponseMode) -> TestContext {
    context_with_jarm(
        response_mode,
        JarmOption::Encrypted {
            alg: "ECDH-ES".into(),
            enc: "A128CBC-HS256".into(),
        },
    )
}

pub fn context_with_jarm(response_mode: ResponseMode, jarm: JarmOption) -> TestContext {
    let issuer_key = SigningKey::random(&mut rand::thread_rng());
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(FixedClock::new(Utc::now()));

    let config = VerifierConfig {
        client_id: CLIENT_ID.to_string(),
        client_id_scheme: "pre-registered".to_string(),
        public_url: BaseUrl::try_from("https://verifier.example.com".to_string()).unwrap(),
        response_mode,
        request_jwt_embed: EmbedOption::ByReference,
        presentation_definition_embed: EmbedOption::ByValue,
        jarm,
        max_age: Duration::minutes(5),
        issuer: IssuerKey {
            key: *issuer_key.verifying_key(),
            kid: Some(ISSUER_KID.to_string()),
        },
    };

    let verifier = Verifier::builder()
        .with_config(config)
        .with_store(store.clone())
        .with_signer(Arc::new(P256Signer::generate().unwrap()))
        .with_clock(clock.clone())
        .build()
        .unwrap();

    TestContext {
        verifier,
        store,
        clock,
        issuer_key,
    }
}

/// The request id is the last segment of the `request_uri` handed to the
/// Wallet.
pub fn request_id_of(request_uri: &str) -> RequestId {
    RequestId::new(request_uri.rsplit('/').next().unwrap())
}

/// Decode a JWT's claims without verifying it, the way a test Wallet reads
/// the Request Object it fetched.
pub fn jwt_claims(jwt: &str) -> Json {
    let payload = jwt.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

pub fn sign_jwt(key: &SigningKey, header: &Json, claims: &Json) -> String {
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

pub fn public_jwk(key: &SigningKey) -> Json {
    let public = p256::PublicKey::from(key.verifying_key());
    let point = public.to_encoded_point(false);
    json!({
        "kty": "EC",
        "crv": "P-256",
        "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
        "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
    })
}

/// A full SD-JWT presentation: issuer-signed credential, one disclosure,
/// and a key-binding JWT bound to `nonce` and `aud`.
pub fn sd_jwt_presentation(
    issuer: &SigningKey,
    holder: &SigningKey,
    nonce: &str,
    aud: &str,
) -> String {
    let disclosure = URL_SAFE_NO_PAD.encode(json!(["salt", "given_name", "Erika"]).to_string());
    let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(disclosure.as_bytes()));

    let credential = sign_jwt(
        issuer,
        &json!({ "alg": "ES256", "typ": "vc+sd-jwt" }),
        &json!({
            "iss": "https://issuer.example.com",
            "vct": "EmployeeIDCredential",
            "_sd": [digest],
            "_sd_alg": "sha-256",
            "cnf": { "jwk": public_jwk(holder) },
        }),
    );

    let presented = format!("{credential}~{disclosure}~");
    let sd_hash = URL_SAFE_NO_PAD.encode(Sha256::digest(presented.as_bytes()));
    let kb = sign_jwt(
        holder,
        &json!({ "alg": "ES256", "typ": "kb+jwt" }),
        &json!({ "nonce": nonce, "aud": aud, "iat": 1700000000, "sd_hash": sd_hash }),
    );
    format!("{presented}{kb}")
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn tagged_date(at: DateTime<Utc>) -> Value {
    Value::Tag(0, Box::new(text(&at.to_rfc3339())))
}

/// A base64url CBOR DeviceResponse with one issuer-signed document.
pub fn mdoc_device_response(issuer: &SigningKey, now: DateTime<Utc>) -> String {
    let mso = Value::Map(vec![
        (text("version"), text("1.0")),
        (text("digestAlgorithm"), text("SHA-256")),
        (text("docType"), text(DOC_TYPE)),
        (
            text("validityInfo"),
            Value::Map(vec![
                (text("signed"), tagged_date(now - Duration::days(1))),
                (text("validFrom"), tagged_date(now - Duration::days(1))),
                (text("validUntil"), tagged_date(now + Duration::days(364))),
            ]),
        ),
    ]);
    let mut mso_bytes = Vec::new();
    ciborium::ser::into_writer(&mso, &mut mso_bytes).unwrap();
    let wrapped = Value::Tag(24, Box::new(Value::Bytes(mso_bytes)));
    let mut payload = Vec::new();
    ciborium::ser::into_writer(&wrapped, &mut payload).unwrap();

    let protected = coset::HeaderBuilder::new()
        .algorithm(coset::iana::Algorithm::ES256)
        .key_id(ISSUER_KID.as_bytes().to_vec())
        .build();
    let sign1 = coset::CoseSign1Builder::new()
        .protected(protected)
        .payload(payload)
        .create_signature(&[], |data| {
            let signature: Signature = issuer.sign(data);
            signature.to_bytes().to_vec()
        })
        .build();
    let issuer_auth: Value =
        ciborium::de::from_reader(sign1.to_vec().unwrap().as_slice()).unwrap();

    let document = Value::Map(vec![
        (text("docType"), text(DOC_TYPE)),
        (
            text("issuerSigned"),
            Value::Map(vec![(text("issuerAuth"), issuer_auth)]),
        ),
    ]);
    let response = Value::Map(vec![
        (text("version"), text("1.0")),
        (text("documents"), Value::Array(vec![document])),
        (text("status"), Value::Integer(0u8.into())),
    ]);
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&response, &mut bytes).unwrap();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Encrypt a JARM payload to the ephemeral key the verifier advertised in
/// `client_metadata.jwks`.
pub fn encrypt_jarm(payload: &Json, recipient_jwk: &Json) -> String {
    let jwk = Jwk::from_bytes(serde_json::to_vec(recipient_jwk).unwrap()).unwrap();
    let mut header = josekit::jwe::JweHeader::new();
    header.set_algorithm("ECDH-ES");
    header.set_content_encryption("A128CBC-HS256");
    header.set_token_type("JWT");
    let encrypter = josekit::jwe::ECDH_ES.encrypter_from_jwk(&jwk).unwrap();
    josekit::jwe::serialize_compact(
        &serde_json::to_vec(payload).unwrap(),
        &header,
        &encrypter,
    )
    .unwrap()
}

pub fn presentation_definition(descriptor_id: &str) -> Json {
    json!({
        "id": "pd-1",
        "input_descriptors": [{
            "id": descriptor_id,
            "constraints": {
                "fields": [{ "path": ["$.vct"] }]
            }
        }]
    })
}

pub fn presentation_submission(descriptor_id: &str, format: &str, path: &str) -> String {
    json!({
        "id": "sub-1",
        "definition_id": "pd-1",
        "descriptor_map": [{ "id": descriptor_id, "format": format, "path": path }]
    })
    .to_string()
}
