//! ISO 18013-5 mdoc verification.
//!
//! The wire form is a base64url CBOR `DeviceResponse`: a map with a
//! `documents` list. Each document carries an `issuerSigned.issuerAuth`
//! COSE_Sign1 whose payload is the Mobile Security Object. Verification
//! checks the issuer signature, the MSO validity window and the document
//! type binding.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use ciborium::value::Value;
use coset::{CborSerializable, CoseSign1};
use p256::ecdsa::{signature::Verifier, Signature};

use crate::config::IssuerKey;
use crate::utils::{base64url_decode, base64url_encode};

pub fn verify_device_response(vp: &str, issuer: &IssuerKey, now: DateTime<Utc>) -> Result<()> {
    let documents = parse_device_response(vp)?;
    for document in &documents {
        verify_document(document, issuer, now)?;
    }
    Ok(())
}

/// Decode the base64url CBOR response and return its `documents`.
pub(crate) fn parse_device_response(vp: &str) -> Result<Vec<Value>> {
    let cbor = base64url_decode(vp).context("device response is not base64url")?;
    let response: Value =
        ciborium::de::from_reader(cbor.as_slice()).context("device response is not CBOR")?;
    if !response.is_map() {
        bail!("device response is not a CBOR map");
    }

    let documents = map_get(&response, "documents")
        .and_then(Value::as_array)
        .context("device response has no 'documents' list")?;
    if documents.is_empty() {
        bail!("device response contains no documents");
    }
    if !documents.iter().all(Value::is_map) {
        bail!("'documents' entries must be CBOR maps");
    }
    Ok(documents.clone())
}

/// Re-encode a single document as base64url CBOR.
pub(crate) fn encode_document(document: &Value) -> Result<String> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(document, &mut bytes).context("failed to encode document")?;
    Ok(base64url_encode(bytes))
}

/// The document's `issuerSigned.issuerAuth` as a COSE_Sign1.
pub(crate) fn issuer_auth(document: &Value) -> Result<CoseSign1> {
    let issuer_auth = map_get(document, "issuerSigned")
        .and_then(|signed| map_get(signed, "issuerAuth"))
        .context("document has no 'issuerSigned.issuerAuth'")?;

    let mut bytes = Vec::new();
    ciborium::ser::into_writer(issuer_auth, &mut bytes)
        .context("failed to re-encode issuerAuth")?;
    CoseSign1::from_slice(&bytes).map_err(|e| anyhow!("issuerAuth is not a COSE_Sign1: {e}"))
}

fn verify_document(document: &Value, issuer: &IssuerKey, now: DateTime<Utc>) -> Result<()> {
    let doc_type = map_get(document, "docType")
        .and_then(Value::as_text)
        .context("document has no 'docType'")?;

    let cose = issuer_auth(document)?;

    if let Some(expected_kid) = &issuer.kid {
        let kid = String::from_utf8_lossy(&cose.protected.header.key_id);
        if kid != *expected_kid {
            bail!("issuerAuth names key id '{kid}', expected '{expected_kid}'");
        }
    }

    cose.verify_signature(&[], |sig, data| {
        let signature = Signature::from_slice(sig)?;
        issuer.key.verify(data, &signature)
    })
    .map_err(|_| anyhow!("issuer signature verification failed"))?;

    let mso = mobile_security_object(&cose)?;

    let mso_doc_type = map_get(&mso, "docType")
        .and_then(Value::as_text)
        .context("MSO has no 'docType'")?;
    if mso_doc_type != doc_type {
        bail!("MSO docType '{mso_doc_type}' does not match document docType '{doc_type}'");
    }

    let validity = map_get(&mso, "validityInfo").context("MSO has no 'validityInfo'")?;
    let valid_from = tdate(validity, "validFrom")?;
    let valid_until = tdate(validity, "validUntil")?;
    if now < valid_from || now > valid_until {
        bail!("document is outside its validity window");
    }

    Ok(())
}

/// The issuerAuth payload is `#6.24(bstr)` wrapping the encoded MSO.
fn mobile_security_object(cose: &CoseSign1) -> Result<Value> {
    let payload = cose.payload.as_ref().context("issuerAuth has no payload")?;
    let value: Value =
        ciborium::de::from_reader(payload.as_slice()).context("MSO payload is not CBOR")?;
    match value {
        Value::Tag(24, inner) => {
            let bytes = inner.as_bytes().context("MSO tag 24 does not wrap bytes")?;
            ciborium::de::from_reader(bytes.as_slice()).context("MSO bytes are not CBOR")
        }
        mso @ Value::Map(_) => Ok(mso),
        _ => bail!("MSO payload has an unexpected shape"),
    }
}

fn tdate(validity: &Value, key: &str) -> Result<DateTime<Utc>> {
    let value = map_get(validity, key).with_context(|| format!("validityInfo has no '{key}'"))?;
    let text = match value {
        Value::Tag(0, inner) => inner.as_text(),
        Value::Text(_) => value.as_text(),
        _ => None,
    }
    .with_context(|| format!("'{key}' is not a tdate"))?;
    let parsed = DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("'{key}' is not RFC 3339"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}
