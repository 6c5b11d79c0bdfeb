use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

use crate::utils::NonEmptyVec;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    pub id: String,
    pub input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Json>,
}

impl PresentationDefinition {
    pub fn descriptor_ids(&self) -> impl Iterator<Item = &str> {
        self.input_descriptors.iter().map(|d| d.id.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<ConstraintsField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    pub path: NonEmptyVec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_to_retain: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}

/// Metadata the Wallet submits alongside `vp_token`, mapping each input
/// descriptor of the presentation definition to a location inside the token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    pub id: String,
    pub definition_id: String,
    pub descriptor_map: Vec<DescriptorMap>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: String,
    pub format: VpFormat,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    /// Evaluate the descriptor's JSONPath against the `vp_token`, expecting
    /// exactly one match. Each `path_nested` level is resolved relative to
    /// the value its parent selected.
    pub fn extract<'a>(&self, vp_token: &'a Json) -> Option<&'a Json> {
        let mut current = query_one(&self.path, vp_token)?;
        let mut nested = self.path_nested.as_deref();
        while let Some(descriptor) = nested {
            current = query_one(&descriptor.path, current)?;
            nested = descriptor.path_nested.as_deref();
        }
        Some(current)
    }
}

fn query_one<'a>(path: &str, value: &'a Json) -> Option<&'a Json> {
    let path = JsonPath::parse(path).ok()?;
    path.query(value).exactly_one().ok()
}

/// Claim formats this verifier can validate, plus a catch-all for anything
/// a wallet might submit that it cannot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum VpFormat {
    SdJwt,
    MsoMdoc,
    SdJwtZkp,
    MsoMdocZkp,
    Unsupported(String),
}

const VC_SD_JWT: &str = "vc+sd-jwt";
const MSO_MDOC: &str = "mso_mdoc";
const VC_SD_JWT_ZKP: &str = "vc+sd-jwt+zkp";
const MSO_MDOC_ZKP: &str = "mso_mdoc+zkp";

impl From<String> for VpFormat {
    fn from(s: String) -> Self {
        match s.as_str() {
            VC_SD_JWT => VpFormat::SdJwt,
            MSO_MDOC => VpFormat::MsoMdoc,
            VC_SD_JWT_ZKP => VpFormat::SdJwtZkp,
            MSO_MDOC_ZKP => VpFormat::MsoMdocZkp,
            _ => VpFormat::Unsupported(s),
        }
    }
}

impl From<VpFormat> for String {
    fn from(f: VpFormat) -> Self {
        match f {
            VpFormat::SdJwt => VC_SD_JWT.into(),
            VpFormat::MsoMdoc => MSO_MDOC.into(),
            VpFormat::SdJwtZkp => VC_SD_JWT_ZKP.into(),
            VpFormat::MsoMdocZkp => MSO_MDOC_ZKP.into(),
            VpFormat::Unsupported(s) => s,
        }
    }
}
