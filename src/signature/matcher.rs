//! Signature compilation and matching.

use serde_json::Value;

use crate::crashinfo::CrashInfo;
use crate::error::SignatureSyntaxError;

use super::canonical::compute_hash;
use super::symptoms::Symptom;

/// A signature document compiled into predicates.
///
/// Compilation has no side effects, so a compiled signature can be shared
/// across an entire bulk classification pass.
#[derive(Debug, Clone)]
pub struct CompiledSignature {
    document: Value,
    symptoms: Vec<Symptom>,
    platforms: Option<Vec<String>>,
    operating_systems: Option<Vec<String>>,
    products: Option<Vec<String>>,
}

impl CompiledSignature {
    /// Compile signature text.
    ///
    /// # Errors
    /// `SignatureSyntaxError` when the text is not a JSON object, has no
    /// symptoms, or contains a malformed symptom.
    pub fn compile(text: &str) -> Result<Self, SignatureSyntaxError> {
        let document: Value = serde_json::from_str(text)?;
        let obj = document.as_object().ok_or(SignatureSyntaxError::NotAnObject)?;

        let symptoms = obj
            .get("symptoms")
            .ok_or(SignatureSyntaxError::MissingField {
                field: "symptoms",
                context: "signature".to_string(),
            })?
            .as_array()
            .ok_or(SignatureSyntaxError::InvalidValue {
                field: "symptoms",
                reason: "expected an array".to_string(),
            })?
            .iter()
            .map(Symptom::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if symptoms.is_empty() {
            return Err(SignatureSyntaxError::NoSymptoms);
        }

        let platforms = string_list(obj.get("platforms"), "platforms")?;
        let operating_systems = string_list(obj.get("operatingSystems"), "operatingSystems")?;
        let products = string_list(obj.get("products"), "products")?;

        Ok(Self {
            document,
            symptoms,
            platforms,
            operating_systems,
            products,
        })
    }

    /// True iff the configuration filters and every symptom match.
    pub fn matches(&self, info: &CrashInfo) -> bool {
        let config = &info.configuration;
        allowed(&self.platforms, &config.platform)
            && allowed(&self.operating_systems, &config.os)
            && allowed(&self.products, &config.product)
            && self.symptoms.iter().all(|symptom| symptom.matches(info))
    }

    pub fn symptoms(&self) -> &[Symptom] {
        &self.symptoms
    }

    /// The document re-serialized with sorted keys and no insignificant whitespace.
    pub fn canonical_json(&self) -> String {
        sort_keys(&self.document).to_string()
    }

    /// SHA256 of the canonical document.
    pub fn signature_hash(&self) -> String {
        compute_hash(&self.canonical_json())
    }
}

fn string_list(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<Vec<String>>, SignatureSyntaxError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let invalid = || SignatureSyntaxError::InvalidValue {
        field,
        reason: "expected an array of strings".to_string(),
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|item| item.as_str().map(|s| s.to_string()).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), sort_keys(&obj[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn allowed(filter: &Option<Vec<String>>, value: &str) -> bool {
    filter
        .as_ref()
        .map_or(true, |list| list.iter().any(|item| item == value))
}
