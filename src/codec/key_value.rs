//! Key/value list codec.
//!
//! Environment variables and metadata travel as ordered `"KEY=VALUE"` lists
//! but are persisted as JSON objects. Program arguments are persisted as a
//! JSON array so their order survives.

use serde_json::{Map, Value};

use crate::error::FormatError;

/// Encode `"KEY=VALUE"` entries into JSON object text.
///
/// Entries are split on the first `=` only, so values may contain `=`.
/// When a key repeats, the last entry wins.
pub fn encode(entries: &[String]) -> Result<String, FormatError> {
    let mut object = Map::new();
    for entry in entries {
        let (key, value) = split_entry(entry)?;
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(object).to_string())
}

/// Decode JSON object text back into `"KEY=VALUE"` entries.
///
/// The order of the result follows the object, not the list that was
/// originally encoded.
pub fn decode(text: &str) -> Result<Vec<String>, FormatError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => Ok(object
            .iter()
            .map(|(key, value)| format!("{}={}", key, value_to_string(value)))
            .collect()),
        other => Err(FormatError::UnexpectedShape {
            expected: "JSON object",
            found: json_kind(&other).to_string(),
        }),
    }
}

/// Encode program arguments as a JSON array, preserving order.
pub fn encode_args(args: &[String]) -> Result<String, FormatError> {
    Ok(serde_json::to_string(args)?)
}

/// Decode a JSON array of strings into program arguments.
pub fn decode_args(text: &str) -> Result<Vec<String>, FormatError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(FormatError::UnexpectedShape {
                    expected: "string argument",
                    found: json_kind(&other).to_string(),
                }),
            })
            .collect(),
        other => Err(FormatError::UnexpectedShape {
            expected: "JSON array",
            found: json_kind(&other).to_string(),
        }),
    }
}

/// Split one entry on its first `=`.
pub fn split_entry(entry: &str) -> Result<(&str, &str), FormatError> {
    entry
        .split_once('=')
        .ok_or_else(|| FormatError::MissingSeparator {
            entry: entry.to_string(),
        })
}

/// Render a JSON value the way it is shown in a `"KEY=VALUE"` entry.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => value.to_string(), // numbers, booleans, nested JSON
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
