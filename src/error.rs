//! Error types.
//!
//! One enum per failure domain so callers can tell a bad crash report apart
//! from a bad bucket signature or a failing provider backend.

use thiserror::Error;

/// Malformed key/value text or JSON in a persisted record field.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("entry {entry:?} has no '=' separator")]
    MissingSeparator { entry: String },

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: String,
    },
}

/// A signature document that cannot be compiled into a matcher.
#[derive(Debug, Error)]
pub enum SignatureSyntaxError {
    #[error("signature is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("signature must be a JSON object")]
    NotAnObject,

    #[error("signature has no symptoms")]
    NoSymptoms,

    #[error("missing field {field:?} in {context}")]
    MissingField {
        field: &'static str,
        context: String,
    },

    #[error("unknown symptom type {0:?}")]
    UnknownSymptom(String),

    #[error("invalid value for {field:?}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Failures raised while resolving or calling an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown {kind} provider {name:?}")]
    UnknownProvider { kind: &'static str, name: String },

    #[error("{kind} provider {name:?} is already registered")]
    DuplicateProvider { kind: &'static str, name: String },

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {args:?} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        args: Vec<String>,
        status: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Failures raised by the record store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} record {pk} not found")]
    NotFound { table: &'static str, pk: i64 },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure of a single revision sync work item.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Failure reading the crate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}
