//! Structured logging utilities.
//!
//! Provides context-aware logging with job_id and the current record
//! included in every log message.

use std::fmt;

/// Logging context for a classification batch or a sync job.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub job_id: String,
    pub record: Option<String>,
}

impl LogContext {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            record: None,
        }
    }

    /// Narrow the context to one record, e.g. `with_record("collection", 12)`.
    pub fn with_record(&self, table: &str, pk: impl fmt::Display) -> Self {
        Self {
            job_id: self.job_id.clone(),
            record: Some(format!("{}:{}", table, pk)),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record {
            Some(record) => write!(f, "[job={}] [record={}]", self.job_id, record),
            None => write!(f, "[job={}]", self.job_id),
        }
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::info!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::warn!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::error!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::debug!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}
