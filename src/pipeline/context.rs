//! Pipeline context management.
//!
//! Provides batch and report context for logging.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Context for a batch of crash reports.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub batch_id: String,
    pub received_at: DateTime<Utc>,
    /// Submitting client, used when a report does not name one.
    pub default_client: Option<String>,
}

impl BatchContext {
    pub fn new(received_at: Option<&str>, default_client: Option<&str>) -> Self {
        let batch_id = format!("batch-{}", &Uuid::new_v4().to_string()[..8]);

        let received_at = received_at
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Self {
            batch_id,
            received_at,
            default_client: default_client.map(|s| s.to_string()),
        }
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::new(&self.batch_id)
    }

    /// Context for the report at `index` within this batch.
    pub fn report_context(&self, index: usize) -> LogContext {
        self.log_context().with_record("report", index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_at_parsing() {
        let ctx = BatchContext::new(Some("2026-01-29T12:00:00Z"), None);
        assert_eq!(ctx.received_at.to_rfc3339(), "2026-01-29T12:00:00+00:00");
        assert!(ctx.batch_id.starts_with("batch-"));

        let fallback = BatchContext::new(Some("yesterday"), Some("fuzzer-07"));
        assert!(fallback.received_at <= Utc::now());
        assert_eq!(fallback.default_client.as_deref(), Some("fuzzer-07"));
    }

    #[test]
    fn test_report_context() {
        let ctx = BatchContext::new(None, None);
        let display = format!("{}", ctx.report_context(3));
        assert!(display.ends_with("[record=report:3]"));
    }
}
