//! Crash report ingestion pipeline.
//!
//! Coordinates the processing of one batch:
//! 1. Compile bucket signatures once
//! 2. Parse each report
//! 3. Encode args/env/metadata
//! 4. Derive short signature and crash address
//! 5. Assign a bucket
//! 6. Save the entry

use serde::{Deserialize, Serialize};

use crate::classification::{BucketIndex, ClassificationDecision, InvalidBucket};
use crate::error::{FormatError, StoreError};
use crate::storage::{Client, CrashEntry, Os, Platform, Product, RecordStore};

use super::context::BatchContext;

/// A crash report as submitted by a fuzzing client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    #[serde(default)]
    pub raw_stdout: String,
    #[serde(default)]
    pub raw_stderr: String,
    #[serde(default)]
    pub raw_crash_data: String,
    pub platform: String,
    pub product: String,
    #[serde(default)]
    pub product_version: Option<String>,
    pub os: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<String>,
    #[serde(default)]
    pub testcase_id: Option<i64>,
}

/// Result of processing a single report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub index: usize,
    pub accepted: bool,
    pub entry_id: Option<i64>,
    pub bucket_id: Option<i64>,
    pub short_signature: Option<String>,
    pub rejection_reason: Option<String>,
}

impl ReportResult {
    fn rejected(index: usize, reason: String) -> Self {
        Self {
            index,
            accepted: false,
            entry_id: None,
            bucket_id: None,
            short_signature: None,
            rejection_reason: Some(reason),
        }
    }
}

/// Result of processing a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub bucketed: usize,
    pub invalid_buckets: Vec<InvalidBucket>,
    pub reports: Vec<ReportResult>,
}

/// Process a batch of JSON crash reports.
///
/// Malformed reports are rejected individually. A store failure aborts the
/// batch; entries saved before it stay saved.
pub fn process_batch(
    ctx: &BatchContext,
    store: &dyn RecordStore,
    reports: Vec<String>,
) -> Result<BatchResult, StoreError> {
    let log_ctx = ctx.log_context();
    let buckets = store.buckets()?;
    let index = BucketIndex::compile(&buckets, &log_ctx);

    let mut results = Vec::with_capacity(reports.len());
    let mut accepted = 0;
    let mut bucketed = 0;

    for (i, report) in reports.iter().enumerate() {
        let result = process_single_report(ctx, store, &index, i, report)?;
        if result.accepted {
            accepted += 1;
        }
        if result.bucket_id.is_some() {
            bucketed += 1;
        }
        results.push(result);
    }

    log::info!(
        "{} BATCH_COMPLETE received={} accepted={} rejected={} bucketed={} invalid_buckets={}",
        log_ctx,
        reports.len(),
        accepted,
        reports.len() - accepted,
        bucketed,
        index.invalid_buckets().len()
    );

    Ok(BatchResult {
        received: reports.len(),
        accepted,
        rejected: reports.len() - accepted,
        bucketed,
        invalid_buckets: index.invalid_buckets().to_vec(),
        reports: results,
    })
}

fn process_single_report(
    ctx: &BatchContext,
    store: &dyn RecordStore,
    index: &BucketIndex,
    i: usize,
    report_json: &str,
) -> Result<ReportResult, StoreError> {
    let log_ctx = ctx.report_context(i);

    let report: CrashReport = match serde_json::from_str(report_json) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("{} REPORT_PARSE_FAILED error={}", log_ctx, e);
            return Ok(ReportResult::rejected(i, format!("JSON parse error: {}", e)));
        }
    };

    let mut entry = match build_entry(ctx, report) {
        Ok(entry) => entry,
        Err(e) => {
            log::warn!("{} REPORT_FIELDS_INVALID error={}", log_ctx, e);
            return Ok(ReportResult::rejected(i, e.to_string()));
        }
    };

    let info = entry.refresh_derived_fields();
    let decision = index.classify(&info);
    entry.bucket_id = decision.bucket_id();

    let entry_id = entry.save(store)?;

    match decision {
        ClassificationDecision::Bucketed(bucket) => log::info!(
            "{} REPORT_BUCKETED entry={} bucket={} signature={:?}",
            log_ctx,
            entry_id,
            bucket,
            entry.short_signature
        ),
        ClassificationDecision::Unbucketed => log::info!(
            "{} REPORT_UNBUCKETED entry={} signature={:?}",
            log_ctx,
            entry_id,
            entry.short_signature
        ),
    }

    Ok(ReportResult {
        index: i,
        accepted: true,
        entry_id: Some(entry_id),
        bucket_id: entry.bucket_id,
        short_signature: Some(entry.short_signature.clone()),
        rejection_reason: None,
    })
}

fn build_entry(ctx: &BatchContext, report: CrashReport) -> Result<CrashEntry, FormatError> {
    let client = report
        .client
        .or_else(|| ctx.default_client.clone())
        .unwrap_or_default();

    let mut entry = CrashEntry::new(
        Platform { name: report.platform },
        Product {
            name: report.product,
            version: report.product_version,
        },
        Os {
            name: report.os,
            version: None,
        },
        Client { name: client },
    );
    entry.created = ctx.received_at;
    entry.testcase_id = report.testcase_id;
    entry.raw_stdout = report.raw_stdout;
    entry.raw_stderr = report.raw_stderr;
    entry.raw_crash_data = report.raw_crash_data;

    if !report.args.is_empty() {
        entry.set_args(report.args)?;
    }
    if !report.env.is_empty() {
        entry.set_env(report.env)?;
    }
    if !report.metadata.is_empty() {
        entry.set_metadata(report.metadata)?;
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Bucket, InMemoryStore};

    const GDB_REPORT: &str = r#"{
        "rawStderr": "Program received signal SIGSEGV, Segmentation fault.\n#0  0x00005555 in js::jit::Invalidate ()\n#1  0x00005566 in js::RunScript ()\n",
        "platform": "x86-64",
        "product": "mozilla-central",
        "productVersion": "52.0a1",
        "os": "linux",
        "client": "fuzzer-01",
        "args": ["--fuzzing-safe", "--ion-eager"],
        "env": ["ASAN_OPTIONS=detect_leaks=0"],
        "metadata": ["pathPrefix=/builds/"]
    }"#;

    fn ctx() -> BatchContext {
        BatchContext::new(Some("2026-01-29T00:00:00Z"), None)
    }

    #[test]
    fn test_process_invalid_json() {
        let store = InMemoryStore::new();
        let result = process_batch(&ctx(), &store, vec!["invalid json{".to_string()]).unwrap();
        assert_eq!(result.rejected, 1);
        assert!(result.reports[0].rejection_reason.is_some());
    }

    #[test]
    fn test_env_without_separator_is_rejected() {
        let store = InMemoryStore::new();
        let report = r#"{"platform": "x86-64", "product": "p", "os": "linux", "env": ["NOSEPARATOR"]}"#;
        let result = process_batch(&ctx(), &store, vec![report.to_string()]).unwrap();
        assert_eq!(result.accepted, 0);
        assert!(result.reports[0]
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("NOSEPARATOR"));
    }

    #[test]
    fn test_report_is_stored_and_bucketed() {
        let store = InMemoryStore::new();
        let bucket_pk = Bucket::new(
            r#"{"symptoms": [{"type": "stackFrame", "functionName": "js::jit::Invalidate", "frameNumber": 0}]}"#,
            "Invalidate",
        )
        .save(&store)
        .unwrap();

        let result = process_batch(&ctx(), &store, vec![GDB_REPORT.to_string()]).unwrap();
        assert_eq!(result.accepted, 1);
        assert_eq!(result.bucketed, 1);
        assert_eq!(result.reports[0].bucket_id, Some(bucket_pk));

        let mut entry = store.crash_entry(result.reports[0].entry_id.unwrap()).unwrap();
        assert_eq!(entry.short_signature, "[@ js::jit::Invalidate]");
        assert_eq!(entry.client.name, "fuzzer-01");
        entry.deserialize_fields().unwrap();
        assert_eq!(
            entry.args_list().unwrap(),
            &["--fuzzing-safe".to_string(), "--ion-eager".to_string()]
        );
        assert_eq!(
            entry.env_list().unwrap(),
            &["ASAN_OPTIONS=detect_leaks=0".to_string()]
        );
    }

    #[test]
    fn test_invalid_bucket_is_reported() {
        let store = InMemoryStore::new();
        Bucket::new("{broken", "broken").save(&store).unwrap();

        let result = process_batch(&ctx(), &store, vec![GDB_REPORT.to_string()]).unwrap();
        assert_eq!(result.invalid_buckets.len(), 1);
        assert_eq!(result.bucketed, 0);
        assert_eq!(result.accepted, 1);
    }
}
