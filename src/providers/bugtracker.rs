//! Bug tracker providers.
//!
//! Ticket field mapping is owned by each tracker implementation; this module
//! only defines the capability interface and links filed tickets to buckets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, TaskError};
use crate::storage::{Bucket, Bug, CrashEntry, RecordStore};

use super::registry::ProviderRegistry;

/// Triage data handed to a tracker when filing a ticket.
#[derive(Debug, Clone, Copy)]
pub struct TicketRequest<'a> {
    pub bucket: &'a Bucket,
    /// Representative crash of the bucket.
    pub entry: &'a CrashEntry,
    /// Tracker-specific fields (product, component, summary, ...).
    pub fields: &'a BTreeMap<String, String>,
}

/// State of an external ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    Closed,
    /// Closed as a duplicate of the given external id.
    Duplicate(String),
}

/// Capability interface of an external bug tracker.
pub trait BugTrackerProvider: Send + Sync {
    /// Primary key of the `BugProvider` record this instance was built for.
    fn provider_id(&self) -> i64;

    fn hostname(&self) -> &str;

    /// File a ticket and return its external id.
    fn submit_ticket(&self, request: &TicketRequest<'_>) -> Result<String, ProviderError>;

    /// Look up the state of existing tickets. Unknown ids are omitted.
    fn ticket_status(
        &self,
        external_ids: &[String],
    ) -> Result<BTreeMap<String, TicketStatus>, ProviderError>;
}

/// File a ticket for a bucket and link it.
///
/// Resolves the tracker from the `BugProvider` record, submits the ticket,
/// stores the `Bug` and points the bucket at it.
pub fn file_bug(
    store: &dyn RecordStore,
    registry: &ProviderRegistry,
    bucket_pk: i64,
    entry_pk: i64,
    provider_pk: i64,
    fields: &BTreeMap<String, String>,
) -> Result<Bug, TaskError> {
    let provider_record = store.bug_provider(provider_pk)?;
    let tracker = provider_record.instance(registry)?;

    let mut bucket = store.bucket(bucket_pk)?;
    let entry = store.crash_entry(entry_pk)?;

    let external_id = tracker.submit_ticket(&TicketRequest {
        bucket: &bucket,
        entry: &entry,
        fields,
    })?;

    log::info!(
        "BUG_FILED bucket={} provider={} external_id={} url={}",
        bucket_pk,
        provider_pk,
        external_id,
        provider_record.ticket_url(&external_id)
    );

    let mut bug = Bug {
        pk: None,
        external_id,
        provider_id: provider_pk,
    };
    bug.pk = Some(store.save_bug(&bug)?);

    bucket.bug_id = bug.pk;
    bucket.save(store)?;

    Ok(bug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::storage::{BugProvider, Client, InMemoryStore, Os, Platform, Product};

    struct RecordingTracker {
        id: i64,
        host: String,
        submitted: Mutex<Vec<String>>,
    }

    impl BugTrackerProvider for RecordingTracker {
        fn provider_id(&self) -> i64 {
            self.id
        }

        fn hostname(&self) -> &str {
            &self.host
        }

        fn submit_ticket(&self, request: &TicketRequest<'_>) -> Result<String, ProviderError> {
            let summary = request.fields.get("summary").cloned().unwrap_or_default();
            let mut submitted = self.submitted.lock();
            submitted.push(summary);
            Ok(format!("{}", 1000 + submitted.len()))
        }

        fn ticket_status(
            &self,
            external_ids: &[String],
        ) -> Result<BTreeMap<String, TicketStatus>, ProviderError> {
            Ok(external_ids
                .iter()
                .map(|id| (id.clone(), TicketStatus::Open))
                .collect())
        }
    }

    fn setup() -> (InMemoryStore, ProviderRegistry, i64, i64, i64) {
        let store = InMemoryStore::new();
        let mut registry = ProviderRegistry::new();
        registry
            .register_bug_tracker("RecordingTracker", |pk, hostname| {
                Ok(Arc::new(RecordingTracker {
                    id: pk,
                    host: hostname.to_string(),
                    submitted: Mutex::new(Vec::new()),
                }))
            })
            .unwrap();

        let provider_pk = store
            .save_bug_provider(&BugProvider {
                pk: None,
                classname: "RecordingTracker".to_string(),
                hostname: "bugs.example.com".to_string(),
                url_template: "https://bugs.example.com/%s".to_string(),
            })
            .unwrap();
        let bucket_pk = Bucket::new(r#"{"symptoms": []}"#, "crash in foo")
            .save(&store)
            .unwrap();
        let entry_pk = CrashEntry::new(
            Platform { name: "x86-64".to_string() },
            Product { name: "mozilla-central".to_string(), version: None },
            Os { name: "linux".to_string(), version: None },
            Client { name: "fuzzer-01".to_string() },
        )
        .save(&store)
        .unwrap();

        (store, registry, provider_pk, bucket_pk, entry_pk)
    }

    #[test]
    fn test_file_bug_links_bucket() {
        let (store, registry, provider_pk, bucket_pk, entry_pk) = setup();
        let fields = BTreeMap::from([("summary".to_string(), "crash in foo".to_string())]);

        let bug = file_bug(&store, &registry, bucket_pk, entry_pk, provider_pk, &fields).unwrap();
        assert_eq!(bug.external_id, "1001");
        assert_eq!(bug.provider_id, provider_pk);
        assert_eq!(store.bucket(bucket_pk).unwrap().bug_id, bug.pk);
    }

    #[test]
    fn test_file_bug_unknown_tracker() {
        let (store, _, provider_pk, bucket_pk, entry_pk) = setup();
        let empty = ProviderRegistry::new();

        let err = file_bug(&store, &empty, bucket_pk, entry_pk, provider_pk, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::Provider(ProviderError::UnknownProvider { .. })
        ));
        assert_eq!(store.bucket(bucket_pk).unwrap().bug_id, None);
    }

    #[test]
    fn test_tracker_receives_record_identity() {
        let (store, registry, provider_pk, _, _) = setup();
        let tracker = store.bug_provider(provider_pk).unwrap().instance(&registry).unwrap();
        assert_eq!(tracker.provider_id(), provider_pk);
        assert_eq!(tracker.hostname(), "bugs.example.com");
        let status = tracker.ticket_status(&["7".to_string()]).unwrap();
        assert_eq!(status["7"], TicketStatus::Open);
    }
}
