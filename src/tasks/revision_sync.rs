//! Revision synchronization.
//!
//! Makes sure the local mirror of a collection's repository contains the
//! collection's revision. If the provider does not know the revision it is
//! asked to update exactly once. The result of that update is not checked
//! again; runs that end this way are logged and counted as unverified.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use serde::Serialize;

use crate::config::TriageConfig;
use crate::error::TaskError;
use crate::logging::structured::LogContext;
use crate::providers::{registry_snapshot, ProviderRegistry};
use crate::storage::{Collection, InMemoryStore, RecordStore, Repository};
use crate::{log_debug, log_info, log_warn};

/// Progress of one sync work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Unchecked,
    Checked { known: bool },
    UpdateTriggered,
    Done,
}

/// How a completed work item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    /// The mirror already had the revision; no update ran.
    AlreadyKnown,
    /// One update ran; the revision was not re-checked afterwards.
    UpdatedUnverified,
}

/// Counters over all sync runs.
#[derive(Debug, Default)]
pub struct SyncStats {
    runs: AtomicU64,
    already_known: AtomicU64,
    updated_unverified: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of `SyncStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncStatsSnapshot {
    pub runs: u64,
    pub already_known: u64,
    pub updated_unverified: u64,
    pub failed: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            already_known: self.already_known.load(Ordering::Relaxed),
            updated_unverified: self.updated_unverified.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: &Result<SyncOutcome, TaskError>) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(SyncOutcome::AlreadyKnown) => &self.already_known,
            Ok(SyncOutcome::UpdatedUnverified) => &self.updated_unverified,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

lazy_static! {
    static ref SYNC_STATS: SyncStats = SyncStats::new();
}

/// Process-wide sync counters used by `check_revision_update`.
pub fn global_sync_stats() -> &'static SyncStats {
    &SYNC_STATS
}

/// One "ensure the revision is mirrored" work item.
#[derive(Debug, Clone)]
pub struct RevisionSyncTask {
    pub collection_pk: i64,
    command_timeout: Option<Duration>,
    state: SyncState,
}

impl RevisionSyncTask {
    pub fn new(collection_pk: i64) -> Self {
        Self {
            collection_pk,
            command_timeout: None,
            state: SyncState::Unchecked,
        }
    }

    /// Bound each provider command by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run the work item to completion.
    ///
    /// # Errors
    /// Store lookups, provider resolution and provider calls all fail the
    /// work item. Nothing is retried here.
    pub fn run(
        &mut self,
        store: &dyn RecordStore,
        registry: &ProviderRegistry,
        stats: &SyncStats,
        ctx: &LogContext,
    ) -> Result<SyncOutcome, TaskError> {
        let ctx = ctx.with_record("collection", self.collection_pk);
        let result = self.execute(store, registry, &ctx);
        stats.record(&result);
        if let Err(e) = &result {
            log::error!("{} REVISION_SYNC_FAILED state={:?} error={}", ctx, self.state, e);
        }
        result
    }

    fn execute(
        &mut self,
        store: &dyn RecordStore,
        registry: &ProviderRegistry,
        ctx: &LogContext,
    ) -> Result<SyncOutcome, TaskError> {
        let collection = store.collection(self.collection_pk)?;
        let repository = store.repository(collection.repository_id)?;
        let provider = repository.instance(registry, self.command_timeout)?;

        log_debug!(
            ctx,
            "REVISION_CHECK",
            repository = repository.name,
            revision = collection.revision,
        );

        let known = provider.test_revision(&collection.revision)?;
        self.state = SyncState::Checked { known };

        if known {
            self.state = SyncState::Done;
            log_debug!(ctx, "REVISION_KNOWN", revision = collection.revision);
            return Ok(SyncOutcome::AlreadyKnown);
        }

        log_info!(
            ctx,
            "REVISION_UPDATE",
            repository = repository.name,
            revision = collection.revision,
        );
        provider.update()?;
        self.state = SyncState::UpdateTriggered;

        // The mirror may still lack the revision after this point.
        log_warn!(
            ctx,
            "REVISION_UPDATE_UNVERIFIED",
            repository = repository.name,
            revision = collection.revision,
        );
        self.state = SyncState::Done;
        Ok(SyncOutcome::UpdatedUnverified)
    }
}

/// Ensure the revision of collection `collection_pk` is in its local mirror.
///
/// Provider commands are bounded by `command_timeout`; `None` lets them run
/// until they exit.
pub fn check_revision_update(
    store: &dyn RecordStore,
    registry: &ProviderRegistry,
    collection_pk: i64,
    command_timeout: Option<Duration>,
) -> Result<SyncOutcome, TaskError> {
    let ctx = LogContext::new(&format!("sync-{}", collection_pk));
    RevisionSyncTask::new(collection_pk)
        .with_timeout(command_timeout)
        .run(store, registry, global_sync_stats(), &ctx)
}

/// Ensure `revision` is in the mirror at `location`, without stored records.
///
/// Resolves `classname` in a snapshot of the global registry, so the registry
/// lock is not held while the provider fetches.
pub fn check_mirror_revision(
    classname: &str,
    location: impl Into<PathBuf>,
    revision: &str,
    config: &TriageConfig,
) -> Result<SyncOutcome, TaskError> {
    let location = location.into();
    let store = InMemoryStore::new();
    let repository_pk = store.save_repository(&Repository {
        pk: None,
        name: location.display().to_string(),
        classname: classname.to_string(),
        location,
    })?;
    let collection_pk = store.save_collection(&Collection::new(repository_pk, revision))?;

    let registry = registry_snapshot();
    check_revision_update(&store, &registry, collection_pk, config.provider_timeout())
}
