//! Sync worker pool.
//!
//! Work items are messages on a channel consumed by a fixed set of threads.
//! Items are independent and complete in any order. The pool never
//! serializes `update()` calls on a shared mirror; providers own that.
//!
//! Job reports are buffered without a bound until `drain_reports` or
//! `shutdown` collects them. Long-lived pools should drain periodically.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::logging::structured::LogContext;
use crate::providers::ProviderRegistry;
use crate::storage::RecordStore;

use super::revision_sync::{RevisionSyncTask, SyncOutcome, SyncStats};

/// One queued revision check.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub job_id: String,
    pub collection_pk: i64,
}

impl SyncJob {
    pub fn new(collection_pk: i64) -> Self {
        Self {
            job_id: format!("sync-{}", &Uuid::new_v4().to_string()[..8]),
            collection_pk,
        }
    }
}

/// Completion record of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub collection_pk: i64,
    pub outcome: Option<SyncOutcome>,
    /// Error text when the job failed; the caller decides on retries.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Fixed-size pool running `RevisionSyncTask`s.
pub struct SyncWorkerPool {
    sender: Option<Sender<SyncJob>>,
    reports: Receiver<JobReport>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<SyncStats>,
}

impl SyncWorkerPool {
    /// Start `threads` workers (at least one).
    ///
    /// Workers never block on reporting; finished reports stay queued in the
    /// pool until collected.
    pub fn start(
        threads: usize,
        store: Arc<dyn RecordStore>,
        registry: Arc<ProviderRegistry>,
        command_timeout: Option<Duration>,
    ) -> Self {
        let (sender, jobs) = mpsc::channel::<SyncJob>();
        let (report_tx, reports) = mpsc::channel::<JobReport>();
        let jobs = Arc::new(Mutex::new(jobs));
        let stats = Arc::new(SyncStats::new());

        let workers = (0..threads.max(1))
            .map(|n| {
                let jobs = Arc::clone(&jobs);
                let report_tx = report_tx.clone();
                let store = Arc::clone(&store);
                let registry = Arc::clone(&registry);
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    log::debug!("SYNC_WORKER_STARTED worker={}", n);
                    loop {
                        // Lock only while receiving so other workers can pick up jobs.
                        let next = jobs.lock().recv();
                        let Ok(job) = next else { break };
                        let report =
                            run_job(&job, store.as_ref(), &registry, &stats, command_timeout);
                        if report_tx.send(report).is_err() {
                            break;
                        }
                    }
                    log::debug!("SYNC_WORKER_STOPPED worker={}", n);
                })
            })
            .collect();

        log::info!("SYNC_POOL_STARTED threads={}", threads.max(1));

        Self {
            sender: Some(sender),
            reports,
            workers,
            stats,
        }
    }

    /// Queue a job. Returns false once the pool is shutting down.
    pub fn submit(&self, job: SyncJob) -> bool {
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    /// Reports of jobs finished so far, without waiting.
    ///
    /// Drained reports are released and not returned again by `shutdown`.
    pub fn drain_reports(&self) -> Vec<JobReport> {
        self.reports.try_iter().collect()
    }

    /// Stop accepting jobs, finish the queued ones and return their reports.
    pub fn shutdown(mut self) -> Vec<JobReport> {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("SYNC_WORKER_PANICKED");
            }
        }
        let reports: Vec<JobReport> = self.reports.try_iter().collect();
        log::info!("SYNC_POOL_STOPPED reports={}", reports.len());
        reports
    }
}

fn run_job(
    job: &SyncJob,
    store: &dyn RecordStore,
    registry: &ProviderRegistry,
    stats: &SyncStats,
    command_timeout: Option<Duration>,
) -> JobReport {
    let started = Instant::now();
    let ctx = LogContext::new(&job.job_id);
    let result = RevisionSyncTask::new(job.collection_pk)
        .with_timeout(command_timeout)
        .run(store, registry, stats, &ctx);

    let (outcome, error) = match result {
        Ok(outcome) => (Some(outcome), None),
        Err(e) => (None, Some(e.to_string())),
    };

    JobReport {
        job_id: job.job_id.clone(),
        collection_pk: job.collection_pk,
        outcome,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
