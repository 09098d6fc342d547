//! Crash Triage Core - crash classification and provider synchronization
//!
//! This crate provides the core of the crash triage server: turning raw crash
//! output into structured crash information, matching it against bucket
//! signatures, and keeping source repository mirrors in sync with the
//! revisions results are reported against. The implementation prioritizes:
//!
//! 1. **Determinism** - Crash info and signature matching are pure
//! 2. **Logging** - Every decision point logged with job context
//! 3. **Explicit failure** - Malformed data and unknown providers are errors
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `codec` - Key-value list encoding of persisted fields
//! - `crashinfo` - Crash info derived from raw crash output
//! - `signature` - Signature compilation, matching and canonical hashing
//! - `classification` - Bulk bucket assignment
//! - `pipeline` - Crash report ingestion
//! - `storage` - Record models and the store seam
//! - `providers` - Bug tracker and repository providers, registry
//! - `tasks` - Revision sync work items and worker pool
//! - `config` - Runtime configuration
//! - `logging` - Structured logging with job context

pub mod classification;
pub mod codec;
pub mod config;
pub mod crashinfo;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod signature;
pub mod storage;
pub mod tasks;

#[cfg(feature = "python")]
mod bindings;

use config::TriageConfig;

/// Initialize the process logger at `Info`. `RUST_LOG` overrides the level.
pub fn init_logger() {
    init_logger_with(&TriageConfig::default());
}

/// Initialize the process logger from configuration.
///
/// Later calls are no-ops.
pub fn init_logger_with(config: &TriageConfig) {
    let _ = env_logger::builder()
        .filter_level(config.level_filter())
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
