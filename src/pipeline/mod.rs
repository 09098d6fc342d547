//! Crash report ingestion.
//!
//! Turns submitted crash reports into stored crash entries:
//! - Report parsing
//! - Key-value field encoding
//! - Crash info derivation (short signature, crash address)
//! - Bucket assignment

pub mod context;
pub mod ingestion;

pub use context::*;
pub use ingestion::*;
