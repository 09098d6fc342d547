//! Crash information derived from raw crash output.
//!
//! A `CrashInfo` is rebuilt from the raw stdout/stderr/crash data of an entry
//! and the program configuration it ran under. Signatures are matched against
//! this structure, never against the raw record.

pub mod builder;
pub mod config;

pub use builder::*;
pub use config::*;
