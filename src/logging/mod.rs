//! Structured logging with job context.
//!
//! Provides logging macros and utilities that include the job id and the
//! record being worked on in every log message for easy correlation.

pub mod structured;

pub use structured::*;
