//! Bulk crash classification.
//!
//! Compiles every bucket signature once and assigns crashes to the first
//! matching bucket.

pub mod bucketing;

pub use bucketing::*;
