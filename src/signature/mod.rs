//! Crash signature matching.
//!
//! A bucket's signature is a JSON document of symptoms compiled once into a
//! `CompiledSignature` and then evaluated against many `CrashInfo` values.
//! - `symptoms` - the individual predicates
//! - `matcher` - compilation and evaluation
//! - `canonical` - line-ending normalization and hashing for storage

pub mod canonical;
pub mod matcher;
pub mod symptoms;

pub use canonical::*;
pub use matcher::*;
pub use symptoms::*;
