//! Persisted field codecs.
//!
//! Converts between the in-memory lists attached to a crash entry and the
//! canonical JSON text stored in its record fields.

pub mod key_value;

pub use key_value::*;
