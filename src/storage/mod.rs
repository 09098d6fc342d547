//! Storage module.
//!
//! Crash management records and the store they are read from and written to.
//! Note: the real database lives outside this crate behind `RecordStore`.

pub mod models;
pub mod store;

pub use models::*;
pub use store::*;
