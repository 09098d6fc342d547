//! Background tasks.
//!
//! - `revision_sync` - keep repository mirrors up to date with collections
//! - `worker` - thread pool consuming sync work items

pub mod revision_sync;
pub mod worker;

pub use revision_sync::*;
pub use worker::*;
