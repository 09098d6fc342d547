//! External providers.
//!
//! Bug trackers and source repositories are pluggable. Records store a
//! provider class name; the `ProviderRegistry` turns that name into a
//! working implementation.
//! - `bugtracker` - ticket filing interface
//! - `repository` - local source mirrors (git, hg)
//! - `registry` - name resolution

pub mod bugtracker;
pub mod registry;
pub mod repository;

pub use bugtracker::*;
pub use registry::*;
pub use repository::*;
