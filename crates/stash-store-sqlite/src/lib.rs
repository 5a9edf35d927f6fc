//! SQLite backend for the stash metadata store.
//!
//! One SQLite file per store, opened once per thread. [`StoreRegistry`]
//! hands out the calling thread's [`SqliteStore`] for a
//! [`StoreIdentity`](stash_core::StoreIdentity), creating and migrating the
//! database on first use.

mod encode;
mod schema;
mod store;

pub mod config;
pub mod error;
pub mod registry;
pub mod retry;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use registry::{SharedStore, StoreContext, StoreRegistry};
pub use retry::{Cancel, OpenOptions, RetryPolicy, ThreadRole};
pub use store::{SqliteStore, StoreInfo};
