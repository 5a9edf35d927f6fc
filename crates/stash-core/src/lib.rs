//! Core types and trait definitions for the stash metadata store.
//!
//! This crate is deliberately free of database dependencies. It owns the
//! schema registry, the value codec and row-id hashing; storage backends
//! (e.g. `stash-store-sqlite`) build on top of it.

pub mod codec;
pub mod error;
pub mod event;
pub mod hash;
pub mod identity;
pub mod schema;
pub mod store;
pub mod value;

pub use error::{Error, Result};
pub use event::{ChangeBus, SubscriptionId, ValueChanged};
pub use hash::RowHasher;
pub use identity::StoreIdentity;
pub use schema::{Column, ColumnType, Table};
pub use store::ValueStore;
pub use value::{Row, Value};
