//! The `ValueStore` trait — the narrow get/set interface external
//! collaborators program against.
//!
//! Implemented by storage backends (e.g. `stash-store-sqlite`). Callers that
//! only read and write individual values should depend on this trait rather
//! than on a concrete backend.

use crate::{schema::Table, value::Value};

/// Typed access to the values of one store.
///
/// An invalid store (one that fell back to a non-persistent database) reads
/// every value as `None` and ignores writes; use [`ValueStore::is_valid`] to
/// tell "never connected" apart from "nothing stored yet".
pub trait ValueStore {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read `column` of the row keyed by `item_key`.
  ///
  /// Returns `None` if the row does not exist or the column is unset.
  fn value(
    &self,
    item_key: &str,
    column: &str,
    table: Table,
  ) -> Result<Option<Value>, Self::Error>;

  /// Write one column of the row keyed by `item_key`, leaving its other
  /// columns untouched and creating the row if needed. `None` clears it.
  fn set_value(
    &self,
    item_key: &str,
    column: &str,
    value: Option<Value>,
    table: Table,
  ) -> Result<(), Self::Error>;

  /// `true` only when backed by the store's real database file.
  fn is_valid(&self) -> bool;
}
