//! Error types for `stash-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid store identity: {0}")]
  InvalidIdentity(String),

  #[error("unknown table {0:?}")]
  UnknownTable(String),

  /// Column not declared for the table (or the reserved `id` column).
  #[error("column {column:?} is invalid for {table}; expected one of {expected}")]
  UnknownColumn {
    table:    &'static str,
    column:   String,
    expected: String,
  },

  #[error("column {column:?} expects a {expected} value, got {got}")]
  TypeMismatch {
    column:   &'static str,
    expected: &'static str,
    got:      &'static str,
  },

  #[error("table {0} is read-only")]
  ReadOnlyTable(&'static str),

  #[error("base64 error: {0}")]
  Base64(#[from] base64::DecodeError),

  #[error("utf-8 error: {0}")]
  Utf8(#[from] std::string::FromUtf8Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
