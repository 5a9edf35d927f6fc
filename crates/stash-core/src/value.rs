//! Typed column values.
//!
//! Every column holds either nothing (`None` at the API boundary) or one of
//! the four [`Value`] variants. The variant must match the column's declared
//! [`ColumnType`](crate::schema::ColumnType).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
  Text(String),
  Integer(i64),
  Float(f64),
  /// A JSON object, e.g. notes or per-store application settings.
  Structured(Map<String, Json>),
}

/// One row of a table: every data column, `None` where unset.
pub type Row = BTreeMap<&'static str, Option<Value>>;

impl Value {
  /// Short human-readable name of the variant, used in error messages.
  pub fn kind_name(&self) -> &'static str {
    match self {
      Self::Text(_) => "string",
      Self::Integer(_) => "integer",
      Self::Float(_) => "float",
      Self::Structured(_) => "structured",
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Float(f) => Some(*f),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&Map<String, Json>> {
    match self {
      Self::Structured(m) => Some(m),
      _ => None,
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self { Self::Integer(i.into()) }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self { Self::Float(f) }
}

impl From<Map<String, Json>> for Value {
  fn from(m: Map<String, Json>) -> Self { Self::Structured(m) }
}
