//! Moving values in and out of SQLite cells.
//!
//! Strings and structured values are bound as codec text. Numbers are bound
//! as native integers and reals, since SQLite's own text-to-real conversion
//! is not always correctly rounded. On the way out, whatever storage class
//! comes back is turned into text and handed to
//! [`stash_core::codec::decode`]; Rust's float formatting is shortest
//! round-trip, so no bits are lost.

use rusqlite::{
  Row as SqlRow,
  types::{Value as SqlValue, ValueRef},
};
use stash_core::{
  codec::{decode, encode},
  schema::Column,
  value::Value,
};

/// Parameter to bind when writing `value` to `column`.
///
/// Fails with a type mismatch exactly when [`encode`] does.
pub fn bind_value(value: &Value, column: &Column) -> stash_core::Result<SqlValue> {
  let text = encode(value, column)?;
  Ok(match value {
    Value::Integer(i) => SqlValue::Integer(*i),
    Value::Float(f) => SqlValue::Real(*f),
    Value::Text(_) | Value::Structured(_) => SqlValue::Text(text),
  })
}

/// Stored text of a single cell, `None` for `NULL`.
pub fn stored_text(cell: ValueRef<'_>) -> Option<String> {
  match cell {
    ValueRef::Null => None,
    ValueRef::Integer(i) => Some(i.to_string()),
    ValueRef::Real(f) => Some(f.to_string()),
    ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
      Ok(s) => Some(s.to_owned()),
      Err(e) => {
        tracing::debug!("stored text is not utf-8: {e}");
        None
      }
    },
    ValueRef::Blob(_) => {
      tracing::debug!("unexpected blob in a text-encoded column");
      None
    }
  }
}

/// Raw cell at `idx`, read without type coercion.
pub fn raw_cell(row: &SqlRow<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
  Ok(stored_text(row.get_ref(idx)?))
}

/// Decode a raw cell for `column`.
pub fn decode_cell(raw: Option<String>, column: &Column) -> Option<Value> {
  decode(raw.as_deref(), column.kind)
}

#[cfg(test)]
mod tests {
  use stash_core::schema::Table;

  use super::*;

  #[test]
  fn numbers_bind_natively() {
    let framerate = Table::Bookmark.column("framerate").unwrap();
    let width = Table::Bookmark.column("width").unwrap();
    assert_eq!(
      bind_value(&Value::Float(0.1), framerate).unwrap(),
      SqlValue::Real(0.1)
    );
    assert_eq!(
      bind_value(&Value::Integer(i64::MIN), width).unwrap(),
      SqlValue::Integer(i64::MIN)
    );
  }

  #[test]
  fn text_binds_as_codec_text() {
    let prefix = Table::Bookmark.column("prefix").unwrap();
    assert_eq!(
      bind_value(&Value::from("SH"), prefix).unwrap(),
      SqlValue::Text(stash_core::codec::b64encode("SH"))
    );
  }

  #[test]
  fn binding_checks_the_column_type() {
    let width = Table::Bookmark.column("width").unwrap();
    assert!(matches!(
      bind_value(&Value::Float(1.5), width),
      Err(stash_core::Error::TypeMismatch { .. })
    ));
  }

  #[test]
  fn reals_read_back_bit_exact() {
    let framerate = Table::Bookmark.column("framerate").unwrap();
    let f = -3.444418313650998e-109;
    let raw = stored_text(ValueRef::Real(f));
    assert_eq!(decode_cell(raw, framerate), Some(Value::Float(f)));
  }
}
