//! Conversion between [`Value`]s and the text stored in columns.
//!
//! Strings are stored base64-wrapped and structured values as base64-wrapped
//! JSON, so arbitrary content (quotes, newlines, non-ASCII) never reaches the
//! statement text. Numbers are stored as locale-independent decimal text.
//!
//! Decoding never fails: data that cannot be decoded is logged and read back
//! as `None`, so one corrupt field cannot make a whole store unreadable.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value as Json};

use crate::{Error, Result, schema::Column, schema::ColumnType, value::Value};

// ─── Base64 ──────────────────────────────────────────────────────────────────

pub fn b64encode(s: &str) -> String { STANDARD.encode(s.as_bytes()) }

pub fn b64decode(s: &str) -> Result<String> {
  Ok(String::from_utf8(STANDARD.decode(s)?)?)
}

// ─── Encode ──────────────────────────────────────────────────────────────────

/// Encode `value` for storage in `column`.
pub fn encode(value: &Value, column: &Column) -> Result<String> {
  if !column.kind.accepts(value) {
    return Err(Error::TypeMismatch {
      column:   column.name,
      expected: column.kind.name(),
      got:      value.kind_name(),
    });
  }

  Ok(match value {
    Value::Text(s) => b64encode(s),
    Value::Integer(i) => i.to_string(),
    Value::Float(f) => f.to_string(),
    Value::Structured(m) => b64encode(&serde_json::to_string(m)?),
  })
}

// ─── Decode ──────────────────────────────────────────────────────────────────

/// Decode stored text back into a value of type `kind`.
pub fn decode(stored: Option<&str>, kind: ColumnType) -> Option<Value> {
  let stored = stored?;
  let decoded = match kind {
    ColumnType::String => b64decode(stored)
      .map(Value::Text)
      .map_err(|e| e.to_string()),
    ColumnType::Integer => stored
      .trim()
      .parse::<i64>()
      .map(Value::Integer)
      .map_err(|e| e.to_string()),
    ColumnType::Float => stored
      .trim()
      .parse::<f64>()
      .map(Value::Float)
      .map_err(|e| e.to_string()),
    ColumnType::Structured => decode_structured(stored).map_err(|e| e.to_string()),
  };

  match decoded {
    Ok(value) => Some(value),
    Err(e) => {
      tracing::debug!("could not decode stored {} value: {e}", kind.name());
      None
    }
  }
}

fn decode_structured(stored: &str) -> Result<Value> {
  let text = b64decode(stored)?;
  match serde_json::from_str::<Json>(&text)? {
    Json::Object(m) => Ok(Value::Structured(m)),
    other => Err(Error::Json(serde::de::Error::custom(format!(
      "expected a JSON object, found {other}"
    )))),
  }
}

/// Convenience for building structured values in callers and tests.
pub fn object<I, K>(entries: I) -> Map<String, Json>
where
  I: IntoIterator<Item = (K, Json)>,
  K: Into<String>,
{
  entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::schema::Table;

  fn column(table: Table, name: &str) -> &'static Column {
    table.column(name).unwrap()
  }

  fn roundtrip(value: Value, col: &Column) -> Option<Value> {
    let stored = encode(&value, col).unwrap();
    decode(Some(&stored), col.kind)
  }

  #[test]
  fn string_survives_quotes_and_unicode() {
    let col = column(Table::Asset, "description");
    let v = Value::from("it's a \"shot\"; DROP TABLE x; -- ünïcødé ✓");
    assert_eq!(roundtrip(v.clone(), col), Some(v));
  }

  #[test]
  fn stored_string_is_base64() {
    let col = column(Table::Asset, "description");
    let stored = encode(&Value::from("hello"), col).unwrap();
    assert_eq!(stored, "aGVsbG8=");
  }

  #[test]
  fn nested_structured_value_roundtrips() {
    let col = column(Table::Asset, "notes");
    let map = object([
      ("0", json!({ "text": "グレーディング", "user": "ana" })),
      ("1", json!({ "nested": { "list": [1, 2.5, "três"] } })),
    ]);
    let v = Value::Structured(map);
    assert_eq!(roundtrip(v.clone(), col), Some(v));
  }

  #[test]
  fn numbers_roundtrip() {
    let width = column(Table::Bookmark, "width");
    let rate = column(Table::Bookmark, "framerate");
    assert_eq!(roundtrip(Value::Integer(-1920), width), Some(Value::Integer(-1920)));
    assert_eq!(roundtrip(Value::Float(23.976), rate), Some(Value::Float(23.976)));
    assert_eq!(encode(&Value::Float(25.0), rate).unwrap(), "25");
  }

  #[test]
  fn type_mismatch_is_an_error() {
    let width = column(Table::Bookmark, "width");
    let err = encode(&Value::from("1920"), width).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { column: "width", .. }));
  }

  #[test]
  fn null_decodes_to_none() {
    assert_eq!(decode(None, ColumnType::Integer), None);
    assert_eq!(decode(None, ColumnType::Structured), None);
  }

  #[test]
  fn corrupt_data_decodes_to_none() {
    assert_eq!(decode(Some("not base64!"), ColumnType::Structured), None);
    assert_eq!(decode(Some(&b64encode("{broken")), ColumnType::Structured), None);
    assert_eq!(decode(Some(&b64encode("[1, 2]")), ColumnType::Structured), None);
    assert_eq!(decode(Some("twelve"), ColumnType::Integer), None);
    assert_eq!(decode(Some("%%"), ColumnType::String), None);
  }

  #[test]
  fn b64decode_rejects_invalid_utf8() {
    let stored = STANDARD.encode([0xff, 0xfe]);
    assert!(matches!(b64decode(&stored), Err(Error::Utf8(_))));
  }
}
