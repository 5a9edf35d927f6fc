//! Schema registry: the tables every store carries and their columns.
//!
//! Backends create tables from [`Table::columns`] and add any declared column
//! missing from an older file, so columns may be appended here freely but
//! never renamed or removed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, value::Value};

/// Name of the primary-key column present in every table.
pub const ID_COLUMN: &str = "id";

// ─── Column types ────────────────────────────────────────────────────────────

/// Semantic type of a column; decides how values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
  String,
  Integer,
  Float,
  Structured,
}

impl ColumnType {
  pub fn name(self) -> &'static str {
    match self {
      Self::String => "string",
      Self::Integer => "integer",
      Self::Float => "float",
      Self::Structured => "structured",
    }
  }

  /// Whether `value` may be stored in a column of this type.
  pub fn accepts(self, value: &Value) -> bool {
    matches!(
      (self, value),
      (Self::String, Value::Text(_))
        | (Self::Integer, Value::Integer(_))
        | (Self::Float, Value::Float(_))
        | (Self::Structured, Value::Structured(_))
    )
  }
}

/// A declared column: name, SQL type affinity (with constraints) and
/// semantic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name: &'static str,
  pub sql:  &'static str,
  pub kind: ColumnType,
}

const fn col(name: &'static str, sql: &'static str, kind: ColumnType) -> Column {
  Column { name, sql, kind }
}

const ID: Column = col(ID_COLUMN, "TEXT PRIMARY KEY COLLATE NOCASE", ColumnType::String);

use ColumnType::{Float, Integer, String as Str, Structured};

static ASSET_COLUMNS: &[Column] = &[
  ID,
  col("description", "TEXT", Str),
  col("notes", "TEXT", Structured),
  col("flags", "INT DEFAULT 0", Integer),
  col("thumbnail_stamp", "REAL", Float),
  col("user", "TEXT", Str),
  col("sg_id", "INT", Integer),
  col("sg_name", "TEXT", Str),
  col("sg_type", "TEXT", Str),
  col("sg_task_id", "INT", Integer),
  col("sg_task_name", "TEXT", Str),
  col("cut_in", "INT", Integer),
  col("cut_out", "INT", Integer),
  col("cut_duration", "INT", Integer),
  col("edit_in", "INT", Integer),
  col("edit_out", "INT", Integer),
  col("edit_duration", "INT", Integer),
  col("asset_framerate", "REAL", Float),
  col("asset_width", "INT", Integer),
  col("asset_height", "INT", Integer),
  col("url1", "TEXT", Str),
  col("url2", "TEXT", Str),
  col("progress", "TEXT", Structured),
];

static INFO_COLUMNS: &[Column] = &[
  ID,
  col("server", "TEXT NOT NULL", Str),
  col("job", "TEXT NOT NULL", Str),
  col("root", "TEXT NOT NULL", Str),
  col("user", "TEXT NOT NULL", Str),
  col("host", "TEXT NOT NULL", Str),
  col("created", "REAL NOT NULL", Float),
];

static BOOKMARK_COLUMNS: &[Column] = &[
  ID,
  col("description", "TEXT", Str),
  col("width", "INT", Integer),
  col("height", "INT", Integer),
  col("framerate", "REAL", Float),
  col("prefix", "TEXT", Str),
  col("startframe", "INT", Integer),
  col("duration", "INT", Integer),
  col("sg_domain", "TEXT", Str),
  col("sg_scriptname", "TEXT", Str),
  col("sg_api_key", "TEXT", Str),
  col("sg_id", "INT", Integer),
  col("sg_name", "TEXT", Str),
  col("sg_type", "TEXT", Str),
  col("sg_episode_id", "INT", Integer),
  col("sg_episode_name", "TEXT", Str),
  col("url1", "TEXT", Str),
  col("url2", "TEXT", Str),
  col("config_file_format", "TEXT", Structured),
  col("config_scene_names", "TEXT", Structured),
  col("config_publish", "TEXT", Structured),
  col("config_tasks", "TEXT", Structured),
  col("config_asset_folders", "TEXT", Structured),
  col("config_burnin", "TEXT", Structured),
  col("applications", "TEXT", Structured),
  col("bookmark_display_token", "TEXT", Str),
  col("asset_display_token", "TEXT", Str),
  col("asset_link_presets", "TEXT", Structured),
];

// ─── Tables ──────────────────────────────────────────────────────────────────

/// The tables every store carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
  /// Per-item metadata, keyed by item path.
  Asset,
  /// Who created the store, where and when. One row per store.
  Info,
  /// Store-wide configuration, keyed by the store's base path.
  Bookmark,
}

impl Table {
  pub const ALL: [Table; 3] = [Table::Asset, Table::Info, Table::Bookmark];

  /// SQL table name, fixed by the on-disk format.
  pub fn name(self) -> &'static str {
    match self {
      Self::Asset => "AssetData",
      Self::Info => "InfoData",
      Self::Bookmark => "BookmarkData",
    }
  }

  pub fn from_name(name: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|t| t.name() == name)
      .ok_or_else(|| Error::UnknownTable(name.to_owned()))
  }

  /// All declared columns in order, `id` first.
  pub fn columns(self) -> &'static [Column] {
    match self {
      Self::Asset => ASSET_COLUMNS,
      Self::Info => INFO_COLUMNS,
      Self::Bookmark => BOOKMARK_COLUMNS,
    }
  }

  /// Columns callers may address by name.
  pub fn data_columns(self) -> impl Iterator<Item = &'static Column> {
    self.columns().iter().filter(|c| c.name != ID_COLUMN)
  }

  /// Look up a data column, rejecting unknown names and `id`.
  pub fn column(self, name: &str) -> Result<&'static Column> {
    self
      .data_columns()
      .find(|c| c.name == name)
      .ok_or_else(|| Error::UnknownColumn {
        table:    self.name(),
        column:   name.to_owned(),
        expected: self
          .data_columns()
          .map(|c| c.name)
          .collect::<Vec<_>>()
          .join(", "),
      })
  }

  /// The info table is written once when the store is created.
  pub fn is_read_only(self) -> bool { matches!(self, Self::Info) }
}

impl fmt::Display for Table {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn every_table_starts_with_id() {
    for table in Table::ALL {
      let first = table.columns()[0];
      assert_eq!(first.name, ID_COLUMN);
      assert!(first.sql.contains("COLLATE NOCASE"));
    }
  }

  #[test]
  fn column_names_are_unique() {
    for table in Table::ALL {
      let names: HashSet<_> = table.columns().iter().map(|c| c.name).collect();
      assert_eq!(names.len(), table.columns().len(), "{table}");
    }
  }

  #[test]
  fn id_is_not_addressable() {
    let err = Table::Asset.column("id").unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }));
  }

  #[test]
  fn unknown_column_lists_expected_names() {
    let err = Table::Bookmark.column("widht").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("widht"));
    assert!(msg.contains("width"));
  }

  #[test]
  fn lookup_by_sql_name() {
    assert_eq!(Table::from_name("BookmarkData").unwrap(), Table::Bookmark);
    assert!(matches!(
      Table::from_name("TemplateData"),
      Err(Error::UnknownTable(_))
    ));
  }

  #[test]
  fn declared_types_accept_matching_values() {
    assert_eq!(Table::Bookmark.column("width").unwrap().kind, ColumnType::Integer);
    assert!(ColumnType::Integer.accepts(&Value::Integer(1)));
    assert!(!ColumnType::Integer.accepts(&Value::Float(1.0)));
    assert!(ColumnType::Structured.accepts(&Value::Structured(Default::default())));
  }
}
