//! DDL for the stash SQLite store.
//!
//! Tables are created from the registry in `stash_core::schema`. Stores
//! written by an older build are patched in place: any declared column the
//! live table lacks is added with `ALTER TABLE ... ADD COLUMN`, so schema
//! evolution is additive only.

use rusqlite::{Connection, TransactionBehavior};
use stash_core::{
  RowHasher, StoreIdentity,
  codec::encode,
  schema::{Column, Table},
  value::Value,
};

use crate::{Result, encode::bind_value};

/// `CREATE TABLE IF NOT EXISTS` statement for `table`.
pub fn create_table_sql(table: Table) -> String {
  let columns = table
    .columns()
    .iter()
    .map(|c| format!("{} {}", c.name, c.sql))
    .collect::<Vec<_>>()
    .join(", ");
  format!("CREATE TABLE IF NOT EXISTS {table} ({columns})")
}

/// `ALTER TABLE ... ADD COLUMN` statement for a column missing from `table`.
///
/// SQLite refuses to add a `NOT NULL` column without a default, so one is
/// supplied for those.
pub fn add_column_sql(table: Table, column: &Column) -> String {
  let mut sql = column.sql.to_owned();
  if sql.contains("NOT NULL") && !sql.contains("DEFAULT") {
    sql.push_str(match column.kind {
      stash_core::ColumnType::Integer | stash_core::ColumnType::Float => " DEFAULT 0",
      _ => " DEFAULT ''",
    });
  }
  format!("ALTER TABLE {table} ADD COLUMN {} {sql}", column.name)
}

pub fn create_table(conn: &Connection, table: Table) -> rusqlite::Result<()> {
  conn.execute_batch(&create_table_sql(table))?;
  conn.execute_batch(&format!(
    "CREATE UNIQUE INDEX IF NOT EXISTS {table}_id_idx ON {table} (id)"
  ))
}

/// Column names of the live table, in table order.
pub fn live_columns(conn: &Connection, table: Table) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info('{table}')"))?;
  let names = stmt
    .query_map([], |row| row.get::<_, String>(1))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(names)
}

/// Add every declared column the live table lacks. Returns the added names.
pub fn patch_table(conn: &Connection, table: Table) -> rusqlite::Result<Vec<&'static str>> {
  let live = live_columns(conn, table)?;
  let mut added = Vec::new();
  for column in table.columns() {
    if live.iter().any(|name| name.eq_ignore_ascii_case(column.name)) {
      continue;
    }
    conn.execute_batch(&add_column_sql(table, column))?;
    tracing::info!("added missing column {table}.{}", column.name);
    added.push(column.name);
  }
  Ok(added)
}

/// Who created a store, where and when; written once per store.
pub struct InfoRecord<'a> {
  pub identity: &'a StoreIdentity,
  pub user:     &'a str,
  pub host:     &'a str,
  /// Seconds since the Unix epoch.
  pub created:  f64,
}

/// Insert the info row unless the store already has one.
pub fn add_info(conn: &Connection, hasher: &RowHasher, info: &InfoRecord<'_>) -> Result<()> {
  let table = Table::Info;
  let text = |name: &str, value: &str| -> Result<String> {
    Ok(encode(&Value::from(value), table.column(name)?)?)
  };

  let id = hasher.row_id(&info.identity.base_path());
  let server = text("server", info.identity.server())?;
  let job = text("job", info.identity.job())?;
  let root = text("root", info.identity.root())?;
  let user = text("user", info.user)?;
  let host = text("host", info.host)?;
  let created = bind_value(&Value::Float(info.created), table.column("created")?)?;

  let inserted = conn.execute(
    &format!(
      "INSERT OR IGNORE INTO {table} (id, server, job, root, user, host, created)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    ),
    rusqlite::params![id, server, job, root, user, host, created],
  )?;
  if inserted > 0 {
    tracing::info!("initialised store {} for {}@{}", info.identity, info.user, info.host);
  }
  Ok(())
}

/// Create and patch every table and record the info row, in one
/// transaction.
pub fn migrate(conn: &mut Connection, hasher: &RowHasher, info: &InfoRecord<'_>) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  for table in Table::ALL {
    create_table(&tx, table)?;
    patch_table(&tx, table)?;
  }
  add_info(&tx, hasher, info)?;
  tx.commit()?;
  Ok(())
}
