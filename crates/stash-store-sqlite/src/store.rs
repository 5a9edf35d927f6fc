//! [`SqliteStore`] — one SQLite connection to one store's database file.

use std::{
  cell::RefCell,
  fs,
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension as _};
use stash_core::{
  StoreIdentity, ValueChanged, ValueStore,
  schema::{Column, Table},
  value::{Row, Value},
};

use crate::{
  Error, Result,
  encode::{bind_value, decode_cell, raw_cell},
  registry::StoreContext,
  retry::{Attempt, OpenOptions, with_retries},
  schema::{self, InfoRecord},
};

/// Flag bits are stored in this `AssetData` column.
const FLAGS_COLUMN: &str = "flags";

/// Creation metadata recorded in the info table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
  pub server:  Option<String>,
  pub job:     Option<String>,
  pub root:    Option<String>,
  pub user:    Option<String>,
  pub host:    Option<String>,
  pub created: Option<DateTime<Utc>>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Typed access to one store's tables over a single SQLite connection.
///
/// The connection must stay on the thread that uses it; obtain stores
/// through [`StoreRegistry`](crate::StoreRegistry), which keeps one per
/// (store, thread).
///
/// When the database file cannot be reached the store runs on an in-memory
/// database instead and reports [`is_valid`](Self::is_valid) `false`: reads
/// return `None` and writes are ignored.
pub struct SqliteStore {
  identity:      StoreIdentity,
  database_path: PathBuf,
  ctx:           StoreContext,
  options:       OpenOptions,
  conn:          Option<Connection>,
  valid:         bool,
  /// Notifications held back until the surrounding batch commits.
  pending:       RefCell<Option<Vec<ValueChanged>>>,
}

impl SqliteStore {
  /// Open (or create) the store's database, migrating its tables.
  pub fn open(identity: StoreIdentity, ctx: &StoreContext, options: &OpenOptions) -> Result<Self> {
    let busy_timeout = ctx.config.busy_timeout();
    Self::open_with(identity, ctx, options, move |path| open_file(path, busy_timeout))
  }

  /// Like [`open`](Self::open), with a custom connection opener.
  pub fn open_with<F>(
    identity: StoreIdentity,
    ctx: &StoreContext,
    options: &OpenOptions,
    opener: F,
  ) -> Result<Self>
  where
    F: FnMut(&Path) -> rusqlite::Result<Connection>,
  {
    let database_path =
      identity.database_path(&ctx.config.data_dir, &ctx.config.database_file);
    let mut store = Self {
      identity,
      database_path,
      ctx: ctx.clone(),
      options: options.clone(),
      conn: None,
      valid: false,
      pending: RefCell::new(None),
    };
    let (conn, valid) = store.connect(opener)?;
    store.conn = Some(conn);
    store.valid = valid;
    Ok(store)
  }

  /// Run the open sequence again and swap in the new connection.
  ///
  /// The current connection is only closed once the new one is open and
  /// migrated; if that fails the store keeps working as before.
  pub fn reconnect(&mut self, options: &OpenOptions) -> Result<()> {
    let previous = std::mem::replace(&mut self.options, options.clone());
    let busy_timeout = self.ctx.config.busy_timeout();
    let (conn, valid) = match self.connect(move |path| open_file(path, busy_timeout)) {
      Ok(connected) => connected,
      Err(e) => {
        self.options = previous;
        tracing::warn!("reconnecting {} failed, keeping the old connection: {e}", self.identity);
        return Err(e);
      }
    };
    self.close();
    self.conn = Some(conn);
    self.valid = valid;
    Ok(())
  }

  /// Open and migrate a connection. The flag is `false` for the in-memory
  /// fallback.
  fn connect<F>(&self, mut opener: F) -> Result<(Connection, bool)>
  where
    F: FnMut(&Path) -> rusqlite::Result<Connection>,
  {
    let policy = self.ctx.config.retry_policy();

    let file_conn = if self.prepare_data_dir() {
      let path = &self.database_path;
      match with_retries(&policy, &self.options, "open database", || Ok(opener(path)?)) {
        Attempt::Done(conn) => Some(conn),
        Attempt::Exhausted { attempts } => {
          tracing::warn!(
            "{} stayed locked for {attempts} attempts; using an in-memory database",
            path.display()
          );
          None
        }
        Attempt::Failed(e) => return Err(e),
      }
    } else {
      None
    };

    let valid = file_conn.is_some();
    let mut conn = match file_conn {
      Some(conn) => conn,
      None => Connection::open_in_memory()?,
    };

    let user = self.ctx.config.resolved_user();
    let host = self.ctx.config.resolved_host();
    let info = InfoRecord {
      identity: &self.identity,
      user:     &user,
      host:     &host,
      created:  Utc::now().timestamp_millis() as f64 / 1000.0,
    };
    let hasher = &self.ctx.hasher;
    match with_retries(&policy, &self.options, "migrate tables", || {
      schema::migrate(&mut conn, hasher, &info)
    }) {
      Attempt::Done(()) => {}
      Attempt::Exhausted { attempts } => return Err(Error::Locked { attempts }),
      Attempt::Failed(e) => return Err(e),
    }

    if valid {
      tracing::debug!("opened {}", self.database_path.display());
    }
    Ok((conn, valid))
  }

  /// Make sure the reserved directory exists below an existing store root.
  fn prepare_data_dir(&self) -> bool {
    let base = PathBuf::from(self.identity.base_path());
    if !base.is_dir() {
      tracing::warn!("store root {} is not a reachable directory", base.display());
      return false;
    }
    let dir = self.identity.data_dir(&self.ctx.config.data_dir);
    if let Err(e) = fs::create_dir_all(&dir) {
      tracing::warn!("could not create {}: {e}", dir.display());
      return false;
    }
    true
  }

  // ── Accessors ─────────────────────────────────────────────────────────────

  pub fn identity(&self) -> &StoreIdentity { &self.identity }

  pub fn database_path(&self) -> &Path { &self.database_path }

  /// `true` only when connected to the real database file.
  pub fn is_valid(&self) -> bool { self.valid && self.conn.is_some() }

  /// `true` when running on the in-memory fallback database.
  pub fn is_memory(&self) -> bool { !self.valid && self.conn.is_some() }

  /// Item key for a path below the store root.
  pub fn source(&self, segments: &[&str]) -> String { self.identity.source(segments) }

  fn conn(&self) -> Result<&Connection> { self.conn.as_ref().ok_or(Error::Closed) }

  fn retry<T>(&self, what: &str, op: impl FnMut() -> Result<T>) -> Result<T> {
    match with_retries(&self.ctx.config.retry_policy(), &self.options, what, op) {
      Attempt::Done(value) => Ok(value),
      Attempt::Exhausted { attempts } => Err(Error::Locked { attempts }),
      Attempt::Failed(e) => Err(e),
    }
  }

  // ── Values ────────────────────────────────────────────────────────────────

  /// Read one column of the row keyed by `item_key`.
  pub fn value(&self, item_key: &str, column: &str, table: Table) -> Result<Option<Value>> {
    let conn = self.conn()?;
    if !self.valid {
      return Ok(None);
    }
    let column = table.column(column)?;
    let id = self.ctx.hasher.row_id(item_key);
    let sql = format!("SELECT {} FROM {table} WHERE id = ?1", column.name);

    let raw = self.retry("read value", || {
      Ok(
        conn
          .query_row(&sql, rusqlite::params![id], |row| raw_cell(row, 0))
          .optional()?
          .flatten(),
      )
    })?;
    Ok(decode_cell(raw, column))
  }

  /// Write one column of the row keyed by `item_key`.
  ///
  /// Other columns of the row are preserved and the row is created if
  /// needed. Listeners are notified with the value as stored.
  pub fn set_value(
    &self,
    item_key: &str,
    column: &str,
    value: Option<Value>,
    table: Table,
  ) -> Result<()> {
    let conn = self.conn()?;
    if !self.valid {
      return Ok(());
    }
    let column = writable_column(table, column)?;
    let bound = value.as_ref().map(|v| bind_value(v, column)).transpose()?;
    let id = self.ctx.hasher.row_id(item_key);
    let sql = format!(
      "INSERT INTO {table} (id, {c}) VALUES (?1, ?2)
       ON CONFLICT(id) DO UPDATE SET {c} = excluded.{c}",
      c = column.name
    );

    self.retry("write value", || {
      conn.execute(&sql, rusqlite::params![id, bound])?;
      Ok(())
    })?;

    let stored = read_back_or(self.value(item_key, column.name, table), value);
    self.notify(ValueChanged {
      table,
      item_key: item_key.to_owned(),
      column: column.name,
      value: stored,
    });
    Ok(())
  }

  /// Set or clear `flag` in the `flags` bit field of an asset row.
  pub fn set_flag(&self, item_key: &str, flag: i64, enabled: bool) -> Result<()> {
    let current = self
      .value(item_key, FLAGS_COLUMN, Table::Asset)?
      .and_then(|v| v.as_i64())
      .unwrap_or(0);
    let updated = if enabled { current | flag } else { current & !flag };
    self.set_value(item_key, FLAGS_COLUMN, Some(Value::Integer(updated)), Table::Asset)
  }

  // ── Rows ──────────────────────────────────────────────────────────────────

  /// Every data column of the row keyed by `item_key`, `None` where unset.
  pub fn row(&self, item_key: &str, table: Table) -> Result<Row> {
    let conn = self.conn()?;
    if !self.valid {
      return Ok(empty_row(table));
    }
    let id = self.ctx.hasher.row_id(item_key);
    let sql = format!("{} WHERE id = ?1", select_all_sql(table));

    let raws = self.retry("read row", || {
      Ok(conn.query_row(&sql, rusqlite::params![id], |row| raw_cells(row, table)).optional()?)
    })?;
    Ok(match raws {
      Some(raws) => decode_row(raws, table),
      None => empty_row(table),
    })
  }

  /// Every row of `table`.
  pub fn rows(&self, table: Table) -> Result<Vec<Row>> {
    let conn = self.conn()?;
    if !self.valid {
      return Ok(Vec::new());
    }
    let sql = select_all_sql(table);

    let raws = self.retry("read rows", || {
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt
        .query_map([], |row| raw_cells(row, table))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })?;
    Ok(raws.into_iter().map(|raws| decode_row(raws, table)).collect())
  }

  /// `column` of every row of `table`.
  pub fn column_values(&self, column: &str, table: Table) -> Result<Vec<Option<Value>>> {
    let conn = self.conn()?;
    if !self.valid {
      return Ok(Vec::new());
    }
    let column = table.column(column)?;
    let sql = format!("SELECT {} FROM {table}", column.name);

    let raws = self.retry("read column", || {
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt
        .query_map([], |row| raw_cell(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })?;
    Ok(raws.into_iter().map(|raw| decode_cell(raw, column)).collect())
  }

  /// Delete the row keyed by `item_key`. Returns whether a row existed.
  pub fn delete_row(&self, item_key: &str, table: Table) -> Result<bool> {
    let conn = self.conn()?;
    if !self.valid {
      return Ok(false);
    }
    if table.is_read_only() {
      return Err(stash_core::Error::ReadOnlyTable(table.name()).into());
    }
    let id = self.ctx.hasher.row_id(item_key);
    let sql = format!("DELETE FROM {table} WHERE id = ?1");
    let deleted = self.retry("delete row", || Ok(conn.execute(&sql, rusqlite::params![id])?))?;
    Ok(deleted > 0)
  }

  /// Creation metadata recorded when the database was first created.
  pub fn info(&self) -> Result<Option<StoreInfo>> {
    let row = self.row(&self.identity.base_path(), Table::Info)?;
    if row.values().all(Option::is_none) {
      return Ok(None);
    }
    let text = |name: &str| row.get(name).cloned().flatten().and_then(text_of);
    let created = row
      .get("created")
      .cloned()
      .flatten()
      .and_then(|v| v.as_f64())
      .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0).round() as i64));

    Ok(Some(StoreInfo {
      server: text("server"),
      job: text("job"),
      root: text("root"),
      user: text("user"),
      host: text("host"),
      created,
    }))
  }

  // ── Batches ───────────────────────────────────────────────────────────────

  /// Run `f` inside one transaction.
  ///
  /// Commits if `f` succeeds and rolls back if it fails. Change
  /// notifications raised inside the batch are delivered after the commit
  /// and dropped on rollback. Nested batches join the outer one.
  pub fn batch<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
    let conn = self.conn()?;
    if !self.valid || self.pending.borrow().is_some() {
      return f(self);
    }

    self.retry("begin batch", || Ok(conn.execute_batch("BEGIN IMMEDIATE")?))?;
    *self.pending.borrow_mut() = Some(Vec::new());

    let outcome = f(self).and_then(|value| {
      self.retry("commit batch", || Ok(conn.execute_batch("COMMIT")?))?;
      Ok(value)
    });
    let events = self.pending.borrow_mut().take().unwrap_or_default();

    match outcome {
      Ok(value) => {
        for event in &events {
          self.ctx.bus.emit(event);
        }
        Ok(value)
      }
      Err(e) => {
        if !conn.is_autocommit()
          && let Err(rollback) = conn.execute_batch("ROLLBACK")
        {
          tracing::error!("rollback failed for {}: {rollback}", self.identity);
        }
        Err(e)
      }
    }
  }

  fn notify(&self, event: ValueChanged) {
    if let Some(pending) = self.pending.borrow_mut().as_mut() {
      pending.push(event);
      return;
    }
    self.ctx.bus.emit(&event);
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Commit pending work and close the connection. Closing twice is a
  /// no-op.
  pub fn close(&mut self) {
    let Some(conn) = self.conn.take() else {
      tracing::debug!("store {} is already closed", self.identity);
      return;
    };
    if !conn.is_autocommit()
      && let Err(e) = conn.execute_batch("COMMIT")
    {
      tracing::error!("failed to commit {} on close: {e}", self.identity);
    }
    if let Err((_, e)) = conn.close() {
      tracing::error!("failed to close {}: {e}", self.identity);
    }
  }
}

impl Drop for SqliteStore {
  fn drop(&mut self) {
    if self.conn.is_some() {
      self.close();
    }
  }
}

impl std::fmt::Debug for SqliteStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SqliteStore")
      .field("identity", &self.identity)
      .field("database_path", &self.database_path)
      .field("valid", &self.is_valid())
      .field("closed", &self.conn.is_none())
      .finish()
  }
}

// ─── ValueStore impl ─────────────────────────────────────────────────────────

impl ValueStore for SqliteStore {
  type Error = Error;

  fn value(&self, item_key: &str, column: &str, table: Table) -> Result<Option<Value>> {
    SqliteStore::value(self, item_key, column, table)
  }

  fn set_value(
    &self,
    item_key: &str,
    column: &str,
    value: Option<Value>,
    table: Table,
  ) -> Result<()> {
    SqliteStore::set_value(self, item_key, column, value, table)
  }

  fn is_valid(&self) -> bool { SqliteStore::is_valid(self) }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// The value a write notification carries: what the store now holds, or the
/// value just written if reading it back failed.
pub(crate) fn read_back_or(read: Result<Option<Value>>, written: Option<Value>) -> Option<Value> {
  match read {
    Ok(stored) => stored,
    Err(e) => {
      tracing::warn!("could not read back a written value: {e}");
      written
    }
  }
}

/// Open a database file in multi-thread (no mutex) mode.
fn open_file(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
  let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
    | OpenFlags::SQLITE_OPEN_CREATE
    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
  let conn = Connection::open_with_flags(path, flags)?;
  conn.busy_timeout(busy_timeout)?;
  Ok(conn)
}

fn writable_column(table: Table, name: &str) -> Result<&'static Column> {
  if table.is_read_only() {
    return Err(stash_core::Error::ReadOnlyTable(table.name()).into());
  }
  Ok(table.column(name)?)
}

fn select_all_sql(table: Table) -> String {
  let columns = table.data_columns().map(|c| c.name).collect::<Vec<_>>().join(", ");
  format!("SELECT {columns} FROM {table}")
}

fn raw_cells(row: &rusqlite::Row<'_>, table: Table) -> rusqlite::Result<Vec<Option<String>>> {
  (0..table.data_columns().count())
    .map(|idx| raw_cell(row, idx))
    .collect()
}

fn decode_row(raws: Vec<Option<String>>, table: Table) -> Row {
  table
    .data_columns()
    .zip(raws)
    .map(|(column, raw)| (column.name, decode_cell(raw, column)))
    .collect()
}

fn empty_row(table: Table) -> Row { table.data_columns().map(|c| (c.name, None)).collect() }

fn text_of(value: Value) -> Option<String> {
  match value {
    Value::Text(s) => Some(s),
    _ => None,
  }
}
