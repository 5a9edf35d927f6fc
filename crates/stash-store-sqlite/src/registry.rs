//! [`StoreRegistry`] — one [`SqliteStore`] per (store, thread).
//!
//! SQLite handles must not be shared between threads, so the registry keys
//! its cache on the calling thread as well as on the store identity. Several
//! threads working on the same store each get their own connection to the
//! same file.
//!
//! Entries of threads that have exited are closed and evicted the next time
//! any thread opens a store, or on [`StoreRegistry::prune`].
//!
//! The registry also owns the clipboard used to copy a row's values from one
//! item to another.

use std::{
  collections::HashMap,
  sync::{Arc, Weak},
  thread::{self, ThreadId},
};

use parking_lot::Mutex;
use stash_core::{
  ChangeBus, RowHasher, StoreIdentity, SubscriptionId, ValueChanged,
  schema::Table,
  value::Row,
};

use crate::{Result, config::StoreConfig, retry::OpenOptions, store::SqliteStore};

/// A store shared between the registry and its owning thread.
pub type SharedStore = Arc<Mutex<SqliteStore>>;

/// State shared by every store a registry opens.
#[derive(Debug, Clone)]
pub struct StoreContext {
  pub config: Arc<StoreConfig>,
  pub hasher: Arc<RowHasher>,
  pub bus:    Arc<ChangeBus>,
}

impl StoreContext {
  pub fn new(config: StoreConfig) -> Self {
    let hasher = RowHasher::new(config.servers.iter().cloned());
    Self {
      config: Arc::new(config),
      hasher: Arc::new(hasher),
      bus:    Arc::new(ChangeBus::new()),
    }
  }
}

impl Default for StoreContext {
  fn default() -> Self { Self::new(StoreConfig::default()) }
}

type CacheKey = (StoreIdentity, ThreadId);

thread_local! {
  /// Dropped when the thread exits, which expires every [`Weak`] to it.
  static THREAD_ALIVE: Arc<()> = Arc::new(());
}

fn thread_token() -> Weak<()> { THREAD_ALIVE.with(Arc::downgrade) }

#[derive(Debug)]
struct CacheEntry {
  store: SharedStore,
  owner: Weak<()>,
}

impl CacheEntry {
  fn owner_exited(&self) -> bool { self.owner.strong_count() == 0 }
}

/// Process-wide cache of open stores plus the copy/paste clipboard.
///
/// Construct one per application (or per test) and pass it to whoever needs
/// a store.
#[derive(Debug, Default)]
pub struct StoreRegistry {
  ctx:         StoreContext,
  connections: Mutex<HashMap<CacheKey, CacheEntry>>,
  clipboard:   Mutex<HashMap<Table, Row>>,
}

impl StoreRegistry {
  pub fn new(config: StoreConfig) -> Self {
    Self {
      ctx:         StoreContext::new(config),
      connections: Mutex::default(),
      clipboard:   Mutex::default(),
    }
  }

  pub fn context(&self) -> &StoreContext { &self.ctx }

  pub fn config(&self) -> &StoreConfig { &self.ctx.config }

  // ── Cache ─────────────────────────────────────────────────────────────────

  /// The calling thread's store for `identity`, opened on first use.
  ///
  /// With `force_reconnect` an already cached store is closed and opened
  /// again, e.g. to pick up a database that was unreachable earlier.
  pub fn get_store(&self, identity: &StoreIdentity, force_reconnect: bool) -> Result<SharedStore> {
    self.get_store_with(identity, force_reconnect, &OpenOptions::default())
  }

  pub fn get_store_with(
    &self,
    identity: &StoreIdentity,
    force_reconnect: bool,
    options: &OpenOptions,
  ) -> Result<SharedStore> {
    let key = (identity.clone(), thread::current().id());

    let cached = self.connections.lock().get(&key).map(|e| Arc::clone(&e.store));
    if let Some(store) = cached {
      if force_reconnect {
        store.lock().reconnect(options)?;
      }
      return Ok(store);
    }

    self.prune();

    // Opening may sleep on a locked file; keep the cache unlocked meanwhile.
    // No other thread can insert this key, as it carries our thread id.
    let store = Arc::new(Mutex::new(SqliteStore::open(identity.clone(), &self.ctx, options)?));
    let entry = CacheEntry { store: Arc::clone(&store), owner: thread_token() };
    self.connections.lock().insert(key, entry);
    tracing::debug!("cached store {identity} for {:?}", thread::current().id());
    Ok(store)
  }

  /// Close and evict the stores of threads that have exited.
  ///
  /// Returns the number of stores closed.
  pub fn prune(&self) -> usize {
    let evicted: Vec<SharedStore> = {
      let mut connections = self.connections.lock();
      let keys: Vec<CacheKey> = connections
        .iter()
        .filter(|(_, entry)| entry.owner_exited())
        .map(|(key, _)| key.clone())
        .collect();
      keys.iter().filter_map(|k| connections.remove(k)).map(|e| e.store).collect()
    };
    for store in &evicted {
      store.lock().close();
    }
    if !evicted.is_empty() {
      tracing::debug!("closed {} stores of exited threads", evicted.len());
    }
    evicted.len()
  }

  /// Close and evict every thread's store for `identity`.
  ///
  /// Returns the number of stores closed.
  pub fn remove_store(&self, identity: &StoreIdentity) -> usize {
    let evicted: Vec<SharedStore> = {
      let mut connections = self.connections.lock();
      let keys: Vec<CacheKey> = connections
        .keys()
        .filter(|(id, _)| id == identity)
        .cloned()
        .collect();
      keys.iter().filter_map(|k| connections.remove(k)).map(|e| e.store).collect()
    };
    for store in &evicted {
      store.lock().close();
    }
    evicted.len()
  }

  /// Close and evict every cached store.
  pub fn close_all(&self) {
    let evicted: Vec<SharedStore> =
      self.connections.lock().drain().map(|(_, entry)| entry.store).collect();
    for store in evicted {
      store.lock().close();
    }
  }

  /// Number of cached stores across all threads.
  pub fn len(&self) -> usize { self.connections.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  // ── Notifications ─────────────────────────────────────────────────────────

  /// Register a listener for every successful write through this registry's
  /// stores.
  ///
  /// Listeners run on the writing thread while its store is locked, so they
  /// must not lock that store again.
  pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
  where
    F: Fn(&ValueChanged) + Send + Sync + 'static,
  {
    self.ctx.bus.subscribe(listener)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) -> bool { self.ctx.bus.unsubscribe(id) }

  // ── Clipboard ─────────────────────────────────────────────────────────────

  /// Copy every value of `item_key`'s row to the clipboard slot for `table`.
  pub fn copy_values(&self, identity: &StoreIdentity, item_key: &str, table: Table) -> Result<Row> {
    let store = self.get_store(identity, false)?;
    let row = store.lock().row(item_key, table)?;
    self.clipboard.lock().insert(table, row.clone());
    Ok(row)
  }

  /// Write the clipboard slot for `table` to `item_key`'s row, in one batch.
  ///
  /// Does nothing if nothing was copied from `table`.
  pub fn paste_values(&self, identity: &StoreIdentity, item_key: &str, table: Table) -> Result<()> {
    let Some(row) = self.clipboard.lock().get(&table).cloned() else {
      return Ok(());
    };
    if row.is_empty() {
      return Ok(());
    }

    let shared = self.get_store(identity, false)?;
    let store = shared.lock();
    store.batch(|s| {
      for (column, value) in row {
        s.set_value(item_key, column, value, table)?;
      }
      Ok(())
    })
  }

  /// Contents of the clipboard slot for `table`, if anything was copied.
  pub fn clipboard(&self, table: Table) -> Option<Row> { self.clipboard.lock().get(&table).cloned() }
}

impl Drop for StoreRegistry {
  fn drop(&mut self) { self.close_all(); }
}
