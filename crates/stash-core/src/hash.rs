//! Row ids: SHA-256 digests of logical item keys.
//!
//! Keys are normalised before hashing: backslashes become forward slashes and
//! a known server prefix is stripped, so the same item seen through different
//! mount points maps to the same row.

use std::collections::HashMap;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Memoised ids kept before the memo is cleared and starts over.
pub const MEMO_LIMIT: usize = 1 << 22;

/// Computes and memoises row ids.
#[derive(Debug)]
pub struct RowHasher {
  servers: Vec<String>,
  limit:   usize,
  cache:   Mutex<HashMap<String, String>>,
}

impl Default for RowHasher {
  fn default() -> Self { Self::new(std::iter::empty::<String>()) }
}

impl RowHasher {
  /// A hasher that strips any of `servers` from the front of a key.
  ///
  /// Longer prefixes are tried first so nested mounts resolve to the most
  /// specific server.
  pub fn new(servers: impl IntoIterator<Item = String>) -> Self {
    let mut servers: Vec<String> = servers
      .into_iter()
      .map(|s| s.replace('\\', "/"))
      .filter(|s| !s.is_empty())
      .collect();
    servers.sort_by_key(|s| std::cmp::Reverse(s.len()));
    Self { servers, limit: MEMO_LIMIT, cache: Mutex::default() }
  }

  /// Keep at most `limit` ids memoised.
  pub fn with_memo_limit(mut self, limit: usize) -> Self {
    self.limit = limit.max(1);
    self
  }

  /// Number of ids currently memoised.
  pub fn memoised(&self) -> usize { self.cache.lock().len() }

  /// Row id for `key`: 64 lowercase hex characters.
  pub fn row_id(&self, key: &str) -> String {
    if let Some(id) = self.cache.lock().get(key) {
      return id.clone();
    }

    let id = hex::encode(Sha256::digest(self.normalise(key).as_bytes()));
    let mut cache = self.cache.lock();
    if cache.len() >= self.limit {
      cache.clear();
    }
    cache.insert(key.to_owned(), id.clone());
    id
  }

  fn normalise(&self, key: &str) -> String {
    let key = key.replace('\\', "/");
    for server in &self.servers {
      if let Some(rest) = key.strip_prefix(server.as_str())
        && (rest.is_empty() || rest.starts_with('/') || server.ends_with('/'))
      {
        return rest.trim_start_matches('/').to_owned();
      }
    }
    key
  }
}
