//! Store configuration.
//!
//! Every field has a default, so an empty or missing file is valid. Values
//! are layered: built-in defaults, then an optional TOML file, then `STASH_*`
//! environment variables (e.g. `STASH_CONNECT_RETRIES=20`).

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{Result, retry::RetryPolicy};

/// Default directory, relative to a store's base path, holding its database.
pub const DEFAULT_DATA_DIR: &str = ".bookmark";
/// Default database filename inside [`DEFAULT_DATA_DIR`].
pub const DEFAULT_DATABASE_FILE: &str = "bookmark.db";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Reserved subdirectory of each store root.
  pub data_dir:             String,
  pub database_file:        String,
  /// Attempts made to open or migrate a locked database before giving up.
  pub connect_retries:      u32,
  /// Sleep between attempts on an interactive (UI) thread.
  pub interactive_sleep_ms: u64,
  /// Sleep between attempts on a background thread.
  pub background_sleep_ms:  u64,
  /// SQLite's own busy handler timeout. Zero leaves all waiting to the
  /// retry loop.
  pub busy_timeout_ms:      u64,
  /// Server prefixes stripped from item keys before hashing.
  pub servers:              Vec<String>,
  /// Recorded as the creator of new stores. Defaults to the login name.
  pub user:                 Option<String>,
  /// Recorded as the creating host of new stores. Defaults to the hostname.
  pub host:                 Option<String>,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      data_dir:             DEFAULT_DATA_DIR.to_owned(),
      database_file:        DEFAULT_DATABASE_FILE.to_owned(),
      connect_retries:      100,
      interactive_sleep_ms: 25,
      background_sleep_ms:  50,
      busy_timeout_ms:      0,
      servers:              Vec::new(),
      user:                 None,
      host:                 None,
    }
  }
}

impl StoreConfig {
  /// Load from an optional TOML file overlaid with `STASH_*` variables.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    let settings = builder
      .add_source(
        config::Environment::with_prefix("STASH")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("servers"),
      )
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts:      self.connect_retries.max(1),
      interactive_sleep: Duration::from_millis(self.interactive_sleep_ms),
      background_sleep:  Duration::from_millis(self.background_sleep_ms),
    }
  }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }

  /// The configured user, else the login name from the environment.
  pub fn resolved_user(&self) -> String {
    self
      .user
      .clone()
      .or_else(|| env_first(&["USER", "USERNAME", "LOGNAME"]))
      .unwrap_or_else(|| "unknown".to_owned())
  }

  /// The configured host, else the hostname from the environment.
  pub fn resolved_host(&self) -> String {
    self
      .host
      .clone()
      .or_else(|| env_first(&["HOSTNAME", "COMPUTERNAME"]))
      .or_else(|| {
        std::fs::read_to_string("/etc/hostname")
          .ok()
          .map(|s| s.trim().to_owned())
          .filter(|s| !s.is_empty())
      })
      .unwrap_or_else(|| "unknown".to_owned())
  }
}

fn env_first(names: &[&str]) -> Option<String> {
  names
    .iter()
    .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_the_on_disk_layout() {
    let cfg = StoreConfig::default();
    assert_eq!(cfg.data_dir, ".bookmark");
    assert_eq!(cfg.database_file, "bookmark.db");
    let policy = cfg.retry_policy();
    assert_eq!(policy.max_attempts, 100);
    assert_eq!(policy.interactive_sleep, Duration::from_millis(25));
    assert_eq!(policy.background_sleep, Duration::from_millis(50));
  }

  #[test]
  fn file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stash.toml");
    std::fs::write(
      &path,
      "connect_retries = 7\nservers = [\"//srv\", \"/mnt/srv\"]\nuser = \"ana\"\n",
    )
    .unwrap();

    let cfg = StoreConfig::load(Some(&path)).unwrap();
    assert_eq!(cfg.connect_retries, 7);
    assert_eq!(cfg.servers, vec!["//srv".to_owned(), "/mnt/srv".to_owned()]);
    assert_eq!(cfg.resolved_user(), "ana");
    assert_eq!(cfg.data_dir, DEFAULT_DATA_DIR);
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(cfg.database_file, DEFAULT_DATABASE_FILE);
  }

  #[test]
  fn zero_retries_still_attempts_once() {
    let cfg = StoreConfig { connect_retries: 0, ..StoreConfig::default() };
    assert_eq!(cfg.retry_policy().max_attempts, 1);
  }
}
