//! Error type for `stash-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] stash_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  /// The database stayed locked for every permitted attempt.
  #[error("database still locked after {attempts} attempts")]
  Locked { attempts: u32 },

  #[error("store is closed")]
  Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
