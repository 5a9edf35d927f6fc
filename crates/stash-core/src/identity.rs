//! Store identity — the three path segments naming one logical store.
//!
//! A store lives under `server/job/root`. The segments are kept separate so
//! the registry can compare identities segment-wise, and joined on demand to
//! locate the backing file.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The `(server, job, root)` triple that uniquely identifies a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreIdentity {
  server: String,
  job:    String,
  root:   String,
}

impl StoreIdentity {
  /// Build an identity, rejecting empty segments and embedded NUL bytes.
  pub fn new(
    server: impl Into<String>,
    job: impl Into<String>,
    root: impl Into<String>,
  ) -> Result<Self> {
    let identity = Self {
      server: server.into(),
      job:    job.into(),
      root:   root.into(),
    };
    for (name, segment) in [
      ("server", &identity.server),
      ("job", &identity.job),
      ("root", &identity.root),
    ] {
      if segment.is_empty() {
        return Err(Error::InvalidIdentity(format!("{name} segment is empty")));
      }
      if segment.contains('\0') {
        return Err(Error::InvalidIdentity(format!(
          "{name} segment contains a NUL byte"
        )));
      }
    }
    Ok(identity)
  }

  pub fn server(&self) -> &str { &self.server }

  pub fn job(&self) -> &str { &self.job }

  pub fn root(&self) -> &str { &self.root }

  /// `server/job/root`, also the logical key of store-level rows.
  pub fn base_path(&self) -> String {
    format!("{}/{}/{}", self.server, self.job, self.root)
  }

  /// Item key for a path below the store root.
  ///
  /// With no segments this is the base path itself.
  pub fn source(&self, segments: &[&str]) -> String {
    let mut key = self.base_path();
    for segment in segments {
      key.push('/');
      key.push_str(segment);
    }
    key
  }

  /// Directory reserved for the store's own files.
  pub fn data_dir(&self, dir: &str) -> PathBuf {
    PathBuf::from(self.base_path()).join(dir)
  }

  /// Location of the backing database file.
  pub fn database_path(&self, dir: &str, file: &str) -> PathBuf {
    self.data_dir(dir).join(file)
  }
}

impl fmt::Display for StoreIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.base_path())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn base_path_joins_segments() {
    let id = StoreIdentity::new("//srv", "jobA", "shots").unwrap();
    assert_eq!(id.base_path(), "//srv/jobA/shots");
    assert_eq!(id.source(&[]), "//srv/jobA/shots");
    assert_eq!(id.source(&["sh010", "anim"]), "//srv/jobA/shots/sh010/anim");
  }

  #[test]
  fn database_path_appends_reserved_dir() {
    let id = StoreIdentity::new("/mnt/srv", "jobA", "shots").unwrap();
    assert_eq!(
      id.database_path(".bookmark", "bookmark.db"),
      PathBuf::from("/mnt/srv/jobA/shots/.bookmark/bookmark.db")
    );
  }

  #[test]
  fn empty_segment_is_rejected() {
    let err = StoreIdentity::new("//srv", "", "shots").unwrap_err();
    assert!(matches!(err, Error::InvalidIdentity(_)));
  }

  #[test]
  fn nul_segment_is_rejected() {
    assert!(StoreIdentity::new("//srv", "job\0", "shots").is_err());
  }

  #[test]
  fn equality_is_case_sensitive() {
    let a = StoreIdentity::new("//srv", "jobA", "shots").unwrap();
    let b = StoreIdentity::new("//srv", "joba", "shots").unwrap();
    assert_ne!(a, b);
  }
}
