//! Bounded retry for lock contention.
//!
//! A store file on shared storage may be held by other threads or by other
//! users' processes. Opening it or running schema DDL can then fail with
//! `SQLITE_BUSY`/`SQLITE_LOCKED`; those failures are retried a fixed number
//! of times with a short sleep in between. Every other error is returned
//! immediately.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use rusqlite::ErrorCode;

use crate::{Error, Result};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Always at least one.
  pub max_attempts:      u32,
  pub interactive_sleep: Duration,
  pub background_sleep:  Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:      100,
      interactive_sleep: Duration::from_millis(25),
      background_sleep:  Duration::from_millis(50),
    }
  }
}

impl RetryPolicy {
  pub fn sleep_for(&self, role: ThreadRole) -> Duration {
    match role {
      ThreadRole::Interactive => self.interactive_sleep,
      ThreadRole::Background => self.background_sleep,
    }
  }
}

/// Whether the caller is a latency-sensitive UI thread.
///
/// Interactive callers sleep for a shorter quantum between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadRole {
  Interactive,
  #[default]
  Background,
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Stops a retry loop early, either on request or once a deadline passes.
///
/// Cloning shares the cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
  flag:     Arc<AtomicBool>,
  deadline: Option<Instant>,
}

impl Cancel {
  pub fn new() -> Self { Self::default() }

  /// A token that expires `timeout` from now.
  pub fn with_timeout(timeout: Duration) -> Self {
    Self { flag: Arc::default(), deadline: Instant::now().checked_add(timeout) }
  }

  pub fn cancel(&self) { self.flag.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
      || self.deadline.is_some_and(|d| Instant::now() >= d)
  }
}

/// Per-call knobs for opening a store.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
  pub role:   ThreadRole,
  pub cancel: Option<Cancel>,
}

impl OpenOptions {
  pub fn interactive() -> Self {
    Self { role: ThreadRole::Interactive, cancel: None }
  }

  pub fn with_cancel(mut self, cancel: Cancel) -> Self {
    self.cancel = Some(cancel);
    self
  }

  fn is_cancelled(&self) -> bool {
    self.cancel.as_ref().is_some_and(Cancel::is_cancelled)
  }
}

// ─── Loop ────────────────────────────────────────────────────────────────────

/// Result of [`with_retries`].
#[derive(Debug)]
pub(crate) enum Attempt<T> {
  Done(T),
  /// Still locked after `attempts` tries (or cancelled in between).
  Exhausted { attempts: u32 },
  Failed(Error),
}

/// `true` for the lock-contention errors worth retrying.
pub(crate) fn is_transient(err: &Error) -> bool {
  matches!(
    err,
    Error::Database(rusqlite::Error::SqliteFailure(e, _))
      if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

/// Run `op` until it succeeds, fails for a non-transient reason, or the
/// policy's attempts are used up.
pub(crate) fn with_retries<T>(
  policy: &RetryPolicy,
  options: &OpenOptions,
  what: &str,
  mut op: impl FnMut() -> Result<T>,
) -> Attempt<T> {
  let max = policy.max_attempts.max(1);
  let mut attempts = 0;
  loop {
    attempts += 1;
    match op() {
      Ok(value) => return Attempt::Done(value),
      Err(e) if is_transient(&e) => {
        if attempts >= max {
          return Attempt::Exhausted { attempts };
        }
        if options.is_cancelled() {
          tracing::debug!("{what}: cancelled after {attempts} attempts");
          return Attempt::Exhausted { attempts };
        }
        tracing::debug!("{what}: database is locked, retrying {attempts}/{max}");
        let pause = policy.sleep_for(options.role);
        if !pause.is_zero() {
          thread::sleep(pause);
        }
      }
      Err(e) => return Attempt::Failed(e),
    }
  }
}
