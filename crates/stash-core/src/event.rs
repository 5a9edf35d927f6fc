//! Change notifications.
//!
//! Every successful write publishes a [`ValueChanged`] to the [`ChangeBus`].
//! Listeners run synchronously on the writing thread, after the write is
//! committed.

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;

use crate::{schema::Table, value::Value};

/// A column of one row now holds `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChanged {
  pub table:    Table,
  pub item_key: String,
  pub column:   &'static str,
  pub value:    Option<Value>,
}

/// Handle returned by [`ChangeBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ValueChanged) + Send + Sync>;

/// Broadcasts [`ValueChanged`] events to registered listeners.
#[derive(Default)]
pub struct ChangeBus {
  next:      AtomicU64,
  listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl ChangeBus {
  pub fn new() -> Self { Self::default() }

  pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
  where
    F: Fn(&ValueChanged) + Send + Sync + 'static,
  {
    let id = SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed));
    self.listeners.write().push((id, Arc::new(listener)));
    id
  }

  /// Returns `false` if `id` was not subscribed.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut listeners = self.listeners.write();
    let before = listeners.len();
    listeners.retain(|(sid, _)| *sid != id);
    listeners.len() != before
  }

  pub fn emit(&self, event: &ValueChanged) {
    // Snapshot so a listener may (un)subscribe without deadlocking.
    let listeners: Vec<Listener> =
      self.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
    for listener in listeners {
      listener(event);
    }
  }

  pub fn listener_count(&self) -> usize { self.listeners.read().len() }
}

impl std::fmt::Debug for ChangeBus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChangeBus")
      .field("listeners", &self.listener_count())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  fn event() -> ValueChanged {
    ValueChanged {
      table:    Table::Bookmark,
      item_key: "//srv/jobA/shots".into(),
      column:   "width",
      value:    Some(Value::Integer(1920)),
    }
  }

  #[test]
  fn listeners_receive_events() {
    let bus = ChangeBus::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    bus.subscribe(move |e| {
      assert_eq!(e.column, "width");
      s.fetch_add(1, Ordering::SeqCst);
    });
    bus.emit(&event());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn unsubscribed_listener_is_silent() {
    let bus = ChangeBus::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    let id = bus.subscribe(move |_| {
      s.fetch_add(1, Ordering::SeqCst);
    });
    assert!(bus.unsubscribe(id));
    assert!(!bus.unsubscribe(id));
    bus.emit(&event());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
  }
}
