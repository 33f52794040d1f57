//! Reference-counted "network activity" signal.
//!
//! Overlapping requests each hold a [`LoadingGuard`]; the signal reads as
//! loading until the last guard is dropped.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;

struct LoadingInner {
  in_flight: Mutex<usize>,
  tx: watch::Sender<bool>,
}

/// Shared in-flight counter broadcasting a derived `is_loading` flag.
///
/// Cloning shares the same counter. Pass it to every component that performs
/// network calls and to the presentation code that shows progress.
#[derive(Clone)]
pub struct LoadingSignal {
  inner: Arc<LoadingInner>,
}

impl LoadingSignal {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self {
      inner: Arc::new(LoadingInner {
        in_flight: Mutex::new(0),
        tx,
      }),
    }
  }

  /// Mark one request as started. Dropping the guard marks it finished.
  pub fn enter(&self) -> LoadingGuard {
    self.adjust(|count| *count += 1);
    LoadingGuard {
      signal: self.clone(),
    }
  }

  fn leave(&self) {
    self.adjust(|count| *count = count.saturating_sub(1));
  }

  fn adjust(&self, f: impl FnOnce(&mut usize)) {
    // The counter is only ever a plain integer; a poisoned lock is still valid
    let mut count = self
      .inner
      .in_flight
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut count);
    let loading = *count > 0;
    // Notify while holding the lock so transitions are published in order
    self.inner.tx.send_if_modified(|current| {
      if *current != loading {
        *current = loading;
        true
      } else {
        false
      }
    });
  }

  /// Number of requests currently in flight.
  pub fn in_flight(&self) -> usize {
    *self
      .inner
      .in_flight
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn is_loading(&self) -> bool {
    *self.inner.tx.borrow()
  }

  /// Subscribe to loading transitions. The receiver starts at the current state.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.inner.tx.subscribe()
  }
}

impl Default for LoadingSignal {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for LoadingSignal {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoadingSignal")
      .field("in_flight", &self.in_flight())
      .finish()
  }
}

/// Held for the duration of one network call.
#[must_use = "dropping the guard immediately ends the loading state"]
pub struct LoadingGuard {
  signal: LoadingSignal,
}

impl Drop for LoadingGuard {
  fn drop(&mut self) {
    self.signal.leave();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_overlapping_requests_keep_loading() {
    let signal = LoadingSignal::new();
    assert!(!signal.is_loading());

    let first = signal.enter();
    let second = signal.enter();
    assert_eq!(signal.in_flight(), 2);

    drop(first);
    assert!(signal.is_loading());

    drop(second);
    assert!(!signal.is_loading());
    assert_eq!(signal.in_flight(), 0);
  }

  #[test]
  fn test_clones_share_counter() {
    let signal = LoadingSignal::new();
    let other = signal.clone();

    let _guard = other.enter();
    assert!(signal.is_loading());
  }

  #[tokio::test]
  async fn test_subscriber_sees_transitions() {
    let signal = LoadingSignal::new();
    let mut rx = signal.subscribe();
    assert!(!*rx.borrow());

    let guard = signal.enter();
    rx.changed().await.unwrap();
    assert!(*rx.borrow_and_update());

    // Nested enter does not publish a new value
    let nested = signal.enter();
    assert!(!rx.has_changed().unwrap());
    drop(nested);
    assert!(!rx.has_changed().unwrap());

    drop(guard);
    rx.changed().await.unwrap();
    assert!(!*rx.borrow_and_update());
  }
}
