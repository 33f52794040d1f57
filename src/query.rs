//! Reactive read hook over the cached fetch path.
//!
//! Presentation code owns a [`ReadHook`], sets the key it wants to show and
//! polls the hook from its event loop. The hook exposes `{data, error,
//! is_stale}` and never revalidates on its own: focus/reconnect revalidation
//! and retry-on-error are off unless enabled through [`QueryOptions`].
//!
//! # Example
//!
//! ```ignore
//! let client = cached_client.clone();
//! let mut hook = ReadHook::new(move |slug: String| {
//!     let client = client.clone();
//!     async move { client.post(&slug).await }
//! });
//!
//! hook.set_key("hello-world".to_string());
//!
//! // In event loop tick
//! if hook.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! let state = hook.state();
//! if let Some(post) = state.data { render_post(post, state.is_stale) }
//! ```

use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::CacheResult;
use crate::error::FetchError;

/// Revalidation knobs. All off by default: content changes infrequently and
/// retrying is a user-initiated action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
  pub revalidate_on_focus: bool,
  pub revalidate_on_reconnect: bool,
  /// Retry once automatically after an error
  pub retry_on_error: bool,
}

/// Snapshot of what the presentation layer renders.
#[derive(Debug, Clone, Copy)]
pub struct ReadState<'a, T> {
  pub data: Option<&'a T>,
  pub error: Option<&'a FetchError>,
  /// Data was served from the stale window after a network failure
  pub is_stale: bool,
}

type FetchOutcome<T> = Result<CacheResult<T>, FetchError>;

/// A factory function that creates futures for fetching data by key
type FetcherFn<K, T> = Box<dyn Fn(K) -> BoxFuture<'static, FetchOutcome<T>> + Send + Sync>;

/// Keyed async read with cancellation on key change.
pub struct ReadHook<K, T> {
  key: Option<K>,
  data: Option<T>,
  error: Option<FetchError>,
  is_stale: bool,
  loading: bool,
  fetcher: FetcherFn<K, T>,
  options: QueryOptions,
  retries_left: u8,
  receiver: Option<mpsc::UnboundedReceiver<FetchOutcome<T>>>,
  task: Option<JoinHandle<()>>,
}

impl<K, T> ReadHook<K, T>
where
  K: Clone + PartialEq + Send + 'static,
  T: Send + 'static,
{
  /// Create a new hook with the given fetcher.
  ///
  /// The fetcher is called with the current key each time a fetch starts.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchOutcome<T>> + Send + 'static,
  {
    Self {
      key: None,
      data: None,
      error: None,
      is_stale: false,
      loading: false,
      fetcher: Box::new(move |key| Box::pin(fetcher(key))),
      options: QueryOptions::default(),
      retries_left: 0,
      receiver: None,
      task: None,
    }
  }

  pub fn with_options(mut self, options: QueryOptions) -> Self {
    self.options = options;
    self
  }

  pub fn key(&self) -> Option<&K> {
    self.key.as_ref()
  }

  pub fn state(&self) -> ReadState<'_, T> {
    ReadState {
      data: self.data.as_ref(),
      error: self.error.as_ref(),
      is_stale: self.is_stale,
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }

  pub fn is_stale(&self) -> bool {
    self.is_stale
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  /// Point the hook at `key`. A new key cancels any pending fetch for the
  /// previous one and starts a new fetch; the same key is a no-op.
  pub fn set_key(&mut self, key: K) {
    if self.key.as_ref() == Some(&key) {
      return;
    }

    self.cancel();
    self.key = Some(key);
    self.data = None;
    self.error = None;
    self.is_stale = false;
    self.start_fetch();
  }

  /// Detach from any key (e.g. the view was closed).
  pub fn clear_key(&mut self) {
    self.cancel();
    self.key = None;
    self.data = None;
    self.error = None;
    self.is_stale = false;
  }

  /// User-initiated retry. Keeps current data until the new result arrives.
  pub fn refetch(&mut self) {
    if self.key.is_none() {
      return;
    }
    self.cancel();
    self.start_fetch();
  }

  /// Window regained focus. Returns whether a revalidation started.
  pub fn on_focus(&mut self) -> bool {
    self.revalidate_if(self.options.revalidate_on_focus)
  }

  /// Network came back. Returns whether a revalidation started.
  pub fn on_reconnect(&mut self) -> bool {
    self.revalidate_if(self.options.revalidate_on_reconnect)
  }

  fn revalidate_if(&mut self, enabled: bool) -> bool {
    if !enabled || self.key.is_none() || self.loading {
      return false;
    }
    self.start_fetch();
    true
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed (data arrived or error occurred).
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    // Try to receive without blocking
    let outcome = match receiver.try_recv() {
      Ok(outcome) => outcome,
      Err(mpsc::error::TryRecvError::Empty) => return false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending - treat as error
        Err(FetchError::Network("request was cancelled".to_string()))
      }
    };

    self.receiver = None;
    self.task = None;
    self.loading = false;

    match outcome {
      Ok(result) => {
        self.is_stale = result.is_stale();
        self.data = Some(result.data);
        self.error = None;
      }
      Err(error) => {
        let transient = matches!(error, FetchError::Network(_) | FetchError::Decode(_));
        if transient && self.retries_left > 0 {
          self.retries_left -= 1;
          debug!(error = %error, "retrying after error");
          self.spawn_fetch();
          return false;
        }
        self.error = Some(error);
      }
    }
    true
  }

  /// Abort the pending fetch. Dropping the task drops its share of any
  /// in-flight request without affecting other callers.
  fn cancel(&mut self) {
    self.receiver = None;
    if let Some(task) = self.task.take() {
      task.abort();
    }
    self.loading = false;
  }

  fn start_fetch(&mut self) {
    self.retries_left = u8::from(self.options.retry_on_error);
    self.spawn_fetch();
  }

  fn spawn_fetch(&mut self) {
    let key = match &self.key {
      Some(key) => key.clone(),
      None => return,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.loading = true;

    let future = (self.fetcher)(key);
    self.task = Some(tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    }));
  }
}

impl<K, T> Drop for ReadHook<K, T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<K: std::fmt::Debug, T: std::fmt::Debug> std::fmt::Debug for ReadHook<K, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ReadHook")
      .field("key", &self.key)
      .field("data", &self.data)
      .field("error", &self.error)
      .field("is_stale", &self.is_stale)
      .field("loading", &self.loading)
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn counting_hook(counter: &Arc<AtomicU32>) -> ReadHook<String, String> {
    let counter = Arc::clone(counter);
    ReadHook::new(move |key: String| {
      let counter = Arc::clone(&counter);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(CacheResult::from_network(format!("value for {}", key)))
      }
    })
  }

  #[tokio::test]
  async fn test_key_triggers_fetch() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut hook = counting_hook(&counter);
    assert!(!hook.poll());

    hook.set_key("a".to_string());
    assert!(hook.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(hook.poll());
    assert!(!hook.is_loading());
    assert_eq!(hook.data().map(String::as_str), Some("value for a"));
    assert!(!hook.state().is_stale);
    assert!(hook.state().error.is_none());
  }

  #[tokio::test]
  async fn test_same_key_does_not_refetch() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut hook = counting_hook(&counter);

    hook.set_key("a".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;
    hook.poll();
    hook.set_key("a".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!hook.poll());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_flag_is_exposed() {
    let mut hook = ReadHook::new(|_key: u32| async {
      Ok(CacheResult::stale("old".to_string(), Utc::now()))
    });

    hook.set_key(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    hook.poll();

    assert!(hook.is_stale());
    assert_eq!(hook.data().map(String::as_str), Some("old"));
  }

  #[tokio::test]
  async fn test_error_is_not_retried_by_default() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    let mut hook: ReadHook<u32, String> = ReadHook::new(move |_key| {
      let counter = Arc::clone(&counter_clone);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Network("offline".to_string()))
      }
    });

    hook.set_key(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(hook.poll());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(hook.error(), Some(&FetchError::Network("offline".to_string())));
    assert!(!hook.is_loading());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // User-initiated retry
    hook.refetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    hook.poll();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_retry_on_error_when_enabled() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    let mut hook: ReadHook<u32, u32> = ReadHook::new(move |_key| {
      let counter = Arc::clone(&counter_clone);
      async move {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(FetchError::Network("flaky".to_string()))
        } else {
          Ok(CacheResult::from_network(7))
        }
      }
    })
    .with_options(QueryOptions {
      retry_on_error: true,
      ..QueryOptions::default()
    });

    hook.set_key(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!hook.poll());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(hook.poll());

    assert_eq!(hook.data(), Some(&7));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_not_found_is_not_retried() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    let mut hook: ReadHook<u32, u32> = ReadHook::new(move |_key| {
      let counter = Arc::clone(&counter_clone);
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::NotFound("post \"gone\"".to_string()))
      }
    })
    .with_options(QueryOptions {
      retry_on_error: true,
      ..QueryOptions::default()
    });

    hook.set_key(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(hook.poll());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(matches!(hook.error(), Some(FetchError::NotFound(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_focus_and_reconnect_disabled_by_default() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut hook = counting_hook(&counter);
    hook.set_key("a".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;
    hook.poll();

    assert!(!hook.on_focus());
    assert!(!hook.on_reconnect());

    let mut enabled = counting_hook(&counter).with_options(QueryOptions {
      revalidate_on_focus: true,
      revalidate_on_reconnect: true,
      retry_on_error: false,
    });
    enabled.set_key("b".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;
    enabled.poll();

    assert!(enabled.on_focus());
    tokio::time::sleep(Duration::from_millis(10)).await;
    enabled.poll();
    assert!(enabled.on_reconnect());
    tokio::time::sleep(Duration::from_millis(10)).await;
    enabled.poll();

    assert_eq!(counter.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_key_change_cancels_pending_fetch() {
    let finished = Arc::new(AtomicBool::new(false));
    let finished_clone = Arc::clone(&finished);
    let mut hook: ReadHook<String, String> = ReadHook::new(move |key: String| {
      let finished = Arc::clone(&finished_clone);
      async move {
        if key == "slow" {
          tokio::time::sleep(Duration::from_millis(50)).await;
          finished.store(true, Ordering::SeqCst);
        }
        Ok(CacheResult::from_network(key))
      }
    });

    hook.set_key("slow".to_string());
    tokio::time::sleep(Duration::from_millis(10)).await;
    hook.set_key("fast".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(hook.poll());
    assert_eq!(hook.data().map(String::as_str), Some("fast"));
    assert!(!finished.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_drop_aborts_pending_fetch() {
    let finished = Arc::new(AtomicBool::new(false));
    let finished_clone = Arc::clone(&finished);
    let mut hook: ReadHook<u32, u32> = ReadHook::new(move |key| {
      let finished = Arc::clone(&finished_clone);
      async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        finished.store(true, Ordering::SeqCst);
        Ok(CacheResult::from_network(key))
      }
    });

    hook.set_key(1);
    tokio::time::sleep(Duration::from_millis(5)).await;
    drop(hook);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(!finished.load(Ordering::SeqCst));
  }
}
