//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::envelope::CacheEnvelope;
use super::freshness::{Freshness, FreshnessPolicy};
use super::key::LogicalKey;
use super::store::EntryStore;
use super::traits::CacheResult;
use crate::error::FetchError;
use crate::loading::LoadingSignal;

type NetworkFuture = BoxFuture<'static, Result<Value, FetchError>>;

/// A network request registered for de-duplication.
///
/// Held weakly so that when every caller awaiting it is dropped, the request
/// itself is dropped (cancelled) instead of being kept alive by the registry.
struct InFlight {
  id: u64,
  fetch: WeakShared<NetworkFuture>,
}

type InFlightMap = Arc<Mutex<HashMap<LogicalKey, InFlight>>>;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching with a stale fallback on network failure.
#[derive(Clone)]
pub struct CacheLayer {
  store: EntryStore,
  policy: Arc<FreshnessPolicy>,
  loading: LoadingSignal,
  in_flight: InFlightMap,
  next_id: Arc<AtomicU64>,
}

impl CacheLayer {
  /// Create a new cache layer over the given store.
  pub fn new(store: EntryStore, policy: FreshnessPolicy, loading: LoadingSignal) -> Self {
    Self {
      store,
      policy: Arc::new(policy),
      loading,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      next_id: Arc::new(AtomicU64::new(0)),
    }
  }

  pub fn store(&self) -> &EntryStore {
    &self.store
  }

  pub fn policy(&self) -> &FreshnessPolicy {
    &self.policy
  }

  pub fn loading(&self) -> &LoadingSignal {
    &self.loading
  }

  /// Resolve `key` with a cache-first strategy.
  ///
  /// 1. Fresh entry - return immediately, no network call
  /// 2. Stale/expired/missing - fetch from network (shared with any
  ///    concurrent caller for the same key) and store the result
  /// 3. On network failure, return an entry from the stale window, flagged
  ///    as stale; otherwise propagate the error
  ///
  /// `NotFound` and `Validation` errors always propagate: a stale copy of an
  /// entity the API reports missing could mask a genuine deletion.
  pub async fn resolve<F, Fut>(
    &self,
    key: &LogicalKey,
    fetcher: F,
  ) -> Result<CacheResult<Value>, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    self.resolve_checked(key, |_| true, fetcher).await
  }

  /// Typed version of [`CacheLayer::resolve`]; payloads are stored as JSON.
  ///
  /// A cached payload that does not decode as `T` counts as a miss.
  pub async fn resolve_as<T, F, Fut>(
    &self,
    key: &LogicalKey,
    fetcher: F,
  ) -> Result<CacheResult<T>, FetchError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let decodes = |value: &Value| T::deserialize(value).is_ok();
    let result = self
      .resolve_checked(key, decodes, move || {
        let request = fetcher();
        async move {
          let data = request.await?;
          Ok(serde_json::to_value(data)?)
        }
      })
      .await?;

    result.try_map(|value| serde_json::from_value(value).map_err(FetchError::from))
  }

  /// Resolve with cached payloads rejected by `usable` treated as absent.
  async fn resolve_checked<U, F, Fut>(
    &self,
    key: &LogicalKey,
    usable: U,
    fetcher: F,
  ) -> Result<CacheResult<Value>, FetchError>
  where
    U: Fn(&Value) -> bool,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    // Check cache first
    if let Some(envelope) = self.store.get(key) {
      if self.policy.classify(&envelope, Utc::now()) == Freshness::Fresh {
        if usable(&envelope.payload) {
          debug!(key = %key, "cache hit");
          return Ok(CacheResult::from_cache(envelope.payload, envelope.stored_at));
        }
        warn!(key = %key, "cached payload has unexpected shape, treating as miss");
      }
    }

    let fetch = self.join_or_start(key, fetcher);
    match fetch.await {
      Ok(data) => Ok(CacheResult::from_network(data)),
      Err(e @ (FetchError::Network(_) | FetchError::Decode(_))) => self.fallback(key, e, &usable),
      Err(e) => Err(e),
    }
  }

  /// Join the in-flight request for `key`, or start a new one.
  fn join_or_start<F, Fut>(&self, key: &LogicalKey, fetcher: F) -> Shared<NetworkFuture>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    // The map holds no invariants a panic could break
    let mut in_flight = self
      .in_flight
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(existing) = in_flight.get(key).and_then(|f| f.fetch.upgrade()) {
      debug!(key = %key, "joining in-flight request");
      return existing;
    }
    // Requests whose callers were all cancelled never remove themselves
    in_flight.retain(|_, f| f.fetch.upgrade().is_some());

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let fetch = self.network_fetch(key.clone(), id, fetcher()).boxed().shared();
    if let Some(weak) = fetch.downgrade() {
      in_flight.insert(key.clone(), InFlight { id, fetch: weak });
    }
    fetch
  }

  /// The shared network future: loading signal, request, write-back.
  ///
  /// Runs only while at least one caller polls it. Dropping every caller
  /// drops the request, so nothing is written after cancellation.
  fn network_fetch<Fut>(
    &self,
    key: LogicalKey,
    id: u64,
    request: Fut,
  ) -> impl Future<Output = Result<Value, FetchError>> + Send + 'static
  where
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    let store = self.store.clone();
    let schema_version = self.policy.schema_version.clone();
    let loading = self.loading.clone();
    let in_flight = Arc::clone(&self.in_flight);

    async move {
      // Stamp with issue time so a slow response cannot overwrite a newer one
      let issued_at = Utc::now();
      debug!(key = %key, "fetching from network");

      let guard = loading.enter();
      let result = request.await;
      drop(guard);

      match &result {
        Ok(data) => store.put(&CacheEnvelope::new(
          key.as_str(),
          data.clone(),
          issued_at,
          schema_version,
        )),
        Err(e) => debug!(key = %key, error = %e, "network fetch failed"),
      }

      let mut in_flight = in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
      if in_flight.get(&key).is_some_and(|f| f.id == id) {
        in_flight.remove(&key);
      }

      result
    }
  }

  /// Re-read the entry after a network failure and serve it if still usable.
  fn fallback<U>(
    &self,
    key: &LogicalKey,
    error: FetchError,
    usable: &U,
  ) -> Result<CacheResult<Value>, FetchError>
  where
    U: Fn(&Value) -> bool,
  {
    let envelope = match self.store.get(key) {
      Some(envelope) if usable(&envelope.payload) => envelope,
      _ => return Err(error),
    };

    match self.policy.classify(&envelope, Utc::now()) {
      // Written by a concurrent request while ours failed
      Freshness::Fresh => Ok(CacheResult::from_cache(envelope.payload, envelope.stored_at)),
      Freshness::Stale => {
        warn!(key = %key, error = %error, "network failed, serving stale entry");
        Ok(CacheResult::stale(envelope.payload, envelope.stored_at))
      }
      Freshness::Expired => Err(error),
    }
  }

  /// Number of distinct keys with a live in-flight request.
  pub fn in_flight_count(&self) -> usize {
    self
      .in_flight
      .lock()
      .map(|map| map.values().filter(|f| f.fetch.upgrade().is_some()).count())
      .unwrap_or(0)
  }
}
