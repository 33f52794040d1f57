//! Persistent entry store: namespaced, fail-open envelope storage.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::envelope::CacheEnvelope;
use super::key::LogicalKey;
use super::storage::CacheStorage;
use crate::error::StorageError;

/// Default namespace prefix for every cache key.
pub const DEFAULT_NAMESPACE: &str = "wp_cache_";

/// Outcome of a successful write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
  Written,
  /// An entry stamped later under the same schema version is already present
  RejectedOlder,
}

/// Namespaced envelope store over a storage medium.
///
/// The only component that touches the medium. Reads and writes never fail
/// from the caller's point of view: medium errors and corrupt entries are
/// logged and degrade to absent / no-op.
#[derive(Clone)]
pub struct EntryStore {
  backend: Arc<dyn CacheStorage>,
  namespace: String,
  /// Serializes read-check-write sequences
  write_lock: Arc<Mutex<()>>,
}

impl EntryStore {
  pub fn new(backend: Arc<dyn CacheStorage>) -> Self {
    Self::with_namespace(backend, DEFAULT_NAMESPACE)
  }

  pub fn with_namespace(backend: Arc<dyn CacheStorage>, namespace: impl Into<String>) -> Self {
    Self {
      backend,
      namespace: namespace.into(),
      write_lock: Arc::new(Mutex::new(())),
    }
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  fn storage_key(&self, key: &str) -> String {
    format!("{}{}", self.namespace, key)
  }

  /// Read the envelope for `key`, or `None` if absent, unreadable or corrupt.
  pub fn get(&self, key: &LogicalKey) -> Option<CacheEnvelope> {
    match self.try_get(key) {
      Ok(envelope) => envelope,
      Err(e) => {
        warn!(key = %key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn try_get(&self, key: &LogicalKey) -> Result<Option<CacheEnvelope>, StorageError> {
    let raw = match self.backend.get(&self.storage_key(key.as_str()))? {
      Some(raw) => raw,
      None => return Ok(None),
    };

    let mut envelope: CacheEnvelope =
      serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
      })?;
    envelope.key = key.to_string();
    Ok(Some(envelope))
  }

  /// Write an envelope, absorbing any storage failure.
  pub fn put(&self, envelope: &CacheEnvelope) {
    if let Err(e) = self.try_put(envelope) {
      warn!(key = %envelope.key, error = %e, "cache write failed, skipping");
    }
  }

  /// Write an envelope, reporting storage failures.
  ///
  /// A write older than the entry already present (same schema version) is
  /// rejected so a slow response cannot overwrite a newer one.
  pub fn try_put(&self, envelope: &CacheEnvelope) -> Result<PutOutcome, StorageError> {
    let _guard = self
      .write_lock
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

    let key = LogicalKey::from(envelope.key.as_str());
    // An unreadable existing entry is simply overwritten
    if let Ok(Some(existing)) = self.try_get(&key) {
      if existing.schema_version == envelope.schema_version && existing.is_newer_than(envelope) {
        debug!(key = %key, "rejecting write older than stored entry");
        return Ok(PutOutcome::RejectedOlder);
      }
    }

    self.write_raw(envelope)?;
    Ok(PutOutcome::Written)
  }

  /// Merge `members` into the batch envelope at `key` (read-merge-write).
  ///
  /// Members already present under the same schema version are kept unless
  /// overwritten by a member of the same slug.
  pub fn merge_batch(
    &self,
    key: &LogicalKey,
    members: Map<String, Value>,
    stored_at: DateTime<Utc>,
    schema_version: &str,
  ) -> Result<(), StorageError> {
    let _guard = self
      .write_lock
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

    let mut merged = match self.try_get(key) {
      Ok(Some(existing)) if existing.schema_version == schema_version => {
        existing.batch_members()
      }
      _ => Map::new(),
    };
    merged.extend(members);

    let envelope = CacheEnvelope::new(
      key.as_str(),
      Value::Object(merged),
      stored_at,
      schema_version,
    );
    self.write_raw(&envelope)
  }

  fn write_raw(&self, envelope: &CacheEnvelope) -> Result<(), StorageError> {
    let raw = serde_json::to_string(envelope).map_err(|e| StorageError::Corrupt {
      key: envelope.key.clone(),
      reason: e.to_string(),
    })?;
    self.backend.set(&self.storage_key(&envelope.key), &raw)
  }

  /// Remove all entries whose logical key starts with `prefix` under this
  /// store's namespace. An empty prefix clears the whole namespace.
  pub fn clear(&self, prefix: &str) -> usize {
    match self.backend.remove_prefix(&self.storage_key(prefix)) {
      Ok(removed) => {
        debug!(prefix, removed, "cleared cache entries");
        removed
      }
      Err(e) => {
        warn!(prefix, error = %e, "cache clear failed");
        0
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{FailingStorage, MemoryStorage};
  use chrono::Duration;
  use serde_json::json;

  fn memory_store() -> (Arc<MemoryStorage>, EntryStore) {
    let backend = Arc::new(MemoryStorage::new());
    let store = EntryStore::new(backend.clone());
    (backend, store)
  }

  #[test]
  fn test_round_trip() {
    let (_, store) = memory_store();
    let key = LogicalKey::entity("post", "a");
    let payload = json!({"id": 1, "title": {"rendered": "Hello"}});
    let env = CacheEnvelope::new(key.as_str(), payload.clone(), Utc::now(), "v2");

    store.put(&env);
    let read = store.get(&key).unwrap();

    assert_eq!(read.payload, payload);
    assert_eq!(read.key, "post:a");
    assert_eq!(read.schema_version, "v2");
  }

  #[test]
  fn test_keys_are_namespaced() {
    let (backend, store) = memory_store();
    store.put(&CacheEnvelope::new("post:a", json!(1), Utc::now(), "v2"));

    assert!(backend.get("wp_cache_post:a").unwrap().is_some());
  }

  #[test]
  fn test_corrupt_entry_reads_as_absent() {
    let (backend, store) = memory_store();
    backend.set("wp_cache_post:a", "{not json").unwrap();
    backend.set("wp_cache_post:b", r#"{"data": 1}"#).unwrap();

    assert!(store.get(&LogicalKey::from("post:a")).is_none());
    assert!(store.get(&LogicalKey::from("post:b")).is_none());
  }

  #[test]
  fn test_failing_medium_is_absorbed() {
    let store = EntryStore::new(Arc::new(FailingStorage::always()));
    let env = CacheEnvelope::new("post:a", json!(1), Utc::now(), "v2");

    store.put(&env);
    assert!(store.get(&LogicalKey::from("post:a")).is_none());
    assert_eq!(store.clear(""), 0);
    assert!(store.try_put(&env).is_err());
  }

  #[test]
  fn test_older_write_is_rejected() {
    let (_, store) = memory_store();
    let now = Utc::now();
    let newer = CacheEnvelope::new("k", json!("new"), now, "v2");
    let older = CacheEnvelope::new("k", json!("old"), now - Duration::seconds(5), "v2");

    assert_eq!(store.try_put(&newer).unwrap(), PutOutcome::Written);
    assert_eq!(store.try_put(&older).unwrap(), PutOutcome::RejectedOlder);
    assert_eq!(store.get(&LogicalKey::from("k")).unwrap().payload, json!("new"));
  }

  #[test]
  fn test_other_version_is_always_replaceable() {
    let (_, store) = memory_store();
    let now = Utc::now();
    store.put(&CacheEnvelope::new("k", json!("v1"), now, "v1"));
    store.put(&CacheEnvelope::new("k", json!("v2"), now - Duration::seconds(5), "v2"));

    assert_eq!(store.get(&LogicalKey::from("k")).unwrap().payload, json!("v2"));
  }

  #[test]
  fn test_merge_batch_keeps_existing_members() {
    let (_, store) = memory_store();
    let key = LogicalKey::batch(&[1, 2]);
    let now = Utc::now();

    let mut first = Map::new();
    first.insert("a".into(), json!({"id": 1}));
    store.merge_batch(&key, first, now, "v2").unwrap();

    let mut second = Map::new();
    second.insert("b".into(), json!({"id": 2}));
    store.merge_batch(&key, second, now, "v2").unwrap();

    let batch = store.get(&key).unwrap();
    assert_eq!(batch.batch_member("a"), Some(&json!({"id": 1})));
    assert_eq!(batch.batch_member("b"), Some(&json!({"id": 2})));
  }

  #[test]
  fn test_clear_only_touches_namespace() {
    let backend = Arc::new(MemoryStorage::new());
    backend.set("unrelated", "x").unwrap();
    let store = EntryStore::new(backend.clone());
    store.put(&CacheEnvelope::new("post:a", json!(1), Utc::now(), "v2"));
    store.put(&CacheEnvelope::new("query:abc", json!(2), Utc::now(), "v2"));

    assert_eq!(store.clear("post:"), 1);
    assert_eq!(store.clear(""), 1);
    assert_eq!(backend.get("unrelated").unwrap(), Some("x".to_string()));
  }
}
