//! Storage medium trait and its backends.
//!
//! Backends are raw string key/value media. They report failures honestly;
//! absorbing those failures is the job of [`super::store::EntryStore`].

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Trait for cache storage media.
pub trait CacheStorage: Send + Sync {
  /// Read the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

  /// Write `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

  /// Remove every key starting with `prefix`, returning how many were removed.
  fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
    Ok(None) // Always miss
  }

  fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
    Ok(()) // Discard
  }

  fn remove_prefix(&self, _prefix: &str) -> Result<usize, StorageError> {
    Ok(0)
  }
}

/// In-process storage, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored keys starting with `prefix`.
  pub fn count_prefix(&self, prefix: &str) -> usize {
    self
      .entries
      .lock()
      .map(|entries| entries.keys().filter(|k| k.starts_with(prefix)).count())
      .unwrap_or(0)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
    self
      .entries
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
    let mut entries = self.lock()?;
    let before = entries.len();
    entries.retain(|k, _| !k.starts_with(prefix));
    Ok(before - entries.len())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Create a new SQLite storage at `path`, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("wpcache").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
    self
      .conn
      .lock()
      .map_err(|e| StorageError::LockPoisoned(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Serialized envelopes keyed by namespaced logical key
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let conn = self.lock()?;
    let value = conn
      .query_row(
        "SELECT value FROM cache_entries WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO cache_entries (key, value) VALUES (?, ?)",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
    let conn = self.lock()?;
    // substr comparison avoids LIKE wildcards in the prefix
    let removed = conn.execute(
      "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
      params![prefix],
    )?;
    Ok(removed)
  }
}

/// Test backend that fails on demand.
#[cfg(test)]
pub(crate) struct FailingStorage {
  inner: MemoryStorage,
  /// Fail every operation on keys containing this fragment; `None` fails all
  fail_on: Option<String>,
}

#[cfg(test)]
impl FailingStorage {
  pub(crate) fn always() -> Self {
    Self {
      inner: MemoryStorage::new(),
      fail_on: None,
    }
  }

  pub(crate) fn on_keys_containing(fragment: &str) -> Self {
    Self {
      inner: MemoryStorage::new(),
      fail_on: Some(fragment.to_string()),
    }
  }

  pub(crate) fn count_prefix(&self, prefix: &str) -> usize {
    self.inner.count_prefix(prefix)
  }

  fn check(&self, key: &str) -> Result<(), StorageError> {
    match &self.fail_on {
      Some(fragment) if !key.contains(fragment.as_str()) => Ok(()),
      _ => Err(StorageError::Unavailable("quota exceeded".to_string())),
    }
  }
}

#[cfg(test)]
impl CacheStorage for FailingStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    self.check(key)?;
    self.inner.get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.check(key)?;
    self.inner.set(key, value)
  }

  fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
    self.check(prefix)?;
    self.inner.remove_prefix(prefix)
  }
}
