//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for entities that can be primed into the entity cache.
///
/// Implementors provide the numeric id used for batch keys and the slug used
/// for the per-entity key.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Numeric identifier assigned by the content API
  fn entity_id(&self) -> u64;

  /// Human-meaningful secondary key (e.g. a post slug)
  fn slug(&self) -> &str;

  /// Entity kind used as the key prefix (e.g. "post")
  fn entity_kind() -> &'static str;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was stored (if from cache)
  pub stored_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      stored_at: None,
    }
  }

  /// Create a new cache result from a fresh cache hit.
  pub fn from_cache(data: T, stored_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      stored_at: Some(stored_at),
    }
  }

  /// Create a degraded result served after a network failure.
  pub fn stale(data: T, stored_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Stale,
      stored_at: Some(stored_at),
    }
  }

  /// Whether this is a degraded result the caller may want to flag.
  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::Stale
  }

  /// Transform the payload, keeping source metadata.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      stored_at: self.stored_at,
    }
  }

  /// Fallible version of [`CacheResult::map`].
  pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<CacheResult<U>, E> {
    Ok(CacheResult {
      data: f(self.data)?,
      source: self.source,
      stored_at: self.stored_at,
    })
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, within the fresh window
  Cache,
  /// Network failed, serving an entry from the stale window
  Stale,
}
