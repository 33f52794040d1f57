//! Error types shared by the cache layer and the content API client.

/// Errors surfaced to callers of the cached read path.
///
/// `Clone` so a single in-flight result can be handed to every caller that
/// joined the same request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// Lookup by slug/category/tag returned an empty result set
  #[error("{0} not found")]
  NotFound(String),
  /// Transport or HTTP failure with no usable stale fallback
  #[error("network error: {0}")]
  Network(String),
  /// Caller supplied an out-of-range parameter
  #[error("invalid parameter: {0}")]
  Validation(String),
  /// Payload could not be converted into the requested type
  #[error("failed to decode payload: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      FetchError::Decode(err.to_string())
    } else {
      FetchError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(err: serde_json::Error) -> Self {
    FetchError::Decode(err.to_string())
  }
}

/// Failures of the underlying storage medium.
///
/// Never crosses the entry store boundary: the store logs these and degrades
/// to a cache miss.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("storage unavailable: {0}")]
  Unavailable(String),
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("corrupt entry {key}: {reason}")]
  Corrupt { key: String, reason: String },
  #[error("lock poisoned: {0}")]
  LockPoisoned(String),
}
