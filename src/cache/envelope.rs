//! Stored payload plus the metadata used to decide whether to trust it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A cached payload with its write timestamp and schema version.
///
/// Serialized as `{ "data": <payload>, "timestamp": <epoch ms>, "version": "<v>" }`.
/// Entries written by the per-post cache use `post` instead of `data`; both
/// are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
  /// Logical key, filled in by the store on read
  #[serde(skip)]
  pub key: String,
  #[serde(rename = "data", alias = "post")]
  pub payload: Value,
  #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
  pub stored_at: DateTime<Utc>,
  #[serde(rename = "version")]
  pub schema_version: String,
}

impl CacheEnvelope {
  pub fn new(
    key: impl Into<String>,
    payload: Value,
    stored_at: DateTime<Utc>,
    schema_version: impl Into<String>,
  ) -> Self {
    Self {
      key: key.into(),
      payload,
      stored_at,
      schema_version: schema_version.into(),
    }
  }

  /// Look up one member of a batch envelope by its slug.
  pub fn batch_member(&self, slug: &str) -> Option<&Value> {
    self.payload.as_object().and_then(|members| members.get(slug))
  }

  /// Members of a batch envelope, empty if the payload is not a mapping.
  pub fn batch_members(&self) -> Map<String, Value> {
    self.payload.as_object().cloned().unwrap_or_default()
  }

  /// Whether `self` was written strictly after `other`, at millisecond
  /// resolution (the precision the envelope is persisted with).
  pub fn is_newer_than(&self, other: &CacheEnvelope) -> bool {
    self.stored_at.timestamp_millis() > other.stored_at.timestamp_millis()
  }
}
