//! Freshness classification for cached envelopes.
//!
//! Pure logic: no clock reads, no I/O. Callers pass `now` explicitly.

use chrono::{DateTime, Duration, Utc};

use super::envelope::CacheEnvelope;

/// Default window (seconds) during which an entry is served without a network call.
pub const DEFAULT_FRESH_TTL_SECS: i64 = 60 * 60;

/// Default window (seconds) during which an entry may be served after a network failure.
pub const DEFAULT_STALE_TTL_SECS: i64 = 24 * 60 * 60;

/// Classification of a cached envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// Version matches and `age < fresh_ttl`
  Fresh,
  /// Version matches and `fresh_ttl <= age < stale_ttl`; only usable as a
  /// fallback when the network fails
  Stale,
  /// Too old or written under another schema version; treat as absent
  Expired,
}

impl Freshness {
  /// Whether the entry may be served at all (fresh hit or stale fallback).
  pub fn is_usable(self) -> bool {
    !matches!(self, Freshness::Expired)
  }
}

/// Classify an envelope.
///
/// A schema version mismatch is always `Expired`, regardless of age. An entry
/// stamped in the future (clock skew) counts as age zero.
pub fn classify(
  envelope: &CacheEnvelope,
  now: DateTime<Utc>,
  current_version: &str,
  fresh_ttl: Duration,
  stale_ttl: Duration,
) -> Freshness {
  if envelope.schema_version != current_version {
    return Freshness::Expired;
  }

  let age = (now - envelope.stored_at).max(Duration::zero());
  if age < fresh_ttl {
    Freshness::Fresh
  } else if age < stale_ttl {
    Freshness::Stale
  } else {
    Freshness::Expired
  }
}

/// The TTL pair and schema version the cache layer classifies against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessPolicy {
  pub fresh_ttl: Duration,
  pub stale_ttl: Duration,
  pub schema_version: String,
}

impl FreshnessPolicy {
  pub fn new(schema_version: impl Into<String>) -> Self {
    Self {
      fresh_ttl: Duration::seconds(DEFAULT_FRESH_TTL_SECS),
      stale_ttl: Duration::seconds(DEFAULT_STALE_TTL_SECS),
      schema_version: schema_version.into(),
    }
  }

  /// Set both windows. `stale_ttl` is raised to `fresh_ttl` if smaller, which
  /// leaves no stale window at all.
  pub fn with_ttls(mut self, fresh_ttl: Duration, stale_ttl: Duration) -> Self {
    self.fresh_ttl = fresh_ttl;
    self.stale_ttl = stale_ttl.max(fresh_ttl);
    self
  }

  pub fn classify(&self, envelope: &CacheEnvelope, now: DateTime<Utc>) -> Freshness {
    classify(
      envelope,
      now,
      &self.schema_version,
      self.fresh_ttl,
      self.stale_ttl,
    )
  }
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self::new("v2")
  }
}
