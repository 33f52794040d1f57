//! Batch prefetcher that primes detail caches from list results.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::envelope::CacheEnvelope;
use super::key::LogicalKey;
use super::store::{EntryStore, PutOutcome};
use super::traits::Cacheable;

/// One entity to prime.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimeEntity {
  pub id: u64,
  pub slug: String,
  pub payload: Value,
}

impl PrimeEntity {
  /// Build from a cacheable entity, or `None` if it cannot be serialized.
  pub fn from_cacheable<T: Cacheable>(entity: &T) -> Option<Self> {
    match serde_json::to_value(entity) {
      Ok(payload) => Some(Self {
        id: entity.entity_id(),
        slug: entity.slug().to_string(),
        payload,
      }),
      Err(e) => {
        warn!(slug = entity.slug(), error = %e, "skipping entity that cannot be serialized");
        None
      }
    }
  }
}

/// What a priming pass managed to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimeSummary {
  /// Individual envelopes written
  pub written: usize,
  /// Individual writes that failed (logged, not raised)
  pub failed: usize,
  /// Whether the batch envelope was written
  pub batch_written: bool,
}

/// Populates per-entity and batch envelopes so that detail reads for items of
/// an already-fetched list are cache hits.
#[derive(Clone)]
pub struct Prefetcher {
  store: EntryStore,
  kind: String,
  schema_version: String,
}

impl Prefetcher {
  /// `kind` is the entity key prefix, e.g. `"post"` for `post:<slug>`.
  pub fn new(store: EntryStore, kind: impl Into<String>, schema_version: impl Into<String>) -> Self {
    Self {
      store,
      kind: kind.into(),
      schema_version: schema_version.into(),
    }
  }

  /// Prime the cache for every entity. Best-effort: failures are logged and
  /// never abort the remaining writes.
  pub fn prime(&self, entities: &[PrimeEntity]) -> PrimeSummary {
    let mut summary = PrimeSummary::default();
    if entities.is_empty() {
      return summary;
    }

    let stored_at = Utc::now();

    for entity in entities {
      let key = LogicalKey::entity(&self.kind, &entity.slug);
      let envelope = CacheEnvelope::new(
        key.as_str(),
        entity.payload.clone(),
        stored_at,
        self.schema_version.as_str(),
      );

      match self.store.try_put(&envelope) {
        Ok(PutOutcome::Written) => summary.written += 1,
        Ok(PutOutcome::RejectedOlder) => {
          debug!(key = %key, "newer entry already cached, not priming")
        }
        Err(e) => {
          warn!(key = %key, error = %e, "failed to prime entity");
          summary.failed += 1;
        }
      }
    }

    let ids: Vec<u64> = entities.iter().map(|e| e.id).collect();
    let batch_key = LogicalKey::batch(&ids);
    let members: Map<String, Value> = entities
      .iter()
      .map(|e| (e.slug.clone(), e.payload.clone()))
      .collect();

    match self
      .store
      .merge_batch(&batch_key, members, stored_at, &self.schema_version)
    {
      Ok(()) => summary.batch_written = true,
      Err(e) => warn!(key = %batch_key, error = %e, "failed to prime batch"),
    }

    debug!(
      written = summary.written,
      failed = summary.failed,
      "primed entity cache"
    );
    summary
  }

  /// Prime from typed entities.
  pub fn prime_all<T: Cacheable>(&self, entities: &[T]) -> PrimeSummary {
    let entities: Vec<PrimeEntity> = entities
      .iter()
      .filter_map(PrimeEntity::from_cacheable)
      .collect();
    self.prime(&entities)
  }
}
