//! Freshness-aware caching layer over the content API.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Stores payloads in namespaced envelopes carrying a timestamp and schema version
//! - Classifies entries as fresh, stale-but-usable, or expired
//! - Serves stale entries only when the network fails
//! - Collapses concurrent requests for the same key into one network call
//! - Primes per-entity caches from list results

mod envelope;
mod freshness;
mod key;
mod layer;
mod prefetch;
mod storage;
mod store;
mod traits;

pub use envelope::CacheEnvelope;
pub use freshness::{
  classify, Freshness, FreshnessPolicy, DEFAULT_FRESH_TTL_SECS, DEFAULT_STALE_TTL_SECS,
};
pub use key::LogicalKey;
pub use layer::CacheLayer;
pub use prefetch::{PrimeEntity, PrimeSummary, Prefetcher};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use store::{EntryStore, PutOutcome, DEFAULT_NAMESPACE};
pub use traits::{CacheResult, CacheSource, Cacheable};
