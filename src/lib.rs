//! Freshness-aware caching reader for WordPress-compatible content APIs.
//!
//! The [`cache`] module holds the API-agnostic caching layer; [`wordpress`]
//! binds it to the content API wire contract.

pub mod cache;
pub mod config;
pub mod error;
pub mod loading;
pub mod query;
pub mod wordpress;

pub use error::{FetchError, StorageError};
pub use loading::{LoadingGuard, LoadingSignal};
pub use query::{QueryOptions, ReadHook, ReadState};
