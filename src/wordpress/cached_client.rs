//! Cached content API client that wraps WordPressClient with transparent caching.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{
  CacheLayer, CacheResult, CacheStorage, Cacheable, EntryStore, FreshnessPolicy, NoopStorage,
  Prefetcher, SqliteStorage,
};
use crate::config::Config;
use crate::error::FetchError;
use crate::loading::LoadingSignal;

use super::cache::ContentQueryKey;
use super::client::WordPressClient;
use super::query::PostQuery;
use super::types::{Post, PostPage, Term};

/// Upper bound for related post lookups.
const MAX_RELATED: u32 = 10;

/// Content API client with transparent caching support.
///
/// This wraps the underlying WordPressClient and provides the same API,
/// but serves fresh entries from the cache, falls back to stale entries when
/// the network fails, and primes post detail caches from list results.
#[derive(Clone)]
pub struct CachedWordPressClient {
  inner: WordPressClient,
  cache: CacheLayer,
  prefetcher: Prefetcher,
}

impl CachedWordPressClient {
  /// Create a new cached client, opening the configured storage medium.
  ///
  /// A medium that cannot be opened disables caching instead of failing.
  pub fn new(config: &Config, loading: LoadingSignal) -> Result<Self> {
    let inner = WordPressClient::new(config)?;

    let backend: Arc<dyn CacheStorage> = if config.cache.enabled {
      match config.cache.db_path().and_then(|path| SqliteStorage::open_at(&path)) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
          warn!(error = %e, "cache storage unavailable, continuing without cache");
          Arc::new(NoopStorage)
        }
      }
    } else {
      Arc::new(NoopStorage)
    };
    let store = EntryStore::with_namespace(backend, config.cache.namespace.clone());

    Ok(Self::from_parts(inner, store, config.cache.policy()?, loading))
  }

  pub fn from_parts(
    inner: WordPressClient,
    store: EntryStore,
    policy: FreshnessPolicy,
    loading: LoadingSignal,
  ) -> Self {
    let prefetcher = Prefetcher::new(
      store.clone(),
      Post::entity_kind(),
      policy.schema_version.clone(),
    );
    let cache = CacheLayer::new(store, policy, loading);

    Self {
      inner,
      cache,
      prefetcher,
    }
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  async fn cached<T, F, Fut>(&self, query: ContentQueryKey, fetch: F) -> Result<CacheResult<T>, FetchError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce(WordPressClient) -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let key = query.logical_key()?;
    debug!(key = %key, query = %query.description(), "resolving");

    let inner = self.inner.clone();
    self.cache.resolve_as(&key, move || fetch(inner)).await
  }

  /// Get a page of posts. Posts fetched from the network prime the per-post cache.
  pub async fn posts(&self, query: &PostQuery) -> Result<CacheResult<PostPage>, FetchError> {
    let prefetcher = self.prefetcher.clone();
    let wire_query = query.clone();

    self
      .cached(ContentQueryKey::Posts(query.clone()), move |inner| async move {
        let page = inner.posts(&wire_query).await?;
        prefetcher.prime_all(&page.posts);
        Ok(page)
      })
      .await
  }

  /// Get a single post by slug.
  pub async fn post(&self, slug: &str) -> Result<CacheResult<Post>, FetchError> {
    let slug = require_slug(slug, "post")?;

    let query = ContentQueryKey::Post { slug: slug.clone() };
    self
      .cached(query, move |inner| async move { inner.post_by_slug(&slug).await })
      .await
  }

  /// Get all categories.
  pub async fn categories(&self) -> Result<CacheResult<Vec<Term>>, FetchError> {
    self
      .cached(ContentQueryKey::Categories, |inner| async move {
        inner.categories().await
      })
      .await
  }

  /// Get all tags.
  pub async fn tags(&self) -> Result<CacheResult<Vec<Term>>, FetchError> {
    self
      .cached(ContentQueryKey::Tags, |inner| async move { inner.tags().await })
      .await
  }

  pub async fn category_by_slug(&self, slug: &str) -> Result<CacheResult<Term>, FetchError> {
    let slug = require_slug(slug, "category")?;

    let query = ContentQueryKey::CategoryBySlug { slug: slug.clone() };
    self
      .cached(query, move |inner| async move {
        inner.category_by_slug(&slug).await
      })
      .await
  }

  pub async fn tag_by_slug(&self, slug: &str) -> Result<CacheResult<Term>, FetchError> {
    let slug = require_slug(slug, "tag")?;

    let query = ContentQueryKey::TagBySlug { slug: slug.clone() };
    self
      .cached(query, move |inner| async move { inner.tag_by_slug(&slug).await })
      .await
  }

  /// Get posts in the category with the given slug.
  pub async fn posts_by_category(
    &self,
    slug: &str,
    page: u32,
    per_page: u32,
  ) -> Result<CacheResult<PostPage>, FetchError> {
    let category = self.category_by_slug(slug).await?;
    let query = PostQuery::default()
      .categories(vec![category.data.id])
      .page(page)
      .per_page(per_page);
    self.posts(&query).await
  }

  /// Get posts with the tag with the given slug.
  pub async fn posts_by_tag(
    &self,
    slug: &str,
    page: u32,
    per_page: u32,
  ) -> Result<CacheResult<PostPage>, FetchError> {
    let tag = self.tag_by_slug(slug).await?;
    let query = PostQuery::default()
      .tags(vec![tag.data.id])
      .page(page)
      .per_page(per_page);
    self.posts(&query).await
  }

  /// Full-text search over posts.
  pub async fn search(
    &self,
    text: &str,
    page: u32,
    per_page: u32,
  ) -> Result<CacheResult<PostPage>, FetchError> {
    let query = PostQuery::default().search(text).page(page).per_page(per_page);
    self.posts(&query).await
  }

  /// Posts related to `post_id`: same categories first, topped up by shared
  /// tags, else the most recent posts. Best-effort: failures yield an empty list.
  pub async fn related_posts(
    &self,
    post_id: u64,
    category_ids: &[u64],
    tag_ids: &[u64],
    limit: u32,
  ) -> Vec<Post> {
    let limit = limit.clamp(1, MAX_RELATED);

    match self.try_related_posts(post_id, category_ids, tag_ids, limit).await {
      Ok(posts) => posts,
      Err(e) => {
        warn!(post_id, error = %e, "failed to load related posts");
        Vec::new()
      }
    }
  }

  async fn try_related_posts(
    &self,
    post_id: u64,
    category_ids: &[u64],
    tag_ids: &[u64],
    limit: u32,
  ) -> Result<Vec<Post>, FetchError> {
    let base = PostQuery::default().exclude(post_id);

    if category_ids.is_empty() && tag_ids.is_empty() {
      let recent = self.posts(&base.per_page(limit)).await?;
      return Ok(recent.data.posts);
    }

    let mut related = Vec::new();
    if !category_ids.is_empty() {
      let query = base.clone().categories(category_ids.to_vec()).per_page(limit);
      related = self.posts(&query).await?.data.posts;
    }

    let wanted = limit as usize;
    if related.len() < wanted && !tag_ids.is_empty() {
      let remaining = (wanted - related.len()) as u32;
      let query = base.tags(tag_ids.to_vec()).per_page(remaining);
      related.extend(self.posts(&query).await?.data.posts);
    }

    Ok(dedup_posts(related, wanted))
  }

  /// Remove every cached entry under the configured namespace.
  pub fn clear_cache(&self) -> usize {
    self.cache.store().clear("")
  }
}

fn require_slug(slug: &str, what: &str) -> Result<String, FetchError> {
  let slug = slug.trim();
  if slug.is_empty() {
    return Err(FetchError::Validation(format!("{} slug is required", what)));
  }
  Ok(slug.to_string())
}

/// Drop repeated posts (by id), keeping order, up to `limit`.
fn dedup_posts(posts: Vec<Post>, limit: usize) -> Vec<Post> {
  let mut seen = HashSet::new();
  posts
    .into_iter()
    .filter(|p| seen.insert(p.id))
    .take(limit)
    .collect()
}
