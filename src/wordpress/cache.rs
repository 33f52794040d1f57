//! Caching implementations for content API types.

use crate::cache::{Cacheable, LogicalKey};
use crate::error::FetchError;

use super::query::{PostQuery, MAX_PER_PAGE};
use super::types::Post;

impl Cacheable for Post {
  fn entity_id(&self) -> u64 {
    self.id
  }

  fn slug(&self) -> &str {
    &self.slug
  }

  fn entity_kind() -> &'static str {
    "post"
  }
}

/// Query key types for content API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentQueryKey {
  /// A page of posts with filters
  Posts(PostQuery),
  /// A single post, addressed by slug independent of any list query
  Post { slug: String },
  /// All categories
  Categories,
  /// All tags
  Tags,
  /// A category looked up by slug
  CategoryBySlug { slug: String },
  /// A tag looked up by slug
  TagBySlug { slug: String },
}

impl ContentQueryKey {
  /// Logical cache key, derived from the endpoint and its wire parameters.
  pub fn logical_key(&self) -> Result<LogicalKey, FetchError> {
    let key = match self {
      Self::Posts(query) => LogicalKey::query("posts", &query.to_params()?),
      Self::Post { slug } => LogicalKey::entity(Post::entity_kind(), slug),
      Self::Categories => LogicalKey::query("categories", &[("per_page", MAX_PER_PAGE.to_string())]),
      Self::Tags => LogicalKey::query("tags", &[("per_page", MAX_PER_PAGE.to_string())]),
      Self::CategoryBySlug { slug } => LogicalKey::query("categories", &term_lookup(slug)),
      Self::TagBySlug { slug } => LogicalKey::query("tags", &term_lookup(slug)),
    };
    Ok(key)
  }

  pub fn description(&self) -> String {
    match self {
      Self::Posts(query) => match (&query.search, query.categories.is_empty(), query.tags.is_empty()) {
        (Some(search), _, _) => format!("posts matching \"{}\" (page {})", search, query.page),
        (None, false, _) => format!("posts in categories {:?} (page {})", query.categories, query.page),
        (None, true, false) => format!("posts tagged {:?} (page {})", query.tags, query.page),
        (None, true, true) => format!("posts (page {})", query.page),
      },
      Self::Post { slug } => format!("post {}", slug),
      Self::Categories => "all categories".to_string(),
      Self::Tags => "all tags".to_string(),
      Self::CategoryBySlug { slug } => format!("category {}", slug),
      Self::TagBySlug { slug } => format!("tag {}", slug),
    }
  }
}

fn term_lookup(slug: &str) -> [(&'static str, String); 2] {
  [("slug", slug.to_string()), ("per_page", "1".to_string())]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_post_key_is_entity_key() {
    let key = ContentQueryKey::Post {
      slug: "my-slug".into(),
    };
    assert_eq!(key.logical_key().unwrap().as_str(), "post:my-slug");
  }

  #[test]
  fn test_post_queries_with_different_filters_never_collide() {
    let plain = ContentQueryKey::Posts(PostQuery::default());
    let category = ContentQueryKey::Posts(PostQuery::default().categories(vec![3]));
    let page_two = ContentQueryKey::Posts(PostQuery::default().page(2));

    let keys = [
      plain.logical_key().unwrap(),
      category.logical_key().unwrap(),
      page_two.logical_key().unwrap(),
    ];
    assert_ne!(keys[0], keys[1]);
    assert_ne!(keys[0], keys[2]);
    assert_ne!(keys[1], keys[2]);
  }

  #[test]
  fn test_clamped_per_page_shares_key() {
    let a = ContentQueryKey::Posts(PostQuery::default().per_page(100));
    let b = ContentQueryKey::Posts(PostQuery::default().per_page(250));
    assert_eq!(a.logical_key().unwrap(), b.logical_key().unwrap());
  }

  #[test]
  fn test_invalid_query_has_no_key() {
    let key = ContentQueryKey::Posts(PostQuery::default().page(0));
    assert!(matches!(key.logical_key(), Err(FetchError::Validation(_))));
  }

  #[test]
  fn test_description() {
    let key = ContentQueryKey::Posts(PostQuery::default().search("rust"));
    assert_eq!(key.description(), "posts matching \"rust\" (page 1)");
    assert_eq!(ContentQueryKey::Tags.description(), "all tags");
  }
}
