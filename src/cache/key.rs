//! Logical keys addressing cache slots.

use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a cached resource.
///
/// Either derived from an endpoint path plus its query parameters, or from a
/// domain identifier such as `post:<slug>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey(String);

impl LogicalKey {
  /// Key for an endpoint query.
  ///
  /// Parameters are sorted by name (then value) so their order never changes
  /// the key, and the resulting string is hashed for a stable, fixed-length key.
  pub fn query<K, V>(path: &str, params: &[(K, V)]) -> Self
  where
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut pairs: Vec<(&str, &str)> = params
      .iter()
      .map(|(k, v)| (k.as_ref(), v.as_ref()))
      .collect();
    pairs.sort();

    let query = pairs
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join("&");
    let input = format!("{}?{}", path.trim_matches('/'), query);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    Self(format!("query:{}", hex::encode(hasher.finalize())))
  }

  /// Key for a single entity, reachable independent of the list query that
  /// produced it.
  pub fn entity(kind: &str, slug: &str) -> Self {
    Self(format!("{}:{}", kind, slug))
  }

  /// Key for a batch envelope over the given member ids.
  pub fn batch(ids: &[u64]) -> Self {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let list = ids
      .iter()
      .map(u64::to_string)
      .collect::<Vec<_>>()
      .join("-");
    Self(format!("batch:{}", list))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for LogicalKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for LogicalKey {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl From<&str> for LogicalKey {
  fn from(key: &str) -> Self {
    Self(key.to_string())
  }
}

impl From<String> for LogicalKey {
  fn from(key: String) -> Self {
    Self(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_query_key_ignores_param_order() {
    let a = LogicalKey::query("posts", &[("page", "1"), ("per_page", "10")]);
    let b = LogicalKey::query("/posts/", &[("per_page", "10"), ("page", "1")]);

    assert_eq!(a, b);
    assert!(a.as_str().starts_with("query:"));
    assert_eq!(a.as_str().len(), "query:".len() + 64);
  }

  #[test]
  fn test_query_key_differs_by_filter() {
    let a = LogicalKey::query("posts", &[("categories", "3")]);
    let b = LogicalKey::query("posts", &[("categories", "4")]);
    let c = LogicalKey::query("tags", &[("categories", "3")]);

    assert_ne!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn test_entity_and_batch_keys() {
    assert_eq!(LogicalKey::entity("post", "my-slug").as_str(), "post:my-slug");
    assert_eq!(LogicalKey::batch(&[3, 1, 2, 1]).as_str(), "batch:1-2-3");
  }
}
