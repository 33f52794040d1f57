//! Serde types for the subset of content API fields the reader consumes.
//!
//! Unknown fields are kept in flattened maps so they pass through the cache
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A `{ "rendered": "<html>" }` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rendered {
  #[serde(default)]
  pub rendered: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A post as returned by `/posts` (with `_embed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub id: u64,
  pub slug: String,
  #[serde(default)]
  pub title: Rendered,
  #[serde(default)]
  pub excerpt: Rendered,
  #[serde(default)]
  pub content: Rendered,
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub categories: Vec<u64>,
  #[serde(default)]
  pub tags: Vec<u64>,
  #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
  pub embedded: Option<Embedded>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Post {
  /// Featured image URL, if the media was embedded and readable.
  pub fn featured_image_url(&self) -> Option<&str> {
    self
      .embedded
      .as_ref()?
      .featured_media
      .first()
      .map(|m| m.source_url.as_str())
      .filter(|url| !url.is_empty())
  }

  pub fn author_name(&self) -> Option<&str> {
    self
      .embedded
      .as_ref()?
      .author
      .first()
      .map(|a| a.name.as_str())
      .filter(|name| !name.is_empty())
  }

  /// Embedded terms of the given taxonomy ("category" or "post_tag").
  pub fn terms(&self, taxonomy: &str) -> Vec<&Term> {
    self
      .embedded
      .iter()
      .flat_map(|e| e.terms.iter().flatten())
      .filter(|t| t.taxonomy == taxonomy)
      .collect()
  }
}

/// Related entities expanded by `_embed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedded {
  #[serde(rename = "wp:featuredmedia", default, skip_serializing_if = "Vec::is_empty")]
  pub featured_media: Vec<Media>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub author: Vec<Author>,
  /// One list per taxonomy
  #[serde(rename = "wp:term", default, skip_serializing_if = "Vec::is_empty")]
  pub terms: Vec<Vec<Term>>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Embedded media. All fields default since the API embeds an error object
/// in place of media the client may not read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Media {
  #[serde(default)]
  pub id: u64,
  #[serde(default)]
  pub source_url: String,
  #[serde(default)]
  pub alt_text: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
  #[serde(default)]
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub avatar_urls: BTreeMap<String, String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A category or tag, from `/categories`, `/tags` or `wp:term`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub taxonomy: String,
  #[serde(default)]
  pub count: u64,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One page of posts plus the pagination totals from the response headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPage {
  pub posts: Vec<Post>,
  pub total_pages: u32,
  pub total: u64,
}

/// Error body returned by the content API on non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn sample_post() -> Value {
    json!({
      "id": 42,
      "slug": "hello-world",
      "date": "2024-03-01T10:00:00",
      "title": {"rendered": "Hello &#8211; World"},
      "excerpt": {"rendered": "<p>Short</p>", "protected": false},
      "content": {"rendered": "<p>Long</p>", "protected": false},
      "categories": [3],
      "tags": [7, 8],
      "sticky": false,
      "_embedded": {
        "author": [{"id": 1, "name": "Ada", "slug": "ada", "avatar_urls": {"96": "https://x/a.png"}}],
        "wp:featuredmedia": [{"id": 5, "source_url": "https://x/img.jpg", "alt_text": "cover"}],
        "wp:term": [
          [{"id": 3, "name": "News", "slug": "news", "taxonomy": "category"}],
          [{"id": 7, "name": "Rust", "slug": "rust", "taxonomy": "post_tag"}]
        ],
        "replies": []
      }
    })
  }

  #[test]
  fn test_parses_embedded_post() {
    let post: Post = serde_json::from_value(sample_post()).unwrap();

    assert_eq!(post.id, 42);
    assert_eq!(post.title.rendered, "Hello &#8211; World");
    assert_eq!(post.author_name(), Some("Ada"));
    assert_eq!(post.featured_image_url(), Some("https://x/img.jpg"));
    assert_eq!(post.terms("category")[0].slug, "news");
    assert_eq!(post.terms("post_tag").len(), 1);
  }

  #[test]
  fn test_unknown_fields_pass_through() {
    let post: Post = serde_json::from_value(sample_post()).unwrap();
    let value = serde_json::to_value(&post).unwrap();

    assert_eq!(value["sticky"], json!(false));
    assert_eq!(value["excerpt"]["rendered"], json!("<p>Short</p>"));
    assert_eq!(value["_embedded"]["replies"], json!([]));
    assert_eq!(value["_embedded"]["wp:term"][1][0]["slug"], json!("rust"));
  }

  #[test]
  fn test_forbidden_media_does_not_break_parsing() {
    let mut raw = sample_post();
    raw["_embedded"]["wp:featuredmedia"] =
      json!([{"code": "rest_forbidden", "message": "Sorry", "data": {"status": 401}}]);

    let post: Post = serde_json::from_value(raw).unwrap();
    assert_eq!(post.featured_image_url(), None);
  }

  #[test]
  fn test_minimal_post() {
    let post: Post = serde_json::from_value(json!({"id": 1, "slug": "a"})).unwrap();

    assert!(post.embedded.is_none());
    assert_eq!(post.author_name(), None);
    assert!(post.terms("category").is_empty());
  }
}
