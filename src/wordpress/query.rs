//! Query parameters for the `/posts` collection.

use crate::error::FetchError;

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Filters and paging for a posts request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
  pub page: u32,
  pub per_page: u32,
  /// Request related-entity expansion (`_embed`)
  pub embed: bool,
  pub categories: Vec<u64>,
  pub tags: Vec<u64>,
  pub exclude: Option<u64>,
  pub search: Option<String>,
  pub slug: Option<String>,
}

impl Default for PostQuery {
  fn default() -> Self {
    Self {
      page: 1,
      per_page: DEFAULT_PER_PAGE,
      embed: true,
      categories: Vec::new(),
      tags: Vec::new(),
      exclude: None,
      search: None,
      slug: None,
    }
  }
}

impl PostQuery {
  pub fn page(mut self, page: u32) -> Self {
    self.page = page;
    self
  }

  pub fn per_page(mut self, per_page: u32) -> Self {
    self.per_page = per_page;
    self
  }

  pub fn embed(mut self, embed: bool) -> Self {
    self.embed = embed;
    self
  }

  pub fn categories(mut self, ids: Vec<u64>) -> Self {
    self.categories = ids;
    self
  }

  pub fn tags(mut self, ids: Vec<u64>) -> Self {
    self.tags = ids;
    self
  }

  pub fn exclude(mut self, id: u64) -> Self {
    self.exclude = Some(id);
    self
  }

  pub fn search(mut self, text: impl Into<String>) -> Self {
    self.search = Some(text.into());
    self
  }

  pub fn slug(mut self, slug: impl Into<String>) -> Self {
    self.slug = Some(slug.into());
    self
  }

  /// Validated wire parameters.
  ///
  /// `per_page` is clamped to `[1, 100]`; a `page` below 1 is rejected.
  /// Empty filters are omitted so they never change the cache key.
  pub fn to_params(&self) -> Result<Vec<(&'static str, String)>, FetchError> {
    if self.page < 1 {
      return Err(FetchError::Validation(format!(
        "page must be at least 1, got {}",
        self.page
      )));
    }

    let mut params = vec![
      ("page", self.page.to_string()),
      ("per_page", self.per_page.clamp(1, MAX_PER_PAGE).to_string()),
    ];
    if self.embed {
      params.push(("_embed", "true".to_string()));
    }
    if !self.categories.is_empty() {
      params.push(("categories", join_ids(&self.categories)));
    }
    if !self.tags.is_empty() {
      params.push(("tags", join_ids(&self.tags)));
    }
    if let Some(id) = self.exclude {
      params.push(("exclude", id.to_string()));
    }
    if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
      params.push(("search", search.to_string()));
    }
    if let Some(slug) = self.slug.as_deref().filter(|s| !s.is_empty()) {
      params.push(("slug", slug.to_string()));
    }

    Ok(params)
  }
}

fn join_ids(ids: &[u64]) -> String {
  ids
    .iter()
    .map(u64::to_string)
    .collect::<Vec<_>>()
    .join(",")
}
