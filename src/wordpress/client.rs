use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::FetchError;

use super::query::{PostQuery, MAX_PER_PAGE};
use super::types::{ApiErrorBody, Post, PostPage, Term};

const TOTAL_HEADER: &str = "x-wp-total";
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

/// Content API client
#[derive(Clone)]
pub struct WordPressClient {
  http: reqwest::Client,
  base_url: Url,
}

impl WordPressClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_base_url(
      &config.api_url,
      Duration::from_secs(config.request_timeout_secs),
    )
  }

  pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
    // Url::join replaces the last segment unless the base ends with '/'
    let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("wpcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  /// Absolute URL for an endpoint path such as `posts`.
  pub fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| FetchError::Validation(format!("invalid endpoint {}: {}", path, e)))
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    params: &[(&str, String)],
  ) -> Result<(T, HeaderMap), FetchError> {
    let url = self.endpoint(path)?;
    debug!(%url, ?params, "GET");

    let response = self.http.get(url).query(params).send().await?;
    let status = response.status();
    if !status.is_success() {
      let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .filter(|body| !body.message.is_empty())
        .map(|body| format!("{} ({})", body.message, body.code))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
      return Err(status_error(path, status, message));
    }

    let headers = response.headers().clone();
    let body = response.json::<T>().await?;
    Ok((body, headers))
  }

  /// Fetch one page of posts
  pub async fn posts(&self, query: &PostQuery) -> Result<PostPage, FetchError> {
    let params = query.to_params()?;
    let (posts, headers) = self.get_json::<Vec<Post>>("posts", &params).await?;
    let (total, total_pages) = page_totals(&headers);

    Ok(PostPage {
      posts,
      total_pages,
      total,
    })
  }

  /// Get a single post by slug
  pub async fn post_by_slug(&self, slug: &str) -> Result<Post, FetchError> {
    let query = PostQuery::default().slug(slug).per_page(1);
    let (posts, _) = self
      .get_json::<Vec<Post>>("posts", &query.to_params()?)
      .await?;

    posts
      .into_iter()
      .next()
      .ok_or_else(|| FetchError::NotFound(format!("post \"{}\"", slug)))
  }

  /// Get all categories
  pub async fn categories(&self) -> Result<Vec<Term>, FetchError> {
    self.terms("categories").await
  }

  /// Get all tags
  pub async fn tags(&self) -> Result<Vec<Term>, FetchError> {
    self.terms("tags").await
  }

  async fn terms(&self, path: &str) -> Result<Vec<Term>, FetchError> {
    let (terms, _) = self
      .get_json::<Vec<Term>>(path, &[("per_page", MAX_PER_PAGE.to_string())])
      .await?;
    Ok(terms)
  }

  pub async fn category_by_slug(&self, slug: &str) -> Result<Term, FetchError> {
    self.term_by_slug("categories", "category", slug).await
  }

  pub async fn tag_by_slug(&self, slug: &str) -> Result<Term, FetchError> {
    self.term_by_slug("tags", "tag", slug).await
  }

  async fn term_by_slug(&self, path: &str, label: &str, slug: &str) -> Result<Term, FetchError> {
    let params = [("slug", slug.to_string()), ("per_page", "1".to_string())];
    let (terms, _) = self.get_json::<Vec<Term>>(path, &params).await?;

    terms
      .into_iter()
      .next()
      .ok_or_else(|| FetchError::NotFound(format!("{} \"{}\"", label, slug)))
  }
}

/// Map an unsuccessful response to the error callers act on.
///
/// Only server-side and throttling failures are `Network`, so only those may
/// fall back to a stale entry.
fn status_error(path: &str, status: StatusCode, message: String) -> FetchError {
  match status {
    StatusCode::NOT_FOUND | StatusCode::GONE => {
      FetchError::NotFound(format!("{} ({})", path, message))
    }
    StatusCode::BAD_REQUEST => FetchError::Validation(message),
    _ => FetchError::Network(format!("HTTP {}: {}", status.as_u16(), message)),
  }
}

/// Pagination totals from the response headers: `(total, total_pages)`.
///
/// Missing or unparseable headers default to `total = 0`, `total_pages = 1`.
pub fn page_totals(headers: &HeaderMap) -> (u64, u32) {
  let read = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.trim().parse::<u64>().ok())
  };

  let total = read(TOTAL_HEADER).unwrap_or(0);
  let total_pages = read(TOTAL_PAGES_HEADER)
    .and_then(|v| u32::try_from(v).ok())
    .unwrap_or(1);
  (total, total_pages)
}


/// Minimal HTTP responder for exercising status handling.
#[cfg(test)]
pub(crate) mod test_server {
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  /// Answer every request with `status` and a JSON `body`; returns the API base URL.
  pub async fn respond_with(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      while let Ok((mut socket, _)) = listener.accept().await {
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let response = format!(
          "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
          status,
          body.len(),
          body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
      }
    });

    format!("http://{}/wp-json/wp/v2", addr)
  }
}
