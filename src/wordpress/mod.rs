//! Content API (WordPress REST) client and its cached wrapper.

mod cache;
mod cached_client;
mod client;
mod query;
mod types;

pub use cache::ContentQueryKey;
pub use cached_client::CachedWordPressClient;
pub use client::{page_totals, WordPressClient};
pub use query::{PostQuery, DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use types::{Author, Embedded, Media, Post, PostPage, Rendered, Term};
