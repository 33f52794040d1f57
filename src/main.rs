use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use wpcache::cache::CacheResult;
use wpcache::config::Config;
use wpcache::wordpress::{CachedWordPressClient, Post, PostPage, PostQuery, Term, DEFAULT_PER_PAGE};
use wpcache::LoadingSignal;

#[derive(Parser, Debug)]
#[command(name = "wpcache")]
#[command(about = "Read a WordPress site through a freshness-aware local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/wpcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Content API base URL, e.g. https://example.com/wp-json/wp/v2
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List posts
  Posts {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,
    /// Full-text search
    #[arg(long)]
    search: Option<String>,
    /// Category slug
    #[arg(long, conflicts_with = "tag")]
    category: Option<String>,
    /// Tag slug
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show a single post
  Post { slug: String },
  /// Show posts related to a post
  Related {
    slug: String,
    #[arg(long, default_value_t = 3)]
    limit: u32,
  },
  /// List categories
  Categories,
  /// List tags
  Tags,
  /// Remove every cached entry
  ClearCache,
}

/// Log to a daily file so stdout stays clean for output.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("wpcache")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "wpcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("WPCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_logging()?;

  let args = Args::parse();

  // Load configuration, command line URL wins over file and environment
  let config = Config::load(args.config.as_deref())?.with_api_url(args.api_url);
  config.validate()?;
  info!(api_url = %config.api_url, cache_enabled = config.cache.enabled, "starting");

  let loading = LoadingSignal::new();
  spawn_loading_indicator(&loading);

  let client = CachedWordPressClient::new(&config, loading)?;
  run(&client, args.command).await
}

/// Show a progress line on stderr while any request is in flight.
fn spawn_loading_indicator(loading: &LoadingSignal) {
  let mut rx = loading.subscribe();
  tokio::spawn(async move {
    while rx.changed().await.is_ok() {
      let is_loading = *rx.borrow_and_update();
      debug!(is_loading, "loading state changed");
      if is_loading {
        eprintln!("loading...");
      }
    }
  });
}

async fn run(client: &CachedWordPressClient, command: Command) -> Result<()> {
  match command {
    Command::Posts {
      page,
      per_page,
      search,
      category,
      tag,
    } => {
      let result = match (category, tag, search) {
        (Some(category), _, _) => client.posts_by_category(&category, page, per_page).await?,
        (None, Some(tag), _) => client.posts_by_tag(&tag, page, per_page).await?,
        (None, None, Some(search)) => client.search(&search, page, per_page).await?,
        (None, None, None) => {
          let query = PostQuery::default().page(page).per_page(per_page);
          client.posts(&query).await?
        }
      };
      print_page(&result);
    }
    Command::Post { slug } => {
      let result = client.post(&slug).await?;
      print_post(&result);
    }
    Command::Related { slug, limit } => {
      let post = client.post(&slug).await?.data;
      let related = client
        .related_posts(post.id, &post.categories, &post.tags, limit)
        .await;
      for post in &related {
        print_post_line(post);
      }
    }
    Command::Categories => print_terms(&client.categories().await?),
    Command::Tags => print_terms(&client.tags().await?),
    Command::ClearCache => {
      let removed = client.clear_cache();
      println!("removed {} cached entries", removed);
    }
  }

  Ok(())
}

fn stale_marker<T>(result: &CacheResult<T>) -> &'static str {
  if result.is_stale() {
    " (stale)"
  } else {
    ""
  }
}

fn print_page(result: &CacheResult<PostPage>) {
  let page = &result.data;
  println!(
    "{} posts, {} pages{}",
    page.total,
    page.total_pages,
    stale_marker(result)
  );
  for post in &page.posts {
    print_post_line(post);
  }
}

fn print_post_line(post: &Post) {
  println!("{:>6}  {:<40}  {}", post.id, post.slug, post.title.rendered);
}

fn print_post(result: &CacheResult<Post>) {
  let post = &result.data;
  println!("{}{}", post.title.rendered, stale_marker(result));
  println!("{}", post.date);
  if let Some(author) = post.author_name() {
    println!("by {}", author);
  }
  if let Some(image) = post.featured_image_url() {
    println!("image: {}", image);
  }
  let categories: Vec<&str> = post
    .terms("category")
    .into_iter()
    .map(|t| t.name.as_str())
    .collect();
  if !categories.is_empty() {
    println!("categories: {}", categories.join(", "));
  }
  println!();
  println!("{}", post.content.rendered);
}

fn print_terms(result: &CacheResult<Vec<Term>>) {
  if result.is_stale() {
    println!("(stale)");
  }
  for term in &result.data {
    println!("{:>6}  {:<30}  {} ({})", term.id, term.slug, term.name, term.count);
  }
}
