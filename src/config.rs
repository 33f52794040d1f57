use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::{
  FreshnessPolicy, SqliteStorage, DEFAULT_FRESH_TTL_SECS, DEFAULT_NAMESPACE,
  DEFAULT_STALE_TTL_SECS,
};

/// Environment variable overriding `api_url`.
pub const API_URL_ENV: &str = "WPCACHE_API_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Content API base, e.g. `https://example.com/wp-json/wp/v2`
  #[serde(default)]
  pub api_url: String,
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, every read goes to the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_fresh_ttl")]
  pub fresh_ttl_secs: i64,
  #[serde(default = "default_stale_ttl")]
  pub stale_ttl_secs: i64,
  /// Bump to invalidate every stored entry without clearing the cache
  #[serde(default = "default_schema_version")]
  pub schema_version: String,
  #[serde(default = "default_namespace")]
  pub namespace: String,
  /// SQLite file (default: $XDG_DATA_HOME/wpcache/cache.db)
  pub path: Option<PathBuf>,
}

fn default_request_timeout() -> u64 {
  15
}

fn default_true() -> bool {
  true
}

fn default_fresh_ttl() -> i64 {
  DEFAULT_FRESH_TTL_SECS
}

fn default_stale_ttl() -> i64 {
  DEFAULT_STALE_TTL_SECS
}

fn default_schema_version() -> String {
  "v2".to_string()
}

fn default_namespace() -> String {
  DEFAULT_NAMESPACE.to_string()
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      fresh_ttl_secs: default_fresh_ttl(),
      stale_ttl_secs: default_stale_ttl(),
      schema_version: default_schema_version(),
      namespace: default_namespace(),
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn policy(&self) -> Result<FreshnessPolicy> {
    let fresh_ttl = ttl("fresh_ttl_secs", self.fresh_ttl_secs)?;
    let stale_ttl = ttl("stale_ttl_secs", self.stale_ttl_secs)?;
    Ok(FreshnessPolicy::new(self.schema_version.clone()).with_ttls(fresh_ttl, stale_ttl))
  }

  /// Resolved SQLite path.
  pub fn db_path(&self) -> Result<PathBuf> {
    match &self.path {
      Some(path) => Ok(path.clone()),
      None => SqliteStorage::default_path(),
    }
  }
}

fn ttl(field: &str, secs: i64) -> Result<Duration> {
  Duration::try_seconds(secs).ok_or_else(|| eyre!("cache.{} ({}) is out of range", field, secs))
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: String::new(),
      request_timeout_secs: default_request_timeout(),
      cache: CacheConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./wpcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/wpcache/config.yaml
  ///
  /// Without a file, defaults are used. `WPCACHE_API_URL` overrides `api_url`
  /// either way. Call [`Config::validate`] once all overrides are applied.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    Ok(config.with_api_url(std::env::var(API_URL_ENV).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("wpcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("wpcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Replace `api_url` when an override is given.
  pub fn with_api_url(self, api_url: Option<String>) -> Self {
    match api_url.filter(|url| !url.trim().is_empty()) {
      Some(api_url) => Config { api_url, ..self },
      None => self,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.api_url.trim().is_empty() {
      return Err(eyre!(
        "No content API URL configured. Set api_url in ~/.config/wpcache/config.yaml \
         or the {} environment variable.",
        API_URL_ENV
      ));
    }
    if self.cache.fresh_ttl_secs <= 0 {
      return Err(eyre!("cache.fresh_ttl_secs must be positive"));
    }
    if self.cache.stale_ttl_secs <= self.cache.fresh_ttl_secs {
      return Err(eyre!(
        "cache.stale_ttl_secs ({}) must be greater than cache.fresh_ttl_secs ({})",
        self.cache.stale_ttl_secs,
        self.cache.fresh_ttl_secs
      ));
    }
    self.cache.policy()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_yaml_uses_defaults() {
    let config = Config::from_yaml("api_url: https://example.com/wp-json/wp/v2\n").unwrap();

    assert_eq!(config.request_timeout_secs, 15);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.fresh_ttl_secs, 3600);
    assert_eq!(config.cache.stale_ttl_secs, 86_400);
    assert_eq!(config.cache.schema_version, "v2");
    assert_eq!(config.cache.namespace, "wp_cache_");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_cache_section() {
    let yaml = r#"
api_url: https://example.com/wp-json/wp/v2
cache:
  enabled: false
  fresh_ttl_secs: 60
  stale_ttl_secs: 600
  schema_version: v3
  path: /tmp/wpcache-test.db
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let policy = config.cache.policy().unwrap();

    assert!(!config.cache.enabled);
    assert_eq!(policy.fresh_ttl, Duration::seconds(60));
    assert_eq!(policy.stale_ttl, Duration::seconds(600));
    assert_eq!(policy.schema_version, "v3");
    assert_eq!(
      config.cache.db_path().unwrap(),
      PathBuf::from("/tmp/wpcache-test.db")
    );
  }

  #[test]
  fn test_validation() {
    assert!(Config::default().validate().is_err());

    let config = Config::default().with_api_url(Some("https://x/wp-json/wp/v2".into()));
    assert!(config.validate().is_ok());

    let mut bad_ttls = config.clone();
    bad_ttls.cache.stale_ttl_secs = bad_ttls.cache.fresh_ttl_secs;
    assert!(bad_ttls.validate().is_err());
  }

  #[test]
  fn test_oversized_ttl_is_rejected() {
    let mut config = Config::default().with_api_url(Some("https://x/wp-json/wp/v2".into()));
    config.cache.stale_ttl_secs = i64::MAX;

    assert!(config.validate().is_err());
    assert!(config.cache.policy().is_err());
  }

  #[test]
  fn test_blank_override_is_ignored() {
    let config = Config::from_yaml("api_url: https://a\n")
      .unwrap()
      .with_api_url(Some("  ".into()));
    assert_eq!(config.api_url, "https://a");
  }
}
