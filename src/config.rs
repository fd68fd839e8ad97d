use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::pageviews::types::{Access, Agent};

pub const DEFAULT_ENDPOINT: &str = "https://wikimedia.org/api/rest_v1";

/// The cache always holds at least this many days per series.
pub const MIN_CACHED_DAYS: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

/// Where and how to query the pageview API.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
  #[serde(default = "default_endpoint")]
  pub endpoint: String,
  /// Project domain, e.g. "en.wikipedia.org"
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub access: Access,
  #[serde(default)]
  pub agent: Agent,
  /// Max number of titles looked up per batch (null for unlimited)
  #[serde(default = "default_request_limit")]
  pub request_limit: Option<usize>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      endpoint: default_endpoint(),
      project: String::new(),
      access: Access::default(),
      agent: Agent::default(),
      request_limit: default_request_limit(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Key prefix, in case several instances share one cache
  #[serde(default)]
  pub prefix: String,
  /// Largest number of days callers may request
  #[serde(default = "default_max_days")]
  pub max_days: u32,
  /// SQLite file (default: $XDG_DATA_HOME/pvi/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: String::new(),
      max_days: default_max_days(),
      path: None,
      enabled: true,
    }
  }
}

impl CacheConfig {
  /// Width of every cached series. The upstream is always asked for this
  /// many days so cache keys stay stable.
  pub fn cached_days(&self) -> u32 {
    self.max_days.max(MIN_CACHED_DAYS)
  }
}

fn default_endpoint() -> String {
  DEFAULT_ENDPOINT.to_string()
}

fn default_request_limit() -> Option<usize> {
  Some(5)
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_max_days() -> u32 {
  60
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pvi.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pvi/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pvi/config.yaml\n\
                 with at least `upstream: {{ project: <domain> }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pvi.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pvi").join("config.yaml");
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
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }
}
