use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application name used for config and data directory paths
const APP_NAME: &str = "nexus-sync";

/// Environment variable that overrides `origin`
const ORIGIN_ENV: &str = "NEXUS_SYNC_ORIGIN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL that asset, shell and probe paths are resolved against
  pub origin: String,
  /// Common prefix of every store name (e.g. "nexusos" -> "nexusos-api-v1")
  pub store_prefix: String,
  /// Generation suffix of the store names. Bumping it retires the old stores on activation.
  pub cache_version: u32,
  /// Path prefixes routed to the API strategies
  pub api_prefixes: Vec<String>,
  /// Application shell assets pre-warmed at install time
  pub static_assets: Vec<String>,
  /// Asset served in place of an uncached top-level navigation while offline
  pub shell_path: String,
  /// Ordered replay priority rules, most urgent first
  pub priorities: Vec<PriorityRule>,
  /// Rank of queued writes that match no rule
  pub default_priority: u32,
  /// Tag a background sync event must carry to drain the queue
  pub sync_tag: String,
  pub background_sync_interval_secs: u64,
  pub connectivity_probe_path: String,
  pub connectivity_probe_interval_secs: u64,
  /// Per-request network timeout. Unset means the HTTP client's default behaviour.
  pub request_timeout_secs: Option<u64>,
  /// Store database location (default: $XDG_DATA_HOME/nexus-sync/stores.db)
  pub database: Option<PathBuf>,
  /// Activate a freshly installed generation without waiting for clients to go away
  pub skip_waiting: bool,
}

/// Substring rule assigning a replay rank to queued writes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PriorityRule {
  pub pattern: String,
  pub rank: u32,
}

impl PriorityRule {
  pub fn new(pattern: &str, rank: u32) -> Self {
    Self {
      pattern: pattern.to_string(),
      rank,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5000".to_string(),
      store_prefix: "nexusos".to_string(),
      cache_version: 1,
      api_prefixes: vec!["/api/".to_string()],
      static_assets: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
        "/static/app.js".to_string(),
        "/static/app.css".to_string(),
      ],
      shell_path: "/".to_string(),
      priorities: default_priority_rules(),
      default_priority: 4,
      sync_tag: "sync-offline-queue".to_string(),
      background_sync_interval_secs: 300,
      connectivity_probe_path: "/api/status".to_string(),
      connectivity_probe_interval_secs: 15,
      request_timeout_secs: None,
      database: None,
      skip_waiting: true,
    }
  }
}

/// Life-critical distribution first, then mesh messaging, then health data.
pub fn default_priority_rules() -> Vec<PriorityRule> {
  vec![
    PriorityRule::new("/api/lifeline", 1),
    PriorityRule::new("/api/distribution/critical", 1),
    PriorityRule::new("/api/mesh/message", 2),
    PriorityRule::new("/api/health", 3),
  ]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./nexus-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/nexus-sync/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("nexus-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
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

  /// Parse a YAML document; omitted fields keep their defaults.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Reject values the coordinator cannot work with.
  pub fn validate(&self) -> Result<()> {
    self.origin_url()?;

    if self.store_prefix.trim().is_empty() {
      return Err(eyre!("store_prefix must not be empty"));
    }

    for prefix in &self.api_prefixes {
      if !prefix.starts_with('/') {
        return Err(eyre!("API prefix '{}' must start with '/'", prefix));
      }
    }

    for asset in self.static_assets.iter().chain(std::iter::once(&self.shell_path)) {
      if !asset.starts_with('/') {
        return Err(eyre!("Asset path '{}' must start with '/'", asset));
      }
    }

    if let Some(rule) = self.priorities.iter().find(|r| r.rank == 0) {
      return Err(eyre!("Priority rank for '{}' must be at least 1", rule.pattern));
    }
    if self.default_priority == 0 {
      return Err(eyre!("default_priority must be at least 1"));
    }

    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve an absolute path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  pub fn shell_url(&self) -> Result<Url> {
    self.resolve(&self.shell_path)
  }

  pub fn asset_urls(&self) -> Result<Vec<Url>> {
    self.static_assets.iter().map(|p| self.resolve(p)).collect()
  }

  pub fn probe_url(&self) -> Result<Url> {
    self.resolve(&self.connectivity_probe_path)
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    self.request_timeout_secs.map(Duration::from_secs)
  }

  pub fn background_sync_interval(&self) -> Duration {
    Duration::from_secs(self.background_sync_interval_secs.max(1))
  }

  pub fn connectivity_probe_interval(&self) -> Duration {
    Duration::from_secs(self.connectivity_probe_interval_secs.max(1))
  }

  /// Location of the store database.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(ref path) = self.database {
      return Ok(path.clone());
    }
    Ok(Self::data_dir()?.join("stores.db"))
  }

  /// Directory for log files.
  pub fn log_dir(&self) -> Result<PathBuf> {
    Ok(Self::data_dir()?.join("logs"))
  }

  fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(APP_NAME))
  }
}
