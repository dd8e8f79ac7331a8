//! Store naming convention: `<prefix>-<purpose>-v<generation>`.

use crate::config::Config;

const STATIC_PURPOSE: &str = "static";
const API_PURPOSE: &str = "api";
const QUEUE_PURPOSE: &str = "queue";

/// The store names owned by one lifecycle generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNames {
  prefix: String,
  generation: u32,
}

impl StoreNames {
  pub fn new(prefix: &str, generation: u32) -> Self {
    Self {
      prefix: prefix.to_string(),
      generation,
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(&config.store_prefix, config.cache_version)
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }

  fn name(&self, purpose: &str) -> String {
    format!("{}-{}-v{}", self.prefix, purpose, self.generation)
  }

  pub fn static_store(&self) -> String {
    self.name(STATIC_PURPOSE)
  }

  pub fn api_store(&self) -> String {
    self.name(API_PURPOSE)
  }

  pub fn queue_store(&self) -> String {
    self.name(QUEUE_PURPOSE)
  }

  /// Every store name this generation keeps on activation.
  pub fn current(&self) -> [String; 3] {
    [self.static_store(), self.api_store(), self.queue_store()]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current().iter().any(|n| n == name)
  }

  /// Whether `name` is an offline queue store of any generation under our prefix.
  pub fn is_queue_store(&self, name: &str) -> bool {
    self.parse(name).map(|(purpose, _)| purpose) == Some(QUEUE_PURPOSE)
  }

  /// Split one of our store names into purpose and generation.
  fn parse<'a>(&self, name: &'a str) -> Option<(&'a str, u32)> {
    let rest = name.strip_prefix(&self.prefix)?.strip_prefix('-')?;
    let (purpose, version) = rest.rsplit_once("-v")?;
    let generation = version.parse().ok()?;
    Some((purpose, generation))
  }
}
