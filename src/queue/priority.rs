use crate::config::{Config, PriorityRule};

/// Ordered substring rules mapping a target URL to a replay rank.
///
/// The first matching rule wins; lower ranks replay first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
  rules: Vec<PriorityRule>,
  default_rank: u32,
}

impl PriorityTable {
  pub fn new(rules: Vec<PriorityRule>, default_rank: u32) -> Self {
    Self {
      rules,
      default_rank,
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.priorities.clone(), config.default_priority)
  }

  pub fn rank_for(&self, url: &str) -> u32 {
    self
      .rules
      .iter()
      .find(|rule| url.contains(&rule.pattern))
      .map(|rule| rule.rank)
      .unwrap_or(self.default_rank)
  }
}

impl Default for PriorityTable {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_table() {
    let table = PriorityTable::default();
    let base = "https://nexus.example";

    assert_eq!(table.rank_for(&format!("{base}/api/lifeline/water")), 1);
    assert_eq!(table.rank_for(&format!("{base}/api/distribution/critical/insulin")), 1);
    assert_eq!(table.rank_for(&format!("{base}/api/mesh/messages")), 2);
    assert_eq!(table.rank_for(&format!("{base}/api/health/vitals")), 3);
    assert_eq!(table.rank_for(&format!("{base}/api/governance/vote")), 4);
  }

  #[test]
  fn test_first_matching_rule_wins() {
    let table = PriorityTable::new(
      vec![PriorityRule::new("/urgent", 1), PriorityRule::new("/api", 3)],
      9,
    );

    assert_eq!(table.rank_for("http://h/api/urgent"), 1);
    assert_eq!(table.rank_for("http://h/api/other"), 3);
    assert_eq!(table.rank_for("http://h/static"), 9);
  }
}
