/// Last observed reachability of the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Turns periodic probe results into a "connectivity restored" edge.
#[derive(Debug, Default)]
pub struct ConnectivityMonitor {
  last: Option<Connectivity>,
}

impl ConnectivityMonitor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> Option<Connectivity> {
    self.last
  }

  /// Record a probe result. Returns true only on an offline -> online transition.
  pub fn observe(&mut self, reachable: bool) -> bool {
    let now = if reachable {
      Connectivity::Online
    } else {
      Connectivity::Offline
    };
    let restored = self.last == Some(Connectivity::Offline) && now == Connectivity::Online;
    self.last = Some(now);
    restored
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_first_observation_is_not_a_transition() {
    let mut monitor = ConnectivityMonitor::new();
    assert!(!monitor.observe(true));
    assert_eq!(monitor.current(), Some(Connectivity::Online));
  }

  #[test]
  fn test_restored_fires_once_per_outage() {
    let mut monitor = ConnectivityMonitor::new();
    assert!(!monitor.observe(true));
    assert!(!monitor.observe(false));
    assert!(!monitor.observe(false));
    assert!(monitor.observe(true));
    assert!(!monitor.observe(true));
  }

  #[test]
  fn test_starting_offline() {
    let mut monitor = ConnectivityMonitor::new();
    assert!(!monitor.observe(false));
    assert!(monitor.observe(true));
  }
}
