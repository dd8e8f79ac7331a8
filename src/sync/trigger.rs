use std::fmt;

/// What asked for a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrigger {
  /// Scheduled background sync carrying a registration tag
  BackgroundSync { tag: String },
  /// Network came back after being unreachable
  ConnectivityRestored,
  /// Explicit request from a client context
  Manual,
}

impl fmt::Display for SyncTrigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SyncTrigger::BackgroundSync { tag } => write!(f, "background sync ({})", tag),
      SyncTrigger::ConnectivityRestored => write!(f, "connectivity restored"),
      SyncTrigger::Manual => write!(f, "manual"),
    }
  }
}
