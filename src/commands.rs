//! Commands a client context can send to the coordinator.

use serde::Serialize;

use crate::queue::{DrainReport, QueueStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
  /// Drain the offline queue now and report the outcome
  SyncNow,
  /// Report what is still waiting for delivery
  QueueStatus,
}

/// Reply to a [`ClientCommand`], serialized untagged so clients see the bare payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientReply {
  Synced(DrainReport),
  Status(QueueStatus),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reply_serializes_bare_payload() {
    let reply = ClientReply::Synced(DrainReport {
      processed: 1,
      remaining: 2,
    });
    assert_eq!(
      serde_json::to_value(&reply).unwrap(),
      serde_json::json!({ "processed": 1, "remaining": 2 })
    );

    let reply = ClientReply::Status(QueueStatus {
      pending: 0,
      items: Vec::new(),
    });
    assert_eq!(
      serde_json::to_value(&reply).unwrap(),
      serde_json::json!({ "pending": 0, "items": [] })
    );
  }
}
