use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Timer-driven coordinator events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Scheduled background sync for the given tag
  BackgroundSync { tag: String },
  /// Time to probe whether the origin is reachable
  ProbeTick,
}

/// Event source producing background sync and connectivity probe ticks
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler. Both timers fire once immediately.
  pub fn new(sync_interval: Duration, probe_interval: Duration, sync_tag: String) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let timer_tx = tx.clone();
    tokio::spawn(async move {
      let mut sync_timer = interval(sync_interval);
      sync_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
      let mut probe_timer = interval(probe_interval);
      probe_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

      loop {
        let event = tokio::select! {
          _ = sync_timer.tick() => Event::BackgroundSync { tag: sync_tag.clone() },
          _ = probe_timer.tick() => Event::ProbeTick,
        };
        if timer_tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for injecting events from elsewhere (e.g. an OS network-change hook)
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_both_timers_fire() {
    let mut events = EventHandler::new(
      Duration::from_millis(5),
      Duration::from_millis(5),
      "sync-offline-queue".to_string(),
    );

    let mut saw_sync = false;
    let mut saw_probe = false;
    while !(saw_sync && saw_probe) {
      match events.next().await {
        Some(Event::BackgroundSync { tag }) => {
          assert_eq!(tag, "sync-offline-queue");
          saw_sync = true;
        }
        Some(Event::ProbeTick) => saw_probe = true,
        None => panic!("event source closed"),
      }
    }
  }

  #[tokio::test]
  async fn test_injected_events_are_delivered() {
    let mut events = EventHandler::new(
      Duration::from_secs(3600),
      Duration::from_secs(3600),
      "sync-offline-queue".to_string(),
    );

    // Drain the immediate first ticks
    events.next().await;
    events.next().await;

    events.sender().send(Event::ProbeTick).unwrap();
    assert_eq!(events.next().await, Some(Event::ProbeTick));
  }
}
