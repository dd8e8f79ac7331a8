//! Single writer task owning every mutation of the offline queue.
//!
//! Enqueues, migrations and drain commits are sent to one task over a channel
//! and applied strictly one after another. A drain snapshots the queue, replays
//! the snapshot on a separate task and hands the delivered items back to be
//! removed, so enqueues are answered right away even while a replay is stuck
//! on the network. At most one drain is in flight; further drain requests wait
//! their turn and take a fresh snapshot when it comes.

use color_eyre::{eyre::eyre, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::net::Transport;
use crate::queue::{replay_in_order, DrainReport, OfflineQueue, QueueItem, QueueStatus};
use crate::store::StoreBackend;

use super::trigger::SyncTrigger;

type DrainReply = Option<oneshot::Sender<Result<DrainReport>>>;

enum QueueOp {
  Enqueue {
    item: QueueItem,
    reply: oneshot::Sender<Result<usize>>,
  },
  Absorb {
    items: Vec<QueueItem>,
    reply: oneshot::Sender<Result<usize>>,
  },
  Drain {
    trigger: SyncTrigger,
    /// None for fire-and-forget triggers
    reply: DrainReply,
  },
  Status {
    reply: oneshot::Sender<Result<QueueStatus>>,
  },
}

/// A drain whose replay is running.
struct InFlight {
  trigger: SyncTrigger,
  reply: DrainReply,
}

/// The task that owns the queue.
pub struct QueueWriter<S: StoreBackend, T: Transport> {
  queue: OfflineQueue<S>,
  transport: Arc<T>,
  rx: mpsc::UnboundedReceiver<QueueOp>,
  /// Replay tasks report the items they delivered here
  delivered_tx: mpsc::UnboundedSender<Vec<QueueItem>>,
  delivered_rx: mpsc::UnboundedReceiver<Vec<QueueItem>>,
  in_flight: Option<InFlight>,
  waiting: VecDeque<(SyncTrigger, DrainReply)>,
}

impl<S: StoreBackend, T: Transport> QueueWriter<S, T> {
  /// Start the writer on the current tokio runtime.
  pub fn spawn(queue: OfflineQueue<S>, transport: Arc<T>) -> QueueHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
    let writer = Self {
      queue,
      transport,
      rx,
      delivered_tx,
      delivered_rx,
      in_flight: None,
      waiting: VecDeque::new(),
    };
    tokio::spawn(writer.run());
    QueueHandle { tx }
  }

  async fn run(mut self) {
    debug!(store = self.queue.store_name(), "Queue writer started");

    let mut open = true;
    // Keep going after the last handle is gone until the running replay is committed
    while open || self.in_flight.is_some() {
      tokio::select! {
        op = self.rx.recv(), if open => match op {
          Some(op) => self.apply(op),
          None => open = false,
        },
        Some(delivered) = self.delivered_rx.recv(), if self.in_flight.is_some() => {
          self.finish_drain(delivered);
        }
      }
    }

    debug!("Queue writer stopped");
  }

  fn apply(&mut self, op: QueueOp) {
    match op {
      QueueOp::Enqueue { item, reply } => {
        let result = self.queue.enqueue(item);
        if let Ok(len) = result {
          info!(pending = len, "Queued request for later delivery");
        }
        let _ = reply.send(result);
      }
      QueueOp::Absorb { items, reply } => {
        let _ = reply.send(self.queue.absorb(items));
      }
      QueueOp::Drain { trigger, reply } => {
        self.waiting.push_back((trigger, reply));
        self.start_next_drain();
      }
      QueueOp::Status { reply } => {
        let _ = reply.send(self.queue.status());
      }
    }
  }

  /// Start the oldest waiting drain unless one is already running.
  fn start_next_drain(&mut self) {
    while self.in_flight.is_none() {
      let Some((trigger, reply)) = self.waiting.pop_front() else {
        return;
      };

      debug!(%trigger, "Draining offline queue");
      let items = match self.queue.load() {
        Ok(items) => items,
        Err(e) => {
          respond(&trigger, reply, Err(e));
          continue;
        }
      };
      if items.is_empty() {
        respond(&trigger, reply, Ok(DrainReport::default()));
        continue;
      }

      let transport = Arc::clone(&self.transport);
      let delivered_tx = self.delivered_tx.clone();
      tokio::spawn(async move {
        let processed = replay_in_order(transport.as_ref(), &items).await;
        let mut delivered = items;
        delivered.truncate(processed);
        let _ = delivered_tx.send(delivered);
      });

      self.in_flight = Some(InFlight { trigger, reply });
    }
  }

  fn finish_drain(&mut self, delivered: Vec<QueueItem>) {
    let Some(InFlight { trigger, reply }) = self.in_flight.take() else {
      return;
    };

    let processed = delivered.len();
    let result = self.queue.commit(&delivered).map(|remaining| {
      info!(%trigger, processed, remaining, "Offline queue drained");
      DrainReport {
        processed,
        remaining,
      }
    });
    respond(&trigger, reply, result);

    self.start_next_drain();
  }
}

fn respond(trigger: &SyncTrigger, reply: DrainReply, result: Result<DrainReport>) {
  match reply {
    Some(reply) => {
      let _ = reply.send(result);
    }
    None => {
      if let Err(e) = result {
        warn!(%trigger, error = %e, "Offline queue drain failed");
      }
    }
  }
}

/// Cloneable handle for talking to the queue writer.
#[derive(Clone)]
pub struct QueueHandle {
  tx: mpsc::UnboundedSender<QueueOp>,
}

impl QueueHandle {
  fn send(&self, op: QueueOp) -> Result<()> {
    self
      .tx
      .send(op)
      .map_err(|_| eyre!("Queue writer is not running"))
  }

  async fn request<R>(
    &self,
    op: impl FnOnce(oneshot::Sender<Result<R>>) -> QueueOp,
  ) -> Result<R> {
    let (reply, rx) = oneshot::channel();
    self.send(op(reply))?;
    rx.await
      .map_err(|_| eyre!("Queue writer dropped the request"))?
  }

  /// Persist an item. Returns the new queue length.
  pub async fn enqueue(&self, item: QueueItem) -> Result<usize> {
    self.request(|reply| QueueOp::Enqueue { item, reply }).await
  }

  /// Merge items carried over from another queue store.
  pub async fn absorb(&self, items: Vec<QueueItem>) -> Result<usize> {
    self.request(|reply| QueueOp::Absorb { items, reply }).await
  }

  /// Drain and wait for the result.
  pub async fn drain(&self, trigger: SyncTrigger) -> Result<DrainReport> {
    self
      .request(|reply| QueueOp::Drain {
        trigger,
        reply: Some(reply),
      })
      .await
  }

  /// Drain without waiting.
  pub fn trigger(&self, trigger: SyncTrigger) {
    if let Err(e) = self.send(QueueOp::Drain {
      trigger,
      reply: None,
    }) {
      warn!(error = %e, "Could not schedule offline queue drain");
    }
  }

  pub async fn status(&self) -> Result<QueueStatus> {
    self.request(|reply| QueueOp::Status { reply }).await
  }

  /// A handle whose writer is already gone; every request fails.
  #[cfg(test)]
  pub(crate) fn detached() -> Self {
    let (tx, _) = mpsc::unbounded_channel();
    Self { tx }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::testing::ScriptedTransport;
  use crate::net::{OutboundRequest, Response};
  use crate::store::SqliteStorage;
  use url::Url;

  const ORIGIN: &str = "https://nexus.example";

  fn stamped(path: &str, priority: u32, timestamp: i64) -> QueueItem {
    let url = Url::parse(&format!("{}{}", ORIGIN, path)).unwrap();
    QueueItem::capture(&OutboundRequest::new("POST", url), priority, timestamp)
  }

  fn item(path: &str, priority: u32) -> QueueItem {
    stamped(path, priority, 0)
  }

  fn route_ok(transport: &ScriptedTransport, paths: &[&str]) {
    for path in paths {
      transport.route("POST", &format!("{}{}", ORIGIN, path), Response::new(200, ""));
    }
  }

  fn spawn(transport: Arc<ScriptedTransport>) -> QueueHandle {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let queue = OfflineQueue::new(storage, "nexusos-queue-v1".to_string());
    QueueWriter::spawn(queue, transport)
  }

  #[tokio::test]
  async fn test_enqueue_and_status() {
    let handle = spawn(Arc::new(ScriptedTransport::new()));

    assert_eq!(handle.enqueue(item("/api/a", 4)).await.unwrap(), 1);
    assert_eq!(handle.enqueue(item("/api/b", 1)).await.unwrap(), 2);

    let status = handle.status().await.unwrap();
    assert_eq!(status.pending, 2);
    assert_eq!(status.items[0].url, "https://nexus.example/api/b");
  }

  #[tokio::test]
  async fn test_concurrent_drains_do_not_lose_enqueues() {
    let transport = Arc::new(ScriptedTransport::new());
    route_ok(&transport, &["/api/a", "/api/b", "/api/c"]);
    let handle = spawn(Arc::clone(&transport));
    handle.enqueue(item("/api/a", 1)).await.unwrap();
    handle.enqueue(item("/api/b", 2)).await.unwrap();

    let (first, enqueued, second) = tokio::join!(
      handle.drain(SyncTrigger::Manual),
      handle.enqueue(item("/api/c", 3)),
      handle.drain(SyncTrigger::BackgroundSync {
        tag: "sync-offline-queue".to_string()
      }),
    );

    // The first drain replays its snapshot; /api/c arrives behind it
    assert_eq!(first.unwrap(), DrainReport { processed: 2, remaining: 1 });
    assert_eq!(enqueued.unwrap(), 3);
    assert_eq!(second.unwrap(), DrainReport { processed: 1, remaining: 0 });
    assert_eq!(handle.status().await.unwrap().pending, 0);
    assert_eq!(transport.sent().len(), 3);
  }

  #[tokio::test]
  async fn test_fire_and_forget_trigger() {
    let transport = Arc::new(ScriptedTransport::new());
    route_ok(&transport, &["/api/a"]);
    let handle = spawn(Arc::clone(&transport));
    handle.enqueue(item("/api/a", 1)).await.unwrap();

    handle.trigger(SyncTrigger::ConnectivityRestored);

    // Runs after the triggered drain and finds nothing left
    let report = handle.drain(SyncTrigger::Manual).await.unwrap();
    assert_eq!(report, DrainReport { processed: 0, remaining: 0 });
    assert_eq!(transport.sent().len(), 1);
  }

  #[tokio::test]
  async fn test_enqueue_is_answered_while_replay_stalls() {
    let transport = Arc::new(ScriptedTransport::new());
    route_ok(&transport, &["/api/a", "/api/b"]);
    transport.hold();
    let handle = spawn(Arc::clone(&transport));
    handle.enqueue(item("/api/a", 1)).await.unwrap();

    handle.trigger(SyncTrigger::ConnectivityRestored);
    let pending = tokio::time::timeout(
      std::time::Duration::from_secs(1),
      handle.enqueue(item("/api/b", 2)),
    )
    .await
    .expect("enqueue waited for the replay")
    .unwrap();
    assert_eq!(pending, 2);

    transport.release();
    let report = handle.drain(SyncTrigger::Manual).await.unwrap();

    // The stalled drain delivered /api/a, this one /api/b
    assert_eq!(report, DrainReport { processed: 1, remaining: 0 });
    assert_eq!(handle.status().await.unwrap().pending, 0);
  }

  #[tokio::test]
  async fn test_absorb_keeps_priority_order() {
    let handle = spawn(Arc::new(ScriptedTransport::new()));
    handle.enqueue(stamped("/api/new", 3, 300)).await.unwrap();
    handle.enqueue(stamped("/api/new-health", 2, 200)).await.unwrap();

    let len = handle
      .absorb(vec![
        stamped("/api/old-low", 4, 40),
        stamped("/api/old-health", 2, 20),
        stamped("/api/old-urgent", 1, 10),
      ])
      .await
      .unwrap();

    assert_eq!(len, 5);
    let items = handle.status().await.unwrap().items;
    let order: Vec<(u32, i64)> = items.iter().map(|i| (i.priority, i.timestamp)).collect();
    assert_eq!(order, vec![(1, 10), (2, 20), (2, 200), (3, 300), (4, 40)]);
  }

  #[tokio::test]
  async fn test_detached_handle_fails() {
    let handle = QueueHandle::detached();
    assert!(handle.enqueue(item("/api/a", 1)).await.is_err());
  }
}
