use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::net::Transport;
use crate::store::{RequestKey, StoreBackend, StoredEntry};

use super::item::QueueItem;

/// Record under which the whole queue is persisted
const QUEUE_RECORD: &str = "pending";

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
  pub processed: usize,
  pub remaining: usize,
}

/// Snapshot of the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
  pub pending: usize,
  pub items: Vec<QueueItem>,
}

/// The persisted offline queue.
///
/// Every mutation loads the whole list, changes it and writes it back as a
/// whole. Callers must serialize access (see `sync::QueueWriter`).
pub struct OfflineQueue<S: StoreBackend> {
  storage: Arc<S>,
  store: String,
}

impl<S: StoreBackend> OfflineQueue<S> {
  pub fn new(storage: Arc<S>, store: String) -> Self {
    Self { storage, store }
  }

  pub fn store_name(&self) -> &str {
    &self.store
  }

  pub fn load(&self) -> Result<Vec<QueueItem>> {
    Self::read_items(&self.storage, &self.store)
  }

  /// Read the items persisted in any queue store.
  ///
  /// A missing or unreadable record reads as an empty queue.
  pub fn read_items(storage: &S, store: &str) -> Result<Vec<QueueItem>> {
    let entry = match storage.get(store, &RequestKey::record(QUEUE_RECORD)) {
      Ok(Some(entry)) => entry,
      Ok(None) => return Ok(Vec::new()),
      Err(e) => {
        warn!(store = store, error = %e, "Unreadable offline queue, treating as empty");
        return Ok(Vec::new());
      }
    };

    match serde_json::from_slice(&entry.body) {
      Ok(items) => Ok(items),
      Err(e) => {
        warn!(store = store, error = %e, "Corrupt offline queue, treating as empty");
        Ok(Vec::new())
      }
    }
  }

  fn save(&self, items: &[QueueItem]) -> Result<()> {
    let body =
      serde_json::to_vec(items).map_err(|e| eyre!("Failed to serialize offline queue: {}", e))?;

    let entry = StoredEntry {
      status: 200,
      headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
      body,
      cached_at: chrono::Utc::now(),
    };

    self
      .storage
      .put(&self.store, &RequestKey::record(QUEUE_RECORD), &entry)
  }

  /// Insert an item in priority order. Returns the new queue length.
  pub fn enqueue(&self, item: QueueItem) -> Result<usize> {
    let mut items = self.load()?;
    items.push(item);
    self.store_sorted(items)
  }

  /// Merge items carried over from a retired queue store.
  ///
  /// Carried-over items are older than anything queued here, so they go in
  /// front of equal-rank items. Items already queued are skipped, which makes
  /// a repeated migration of the same store harmless.
  pub fn absorb(&self, carried: Vec<QueueItem>) -> Result<usize> {
    let existing = self.load()?;
    let mut items: Vec<QueueItem> = carried
      .into_iter()
      .filter(|item| !existing.contains(item))
      .collect();
    items.extend(existing);
    self.store_sorted(items)
  }

  fn store_sorted(&self, mut items: Vec<QueueItem>) -> Result<usize> {
    // sort_by_key is stable
    items.sort_by_key(|item| item.priority);
    self.save(&items)?;
    Ok(items.len())
  }

  pub fn status(&self) -> Result<QueueStatus> {
    let items = self.load()?;
    Ok(QueueStatus {
      pending: items.len(),
      items,
    })
  }

  /// Remove delivered items from the queue. Returns how many remain.
  ///
  /// Items are matched by value, so anything enqueued or migrated while the
  /// delivered ones were being replayed stays queued. Nothing is written when
  /// nothing was delivered.
  pub fn commit(&self, delivered: &[QueueItem]) -> Result<usize> {
    let mut items = self.load()?;
    if delivered.is_empty() {
      return Ok(items.len());
    }

    for done in delivered {
      match items.iter().position(|item| item == done) {
        Some(pos) => {
          items.remove(pos);
        }
        None => warn!(method = %done.method, url = %done.url, "Delivered item no longer queued"),
      }
    }

    self.save(&items)?;
    Ok(items.len())
  }

  /// Replay queued items in stored order, stopping at the first failure.
  ///
  /// Delivered items are dropped and the rest keep their order. An empty queue
  /// is left untouched.
  pub async fn drain<T: Transport>(&self, transport: &T) -> Result<DrainReport> {
    let items = self.load()?;
    if items.is_empty() {
      return Ok(DrainReport::default());
    }

    let processed = replay_in_order(transport, &items).await;
    let remaining = self.commit(&items[..processed])?;

    info!(processed, remaining, "Offline queue drained");
    Ok(DrainReport {
      processed,
      remaining,
    })
  }
}

/// Replay `items` in order until one fails. Returns how many were delivered.
pub async fn replay_in_order<T: Transport>(transport: &T, items: &[QueueItem]) -> usize {
  let mut processed = 0;
  for item in items {
    match replay(transport, item).await {
      Ok(()) => {
        debug!(method = %item.method, url = %item.url, priority = item.priority, "Replayed queued request");
        processed += 1;
      }
      Err(e) => {
        warn!(method = %item.method, url = %item.url, error = %e, "Replay failed, stopping drain");
        break;
      }
    }
  }
  processed
}

/// A replay succeeds only on a 2xx answer.
async fn replay<T: Transport>(transport: &T, item: &QueueItem) -> Result<()> {
  let request = item.to_request()?;
  let response = transport.send(&request).await?;

  if response.is_success() {
    Ok(())
  } else {
    Err(eyre!(
      "Replay of {} {} returned status {}",
      item.method,
      item.url,
      response.status
    ))
  }
}
