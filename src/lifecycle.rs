//! Install / activate lifecycle of one store generation.
//!
//! Install pre-warms the static store with the application shell. Activation
//! retires every store the generation does not own (carrying undelivered
//! queue items over first) and takes control of open client contexts.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use crate::net::{OutboundRequest, Transport};
use crate::queue::OfflineQueue;
use crate::store::{RequestKey, StoreBackend, StoreNames, StoredEntry};
use crate::sync::QueueHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Constructed, nothing installed yet
  Parsed,
  Installing,
  /// Installed and waiting to be activated
  Installed,
  Activating,
  Active,
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      LifecycleState::Parsed => "parsed",
      LifecycleState::Installing => "installing",
      LifecycleState::Installed => "installed",
      LifecycleState::Activating => "activating",
      LifecycleState::Active => "active",
    };
    write!(f, "{}", name)
  }
}

/// What activation removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  pub deleted_stores: Vec<String>,
  /// Queue items moved out of retired queue stores
  pub migrated_items: usize,
}

pub struct Lifecycle<S: StoreBackend, T: Transport> {
  storage: Arc<S>,
  transport: Arc<T>,
  names: StoreNames,
  manifest: Vec<Url>,
  skip_waiting: bool,
  state: Mutex<LifecycleState>,
  /// Generation controlling the client contexts, None until the first claim
  controller: watch::Sender<Option<u32>>,
}

impl<S: StoreBackend, T: Transport> Lifecycle<S, T> {
  pub fn new(
    storage: Arc<S>,
    transport: Arc<T>,
    names: StoreNames,
    manifest: Vec<Url>,
    skip_waiting: bool,
  ) -> Self {
    let (controller, _) = watch::channel(None);
    Self {
      storage,
      transport,
      names,
      manifest,
      skip_waiting,
      state: Mutex::new(LifecycleState::Parsed),
      controller,
    }
  }

  pub fn state(&self) -> LifecycleState {
    self
      .state
      .lock()
      .map(|state| *state)
      .unwrap_or(LifecycleState::Parsed)
  }

  fn set_state(&self, next: LifecycleState) {
    if let Ok(mut state) = self.state.lock() {
      let previous = *state;
      info!(generation = self.names.generation(), from = %previous, to = %next, "Lifecycle transition");
      *state = next;
    }
  }

  /// Whether a freshly installed generation activates without waiting.
  pub fn skip_waiting(&self) -> bool {
    self.skip_waiting
  }

  /// Client contexts watch this to learn which generation controls them.
  pub fn subscribe(&self) -> watch::Receiver<Option<u32>> {
    self.controller.subscribe()
  }

  /// Fetch every manifest asset and store it in the static store.
  ///
  /// All-or-nothing: if any asset cannot be fetched nothing is written and the
  /// generation stays uninstalled.
  pub async fn install(&self) -> Result<()> {
    self.set_state(LifecycleState::Installing);

    match self.prewarm().await {
      Ok(count) => {
        info!(store = %self.names.static_store(), assets = count, "Static store pre-warmed");
        self.set_state(LifecycleState::Installed);
        Ok(())
      }
      Err(e) => {
        self.set_state(LifecycleState::Parsed);
        Err(e)
      }
    }
  }

  async fn prewarm(&self) -> Result<usize> {
    let requests: Vec<OutboundRequest> = self
      .manifest
      .iter()
      .map(|url| OutboundRequest::get(url.clone()))
      .collect();

    let responses = join_all(requests.iter().map(|r| self.transport.send(r))).await;

    let mut entries = Vec::with_capacity(requests.len());
    for (request, response) in requests.iter().zip(responses) {
      let response = response.map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;
      if !response.is_success() {
        return Err(eyre!(
          "Failed to fetch {}: status {}",
          request.url,
          response.status
        ));
      }
      entries.push((RequestKey::for_request(request), StoredEntry::from_response(&response)));
    }

    let store = self.names.static_store();
    self.storage.open_store(&store)?;
    for (key, entry) in &entries {
      self.storage.put(&store, key, entry)?;
    }

    Ok(entries.len())
  }

  /// Retire superseded stores and take control of clients.
  ///
  /// On failure the generation goes back to `Installed`, so activation can be
  /// retried.
  pub async fn activate(&self, queue: &QueueHandle) -> Result<ActivationReport> {
    self.set_state(LifecycleState::Activating);

    match self.retire_superseded(queue).await {
      Ok(report) => {
        self.claim();
        self.set_state(LifecycleState::Active);
        Ok(report)
      }
      Err(e) => {
        warn!(generation = self.names.generation(), error = %e, "Activation failed");
        self.set_state(LifecycleState::Installed);
        Err(e)
      }
    }
  }

  async fn retire_superseded(&self, queue: &QueueHandle) -> Result<ActivationReport> {
    let mut report = ActivationReport::default();
    for name in self.storage.store_names()? {
      if self.names.is_current(&name) {
        continue;
      }

      let mut migrated = 0;
      if self.names.is_queue_store(&name) {
        let items = OfflineQueue::<S>::read_items(&self.storage, &name)?;
        if !items.is_empty() {
          migrated = items.len();
          queue.absorb(items).await?;
          info!(from = %name, items = migrated, "Migrated pending writes from retired queue");
          report.migrated_items += migrated;
        }
      }

      match self.storage.delete_store(&name) {
        Ok(true) => {
          info!(store = %name, "Deleted superseded store");
          report.deleted_stores.push(name);
        }
        Ok(false) => warn!(store = %name, "Superseded store vanished before deletion"),
        Err(e) => {
          if migrated > 0 {
            // A later migration skips items still queued, not ones delivered meanwhile
            warn!(store = %name, items = migrated, "Retired queue kept after migration, delivered items may replay again");
          }
          return Err(e);
        }
      }
    }

    for name in self.names.current() {
      self.storage.open_store(&name)?;
    }

    Ok(report)
  }

  /// Become the controller of every open client context.
  pub fn claim(&self) {
    self.controller.send_replace(Some(self.names.generation()));
  }
}
