//! The per-process sync coordinator.
//!
//! Owns the stores, the transport, the queue writer and the lifecycle of one
//! generation, and is the single entry point for intercepted requests, client
//! commands and sync triggers.

use color_eyre::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::commands::{ClientCommand, ClientReply};
use crate::config::Config;
use crate::event::Event;
use crate::lifecycle::{ActivationReport, Lifecycle, LifecycleState};
use crate::net::{OutboundRequest, Response, Transport};
use crate::queue::{OfflineQueue, PriorityTable};
use crate::router::{RequestClass, Router};
use crate::store::{StoreBackend, StoreNames};
use crate::strategy::{ApiReadStrategy, ApiWriteStrategy, StaticStrategy};
use crate::sync::{ConnectivityMonitor, QueueHandle, QueueWriter, SyncTrigger};

pub struct SyncCoordinator<S: StoreBackend, T: Transport> {
  router: Router,
  static_assets: StaticStrategy<S, T>,
  api_read: ApiReadStrategy<S, T>,
  api_write: ApiWriteStrategy<T>,
  queue: QueueHandle,
  lifecycle: Lifecycle<S, T>,
  transport: Arc<T>,
  connectivity: Mutex<ConnectivityMonitor>,
  probe_url: Url,
  sync_tag: String,
}

impl<S: StoreBackend, T: Transport> SyncCoordinator<S, T> {
  /// Build the coordinator and start its queue writer.
  ///
  /// Must be called from within a tokio runtime.
  pub fn new(config: &Config, storage: Arc<S>, transport: Arc<T>) -> Result<Self> {
    let names = StoreNames::from_config(config);

    let queue = QueueWriter::spawn(
      OfflineQueue::new(Arc::clone(&storage), names.queue_store()),
      Arc::clone(&transport),
    );

    Ok(Self {
      router: Router::from_config(config),
      static_assets: StaticStrategy::new(
        Arc::clone(&storage),
        names.static_store(),
        Arc::clone(&transport),
        config.shell_url()?,
      ),
      api_read: ApiReadStrategy::new(Arc::clone(&storage), names.api_store(), Arc::clone(&transport)),
      api_write: ApiWriteStrategy::new(
        Arc::clone(&transport),
        queue.clone(),
        PriorityTable::from_config(config),
      ),
      queue,
      lifecycle: Lifecycle::new(
        storage,
        Arc::clone(&transport),
        names,
        config.asset_urls()?,
        config.skip_waiting,
      ),
      transport,
      connectivity: Mutex::new(ConnectivityMonitor::new()),
      probe_url: config.probe_url()?,
      sync_tag: config.sync_tag.clone(),
    })
  }

  /// Install, then activate right away when skip-waiting is on.
  pub async fn start(&self) -> Result<Option<ActivationReport>> {
    self.install().await?;

    if self.lifecycle.skip_waiting() {
      return self.activate().await.map(Some);
    }

    info!("Installed, waiting for activation");
    Ok(None)
  }

  pub async fn install(&self) -> Result<()> {
    self.lifecycle.install().await
  }

  pub async fn activate(&self) -> Result<ActivationReport> {
    self.lifecycle.activate(&self.queue).await
  }

  pub fn lifecycle_state(&self) -> LifecycleState {
    self.lifecycle.state()
  }

  /// Watch which generation controls client contexts.
  pub fn subscribe(&self) -> watch::Receiver<Option<u32>> {
    self.lifecycle.subscribe()
  }

  /// Answer an intercepted request.
  ///
  /// Network failures are absorbed by the strategies; an error here means a
  /// write could neither be delivered nor queued.
  pub async fn handle_request(&self, request: &OutboundRequest) -> Result<Response> {
    let class = self.router.classify(request);
    debug!(method = %request.method, url = %request.url, ?class, "Routing request");

    match class {
      RequestClass::Static => Ok(self.static_assets.handle(request).await),
      RequestClass::ApiRead => Ok(self.api_read.handle(request).await),
      RequestClass::ApiWrite => self.api_write.handle(request).await,
    }
  }

  /// Answer a command from a client context.
  pub async fn handle_command(&self, command: ClientCommand) -> Result<ClientReply> {
    match command {
      ClientCommand::SyncNow => {
        let report = self.queue.drain(SyncTrigger::Manual).await?;
        Ok(ClientReply::Synced(report))
      }
      ClientCommand::QueueStatus => Ok(ClientReply::Status(self.queue.status().await?)),
    }
  }

  /// Fire-and-forget drain. Background syncs for other tags are ignored.
  pub fn on_trigger(&self, trigger: SyncTrigger) {
    if let SyncTrigger::BackgroundSync { ref tag } = trigger {
      if *tag != self.sync_tag {
        debug!(tag = %tag, "Ignoring background sync for another tag");
        return;
      }
    }

    self.queue.trigger(trigger);
  }

  pub async fn handle_event(&self, event: Event) {
    match event {
      Event::BackgroundSync { tag } => self.on_trigger(SyncTrigger::BackgroundSync { tag }),
      Event::ProbeTick => {
        self.probe_connectivity().await;
      }
    }
  }

  /// Probe the origin and fire the connectivity-restored trigger on an
  /// offline -> online edge. Returns whether the origin was reachable.
  pub async fn probe_connectivity(&self) -> bool {
    let reachable = self
      .transport
      .send(&OutboundRequest::get(self.probe_url.clone()))
      .await
      .is_ok();

    let restored = match self.connectivity.lock() {
      Ok(mut monitor) => monitor.observe(reachable),
      Err(e) => {
        warn!(error = %e, "Connectivity monitor lock poisoned");
        false
      }
    };

    if restored {
      info!("Connectivity restored");
      self.on_trigger(SyncTrigger::ConnectivityRestored);
    }

    reachable
  }
}
