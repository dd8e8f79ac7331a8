//! Scripted transport for exercising offline behaviour without sockets.

use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

use super::client::Transport;
use super::types::{OutboundRequest, Response};

pub struct ScriptedTransport {
  /// "METHOD url" -> canned response
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  /// URLs that fail even while online
  failing: Mutex<HashSet<String>>,
  sent: Mutex<Vec<OutboundRequest>>,
  /// While false every send waits
  gate: watch::Sender<bool>,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    let (gate, _) = watch::channel(true);
    Self {
      routes: Mutex::default(),
      offline: AtomicBool::new(false),
      failing: Mutex::default(),
      sent: Mutex::default(),
      gate,
    }
  }

  pub fn route(&self, method: &str, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(format!("{} {}", method.to_ascii_uppercase(), url), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn fail_url(&self, url: &str) {
    self.failing.lock().unwrap().insert(url.to_string());
  }

  pub fn heal_url(&self, url: &str) {
    self.failing.lock().unwrap().remove(url);
  }

  /// Stall every send until `release` is called.
  pub fn hold(&self) {
    self.gate.send_replace(false);
  }

  pub fn release(&self) {
    self.gate.send_replace(true);
  }

  /// Every request that reached the transport, in order.
  pub fn sent(&self) -> Vec<OutboundRequest> {
    self.sent.lock().unwrap().clone()
  }

  pub fn clear_sent(&self) {
    self.sent.lock().unwrap().clear();
  }
}

impl Transport for ScriptedTransport {
  async fn send(&self, request: &OutboundRequest) -> Result<Response> {
    self.sent.lock().unwrap().push(request.clone());

    let mut gate = self.gate.subscribe();
    let _ = gate.wait_for(|open| *open).await;

    if self.offline.load(Ordering::SeqCst)
      || self.failing.lock().unwrap().contains(request.url.as_str())
    {
      return Err(eyre!("network unreachable: {}", request.url));
    }

    let key = format!("{} {}", request.method, request.url);
    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&key)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}
