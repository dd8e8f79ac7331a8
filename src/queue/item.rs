use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::net::OutboundRequest;

/// A captured mutating request awaiting redelivery.
///
/// Items are never edited after capture; they are only removed once their
/// replay succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
  pub url: String,
  pub method: String,
  pub headers: BTreeMap<String, String>,
  pub body: Option<String>,
  /// Enqueue time, epoch milliseconds
  pub timestamp: i64,
  /// Replay rank, lower replays first
  pub priority: u32,
}

impl QueueItem {
  pub fn capture(request: &OutboundRequest, priority: u32, timestamp: i64) -> Self {
    Self {
      url: request.url.to_string(),
      method: request.method.clone(),
      headers: request.headers.clone(),
      body: request
        .body
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).into_owned()),
      timestamp,
      priority,
    }
  }

  /// Rebuild the original request for replay.
  pub fn to_request(&self) -> Result<OutboundRequest> {
    let url = Url::parse(&self.url)
      .map_err(|e| eyre!("Queued item has invalid URL '{}': {}", self.url, e))?;

    Ok(OutboundRequest {
      method: self.method.clone(),
      url,
      headers: self.headers.clone(),
      body: self.body.as_ref().map(|b| b.clone().into_bytes()),
      navigation: false,
    })
  }
}
