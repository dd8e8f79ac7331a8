use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::net::{OutboundRequest, Response};

/// Identity of a request inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  hash: String,
  description: String,
}

impl RequestKey {
  /// Key for a method + absolute URL pair.
  pub fn new(method: &str, url: &str) -> Self {
    Self::from_description(format!("{} {}", method.to_ascii_uppercase(), url))
  }

  pub fn for_request(request: &OutboundRequest) -> Self {
    Self::new(&request.method, request.url.as_str())
  }

  /// Key for a fixed record that is not a request (e.g. the queue itself).
  pub fn record(name: &str) -> Self {
    Self::from_description(format!("record:{}", name))
  }

  fn from_description(description: String) -> Self {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(description.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self { hash, description }
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  pub fn description(&self) -> &str {
    &self.description
  }
}

/// A response held in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

impl StoredEntry {
  pub fn from_response(response: &Response) -> Self {
    Self {
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
      cached_at: Utc::now(),
    }
  }

  pub fn into_response(self) -> Response {
    Response {
      status: self.status,
      headers: self.headers,
      body: self.body,
    }
  }
}
