//! Network-first answering strategies.
//!
//! Each strategy makes exactly one network attempt and decides locally what
//! to answer when that attempt fails. None of them surface a network failure
//! to the caller.

mod api_read;
mod api_write;
mod static_assets;

pub use api_read::ApiReadStrategy;
pub use api_write::ApiWriteStrategy;
pub use static_assets::StaticStrategy;

use std::sync::Arc;
use tracing::warn;

use crate::net::{OutboundRequest, Response};
use crate::store::{RequestKey, StoreBackend, StoredEntry};

/// One named store as seen by a strategy.
///
/// Store failures never escape: a failed write is logged, a failed read is a miss.
pub(crate) struct StoreView<S: StoreBackend> {
  storage: Arc<S>,
  name: String,
}

impl<S: StoreBackend> StoreView<S> {
  pub(crate) fn new(storage: Arc<S>, name: String) -> Self {
    Self { storage, name }
  }

  /// Keep a successful GET response.
  pub(crate) fn remember(&self, request: &OutboundRequest, response: &Response) {
    if request.method != "GET" || !response.is_success() {
      return;
    }

    let key = RequestKey::for_request(request);
    if let Err(e) = self
      .storage
      .put(&self.name, &key, &StoredEntry::from_response(response))
    {
      warn!(store = %self.name, url = %request.url, error = %e, "Failed to store response");
    }
  }

  pub(crate) fn lookup(&self, key: &RequestKey) -> Option<StoredEntry> {
    match self.storage.get(&self.name, key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(store = %self.name, request = key.description(), error = %e, "Store read failed, treating as miss");
        None
      }
    }
  }
}
