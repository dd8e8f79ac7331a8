use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::net::{OutboundRequest, Response, Transport};
use crate::store::{RequestKey, StoreBackend};

use super::StoreView;

/// Network-first strategy for application shell resources.
pub struct StaticStrategy<S: StoreBackend, T: Transport> {
  store: StoreView<S>,
  transport: Arc<T>,
  shell: Url,
}

impl<S: StoreBackend, T: Transport> StaticStrategy<S, T> {
  pub fn new(storage: Arc<S>, store: String, transport: Arc<T>, shell: Url) -> Self {
    Self {
      store: StoreView::new(storage, store),
      transport,
      shell,
    }
  }

  /// 1. Try the network, keep a copy of what comes back
  /// 2. Offline: serve the stored copy
  /// 3. Offline navigation with no copy: serve the app shell
  /// 4. Otherwise a 503
  pub async fn handle(&self, request: &OutboundRequest) -> Response {
    match self.transport.send(request).await {
      Ok(response) => {
        self.store.remember(request, &response);
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network unavailable for static asset");

        if let Some(entry) = self.store.lookup(&RequestKey::for_request(request)) {
          return entry.into_response();
        }

        if request.navigation {
          let shell_key = RequestKey::new("GET", self.shell.as_str());
          if let Some(entry) = self.store.lookup(&shell_key) {
            debug!(url = %request.url, "Serving app shell for offline navigation");
            return entry.into_response();
          }
        }

        Response::unavailable()
      }
    }
  }
}
