use chrono::Utc;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::net::{OutboundRequest, Response, Transport};
use crate::queue::{PriorityTable, QueueItem};
use crate::sync::QueueHandle;

const QUEUED_MESSAGE: &str = "Request queued for delivery when connectivity is restored";

/// Deliver-or-queue strategy for mutating API requests.
///
/// A write that cannot reach the network is captured in the offline queue and
/// acknowledged optimistically: the caller gets a success payload with
/// `queued: true` even though the server has not seen the request yet.
pub struct ApiWriteStrategy<T: Transport> {
  transport: Arc<T>,
  queue: QueueHandle,
  priorities: PriorityTable,
}

impl<T: Transport> ApiWriteStrategy<T> {
  pub fn new(transport: Arc<T>, queue: QueueHandle, priorities: PriorityTable) -> Self {
    Self {
      transport,
      queue,
      priorities,
    }
  }

  /// Fails only when the request could neither be delivered nor queued.
  pub async fn handle(&self, request: &OutboundRequest) -> Result<Response> {
    match self.transport.send(request).await {
      Ok(response) => Ok(response),
      Err(e) => {
        debug!(method = %request.method, url = %request.url, error = %e, "Network unavailable for API write");

        let priority = self.priorities.rank_for(request.url.as_str());
        let item = QueueItem::capture(request, priority, Utc::now().timestamp_millis());
        let pending = self.queue.enqueue(item).await?;

        info!(method = %request.method, url = %request.url, priority, pending, "Write accepted offline");
        Ok(Response::queued(QUEUED_MESSAGE))
      }
    }
  }
}
