//! Queue draining triggers and the single writer that owns the queue.

mod connectivity;
mod trigger;
mod writer;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use trigger::SyncTrigger;
pub use writer::{QueueHandle, QueueWriter};
