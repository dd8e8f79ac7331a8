//! Offline-first synchronization layer for NexusOS clients.
//!
//! Requests are intercepted by a [`SyncCoordinator`] and answered network-first:
//! - static assets fall back to the static store, then to the app shell
//! - API reads fall back to the API store, marked with `_cached`
//! - API writes that cannot be delivered are queued by priority and
//!   acknowledged optimistically
//!
//! The queue is drained on background sync, on connectivity restore, or on
//! an explicit [`ClientCommand::SyncNow`].

pub mod commands;
pub mod config;
pub mod coordinator;
pub mod event;
pub mod lifecycle;
pub mod net;
pub mod queue;
pub mod router;
pub mod store;
pub mod strategy;
pub mod sync;

pub use commands::{ClientCommand, ClientReply};
pub use config::Config;
pub use coordinator::SyncCoordinator;
