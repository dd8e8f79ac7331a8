//! Offline write queue.
//!
//! Mutating requests that could not be delivered are captured as
//! [`QueueItem`]s, ranked by [`PriorityTable`] and persisted as one ordered
//! list in the queue store. Draining replays them in that order and stops at
//! the first failure.

mod item;
mod offline;
mod priority;

pub use item::QueueItem;
pub use offline::{replay_in_order, DrainReport, OfflineQueue, QueueStatus};
pub use priority::PriorityTable;
