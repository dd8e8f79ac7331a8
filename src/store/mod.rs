//! Named, versioned persistent stores.
//!
//! A store maps request identities to stored responses. Store names carry a
//! generation suffix (`nexusos-api-v2`) so that activation of a new generation
//! can delete every store it does not own.

mod names;
mod storage;
mod types;

pub use names::StoreNames;
pub use storage::{SqliteStorage, StoreBackend};
pub use types::{RequestKey, StoredEntry};
