//! Partitioned persistent cache store.
//!
//! A store maps `(partition, request key)` to an immutable response
//! snapshot. Partitions are cheap named regions; the lifecycle layer
//! creates and garbage-collects them wholesale, while the strategy layer
//! reads and writes individual entries. All operations are idempotent and
//! resolve concurrent same-key writes last-writer-wins.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CacheStore, CachedResponse, PartitionHandle};
