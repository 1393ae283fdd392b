//! Store trait and entry types.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::net::Response;

/// A cached entry together with its store-assigned recency.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the store committed this entry.
  pub cached_at: DateTime<Utc>,
}

/// Token for an opened partition. Holding a handle does not pin the
/// partition: a concurrent `delete_partition` simply makes subsequent
/// lookups miss, and the next `put` recreates the partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionHandle {
  name: String,
}

impl PartitionHandle {
  pub(crate) fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

/// Trait for cache store backends.
///
/// Errors mean the store itself is unavailable (e.g. quota exceeded,
/// database locked up); a missing entry is the `Ok(None)` branch, never an
/// error. Callers on the request path treat store errors as misses.
pub trait CacheStore: Send + Sync + 'static {
  /// Open (creating if needed) a partition and return a handle to it.
  fn open(&self, partition: &str) -> Result<PartitionHandle>;

  /// Look up an entry by request key.
  fn match_entry(&self, partition: &PartitionHandle, key: &str) -> Result<Option<CachedResponse>>;

  /// Store a response under the given key, overwriting any prior entry.
  fn put(&self, partition: &PartitionHandle, key: &str, response: &Response) -> Result<()>;

  /// Remove an entry. Removing a missing entry is not an error.
  fn delete(&self, partition: &PartitionHandle, key: &str) -> Result<()>;

  /// Names of all partitions currently present.
  fn list_partitions(&self) -> Result<Vec<String>>;

  /// Drop a whole partition and all of its entries. Dropping a missing
  /// partition is not an error.
  fn delete_partition(&self, name: &str) -> Result<()>;
}
