//! In-memory cache store.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::net::Response;

use super::traits::{CacheStore, CachedResponse, PartitionHandle};

/// Store implementation backed by a plain map. Used by strategy and
/// lifecycle tests, and usable by hosts that do not need durability.
///
/// `set_unavailable` flips every operation into an error, which is how
/// tests exercise the "store down is a cache miss" contract.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<HashMap<String, HashMap<String, CachedResponse>>>,
  unavailable: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent operation fail, simulating quota exhaustion or
  /// a broken backing store.
  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.store(unavailable, Ordering::SeqCst);
  }

  fn check_available(&self) -> Result<()> {
    if self.unavailable.load(Ordering::SeqCst) {
      return Err(eyre!("Store unavailable"));
    }
    Ok(())
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, partition: &str) -> Result<PartitionHandle> {
    self.check_available()?;

    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions.entry(partition.to_string()).or_default();

    Ok(PartitionHandle::new(partition))
  }

  fn match_entry(&self, partition: &PartitionHandle, key: &str) -> Result<Option<CachedResponse>> {
    self.check_available()?;

    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      partitions
        .get(partition.name())
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn put(&self, partition: &PartitionHandle, key: &str, response: &Response) -> Result<()> {
    self.check_available()?;

    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    partitions.entry(partition.name().to_string()).or_default().insert(
      key.to_string(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );

    Ok(())
  }

  fn delete(&self, partition: &PartitionHandle, key: &str) -> Result<()> {
    self.check_available()?;

    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(entries) = partitions.get_mut(partition.name()) {
      entries.remove(key);
    }

    Ok(())
  }

  fn list_partitions(&self) -> Result<Vec<String>> {
    self.check_available()?;

    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<String> = partitions.keys().cloned().collect();
    names.sort();

    Ok(names)
  }

  fn delete_partition(&self, name: &str) -> Result<()> {
    self.check_available()?;

    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions.remove(name);

    Ok(())
  }
}
