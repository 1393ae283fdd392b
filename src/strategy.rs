//! The three fetch/cache algorithms.
//!
//! Every strategy takes the request plus the partition it was routed to
//! and resolves at most one network attempt, immediately: no retries, no
//! timeouts. Store failures are logged and treated as
//! misses so a broken store degrades to plain network access instead of
//! failing requests.

use color_eyre::Result;
use std::sync::Arc;
use tracing::warn;

use crate::net::{Fetcher, Request, Response};
use crate::store::{CacheStore, PartitionHandle};

/// Strategy executor bound to a store and a fetcher.
pub struct StrategyEngine<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  /// Last-resort fallback for failed navigations: the cached root document
  /// and the partition it was precached into.
  navigation_fallback: Option<(PartitionHandle, String)>,
}

impl<S: CacheStore, F: Fetcher> StrategyEngine<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
    Self {
      store,
      fetcher,
      navigation_fallback: None,
    }
  }

  /// Configure the cached root document used as the final offline fallback
  /// for navigation requests.
  pub fn with_navigation_fallback(mut self, partition: PartitionHandle, key: String) -> Self {
    self.navigation_fallback = Some((partition, key));
    self
  }

  /// Cache-first: serve the stored copy if present, otherwise fetch, store
  /// and return. A network failure on miss yields a synthetic 503; the
  /// raw error never reaches the caller.
  pub async fn cache_first(&self, request: &Request, partition: &PartitionHandle) -> Response {
    if let Some(entry) = self.lookup(partition, &request.cache_key()) {
      return entry;
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store_if_ok(partition, request, &response);
        response
      }
      Err(e) => {
        warn!("Network failed for {}: {}", request.url, e);
        Response::unavailable()
      }
    }
  }

  /// Network-first: fetch, store on success, and fall back through the
  /// cached copy (then, for navigations, the cached root document) down
  /// to a synthetic 503.
  pub async fn network_first(&self, request: &Request, partition: &PartitionHandle) -> Response {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store_if_ok(partition, request, &response);
        response
      }
      Err(e) => {
        warn!("Network failed for {}, falling back to cache: {}", request.url, e);

        if let Some(entry) = self.lookup(partition, &request.cache_key()) {
          return entry;
        }

        if request.navigation {
          if let Some((fallback_partition, fallback_key)) = &self.navigation_fallback {
            if let Some(entry) = self.lookup(fallback_partition, fallback_key) {
              return entry;
            }
          }
        }

        Response::offline()
      }
    }
  }

  /// Stale-while-revalidate: a refresh fetch is issued regardless of the
  /// lookup result. On a hit the cached copy is returned immediately and
  /// the refresh settles in the background (its failure is swallowed, its
  /// success overwrites the entry). On a miss the caller gets the refresh
  /// outcome itself, including a raw fetch error.
  pub async fn stale_while_revalidate(
    &self,
    request: &Request,
    partition: &PartitionHandle,
  ) -> Result<Response> {
    let key = request.cache_key();

    match self.lookup(partition, &key) {
      Some(entry) => {
        self.spawn_revalidate(request.clone(), partition.clone());
        Ok(entry)
      }
      None => {
        let response = self.fetcher.fetch(request).await?;
        self.store_if_ok(partition, request, &response);
        Ok(response)
      }
    }
  }

  /// Background refresh for stale-while-revalidate. Never awaited by the
  /// response path; the store write races with concurrent writers under
  /// last-writer-wins.
  fn spawn_revalidate(&self, request: Request, partition: PartitionHandle) {
    let store = Arc::clone(&self.store);
    let fetcher = Arc::clone(&self.fetcher);

    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) if response.is_ok() => {
          if let Err(e) = store.put(&partition, &request.cache_key(), &response) {
            warn!("Failed to store revalidated {}: {}", request.url, e);
          }
        }
        Ok(_) => {} // Non-ok refresh; keep the stale entry
        Err(e) => {
          warn!("Revalidation fetch failed for {}: {}", request.url, e);
        }
      }
    });
  }

  /// Store lookup with store errors demoted to misses.
  fn lookup(&self, partition: &PartitionHandle, key: &str) -> Option<Response> {
    match self.store.match_entry(partition, key) {
      Ok(entry) => entry.map(|e| e.response),
      Err(e) => {
        warn!("Store lookup failed in {}: {}", partition.name(), e);
        None
      }
    }
  }

  /// Cache a response if its status is in the ok range. Store failures are
  /// non-fatal: the response is still served.
  fn store_if_ok(&self, partition: &PartitionHandle, request: &Request, response: &Response) {
    if !response.is_ok() {
      return;
    }
    if let Err(e) = self.store.put(partition, &request.cache_key(), response) {
      warn!("Failed to store {} in {}: {}", request.url, partition.name(), e);
    }
  }
}
