//! Install/activate lifecycle and the versioned-partition scheme.
//!
//! One `LifecycleManager` instance corresponds to one deployment
//! generation. Install precaches the manifest into freshly opened
//! current-generation partitions; activation garbage-collects every
//! partition of the reserved naming scheme that belongs to a previous
//! generation. Both transitions resolve only after all of their store and
//! network work has settled, so the host can await them before treating
//! the worker as ready.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use url::Url;

use crate::net::{Fetcher, Request};
use crate::store::{CacheStore, PartitionHandle};

/// Lifecycle states of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Uninstalled,
  Installing,
  /// Installed, waiting for old instances to release control.
  Waiting,
  Activating,
  /// Controlling all in-scope clients.
  Active,
  /// A newer instance finished activating; this one is done for good.
  /// The host runs one manager per generation and calls
  /// [`LifecycleManager::mark_superseded`] on the old one when its
  /// replacement activates; nothing inside the manager reaches this
  /// state on its own.
  Superseded,
}

/// Naming scheme tying partitions to a deployment generation.
///
/// Partition names embed both the role and the generation
/// (`app-static-v3`), so enumerating the store is enough to find
/// leftovers from earlier deployments. The generation is shared by both
/// roles: bumping it refetches static and dynamic content alike.
#[derive(Debug, Clone)]
pub struct PartitionNames {
  prefix: String,
  generation: String,
}

impl PartitionNames {
  pub fn new(prefix: &str, generation: &str) -> Self {
    Self {
      prefix: prefix.to_string(),
      generation: generation.to_string(),
    }
  }

  /// Current-generation static partition name.
  pub fn static_partition(&self) -> String {
    format!("{}-static-{}", self.prefix, self.generation)
  }

  /// Current-generation dynamic partition name.
  pub fn dynamic_partition(&self) -> String {
    format!("{}-dynamic-{}", self.prefix, self.generation)
  }

  /// Generation identifier reported over the control channel.
  pub fn version(&self) -> String {
    format!("{}-cache-{}", self.prefix, self.generation)
  }

  /// Every partition name under this prefix belongs to the worker's
  /// reserved naming scheme and is subject to GC and ClearCache.
  pub fn reserved_prefix(&self) -> String {
    format!("{}-", self.prefix)
  }

  /// The exact set of names this deployment uses. GC deletes reserved
  /// names outside this set, never names inside it.
  pub fn current_set(&self) -> HashSet<String> {
    HashSet::from([self.static_partition(), self.dynamic_partition()])
  }
}

/// URLs fetched and stored eagerly at install time. Entries are
/// independent: one failure never blocks the others.
#[derive(Debug, Clone, Default)]
pub struct PrecacheManifest {
  /// App shell and icons, stored into the static partition.
  pub static_urls: Vec<Url>,
  /// Bundled media, stored into the dynamic partition.
  pub sound_urls: Vec<Url>,
}

impl PrecacheManifest {
  pub fn len(&self) -> usize {
    self.static_urls.len() + self.sound_urls.len()
  }

  pub fn is_empty(&self) -> bool {
    self.static_urls.is_empty() && self.sound_urls.is_empty()
  }
}

/// Drives install and activate for one deployment generation.
pub struct LifecycleManager<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  names: PartitionNames,
  manifest: PrecacheManifest,
  state: Mutex<WorkerState>,
}

impl<S: CacheStore, F: Fetcher> LifecycleManager<S, F> {
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    names: PartitionNames,
    manifest: PrecacheManifest,
  ) -> Self {
    Self {
      store,
      fetcher,
      names,
      manifest,
      state: Mutex::new(WorkerState::Uninstalled),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  pub fn names(&self) -> &PartitionNames {
    &self.names
  }

  /// Generation identifier of this instance. Unaffected by cache clearing.
  pub fn version(&self) -> String {
    self.names.version()
  }

  /// Run the install transition: open the current-generation partitions
  /// and precache the manifest. Failing to open a partition is fatal;
  /// failing to precache an individual entry is logged and skipped.
  /// Resolves only once every precache attempt has settled.
  pub async fn install(&self) -> Result<()> {
    if self.state() != WorkerState::Uninstalled {
      return Err(eyre!("Install already ran for this instance"));
    }
    self.set_state(WorkerState::Installing);
    info!("Installing generation {}", self.names.version());

    let static_partition = match self.store.open(&self.names.static_partition()) {
      Ok(handle) => handle,
      Err(e) => {
        self.set_state(WorkerState::Uninstalled);
        return Err(eyre!("Failed to open static partition: {}", e));
      }
    };
    let dynamic_partition = match self.store.open(&self.names.dynamic_partition()) {
      Ok(handle) => handle,
      Err(e) => {
        self.set_state(WorkerState::Uninstalled);
        return Err(eyre!("Failed to open dynamic partition: {}", e));
      }
    };

    let stored = self.precache(&static_partition, &self.manifest.static_urls).await
      + self.precache(&dynamic_partition, &self.manifest.sound_urls).await;

    info!(
      "Installation complete: precached {}/{} assets",
      stored,
      self.manifest.len()
    );
    self.set_state(WorkerState::Waiting);

    Ok(())
  }

  /// Fetch and store one batch of manifest entries, all attempts settled
  /// before returning. Returns how many entries were stored.
  async fn precache(&self, partition: &PartitionHandle, urls: &[Url]) -> usize {
    let attempts = urls.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = match self.fetcher.fetch(&request).await {
        Ok(response) if response.is_ok() => response,
        Ok(response) => {
          warn!("Skipping precache of {}: status {}", url, response.status);
          return false;
        }
        Err(e) => {
          warn!("Failed to precache {}: {}", url, e);
          return false;
        }
      };

      match self.store.put(partition, &request.cache_key(), &response) {
        Ok(()) => true,
        Err(e) => {
          warn!("Failed to store precached {}: {}", url, e);
          false
        }
      }
    });

    join_all(attempts).await.into_iter().filter(|ok| *ok).count()
  }

  /// Run the activate transition: delete every reserved-scheme partition
  /// that is not part of the current generation, then take control.
  /// Deletion failures are not swallowed; all deletions settle before the
  /// instance reports Active.
  pub async fn activate(&self) -> Result<()> {
    if self.state() != WorkerState::Waiting {
      return Err(eyre!("Cannot activate from {:?}", self.state()));
    }
    self.set_state(WorkerState::Activating);
    info!("Activating generation {}", self.names.version());

    let reserved = self.names.reserved_prefix();
    let current = self.names.current_set();

    for name in self.store.list_partitions()? {
      if name.starts_with(&reserved) && !current.contains(&name) {
        info!("Deleting old partition {}", name);
        self
          .store
          .delete_partition(&name)
          .map_err(|e| eyre!("Failed to delete old partition {}: {}", name, e))?;
      }
    }

    self.set_state(WorkerState::Active);
    info!("Activation complete, controlling clients");

    Ok(())
  }

  /// Delete every partition under the reserved naming scheme, current
  /// generation included. Resolves only after all deletions settle. The
  /// recorded generation identifier is unaffected.
  pub fn clear_all(&self) -> Result<()> {
    let reserved = self.names.reserved_prefix();

    for name in self.store.list_partitions()? {
      if name.starts_with(&reserved) {
        info!("Clearing partition {}", name);
        self
          .store
          .delete_partition(&name)
          .map_err(|e| eyre!("Failed to clear partition {}: {}", name, e))?;
      }
    }

    Ok(())
  }

  /// Mark this instance as replaced by a newer activated generation.
  /// Called by the host, which is the only party that can observe both
  /// generations at once.
  pub fn mark_superseded(&self) {
    self.set_state(WorkerState::Superseded);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::Response;
  use crate::store::MemoryStore;
  use crate::testing::MockFetcher;

  fn url(path: &str) -> Url {
    Url::parse(&format!("https://example.com{}", path)).unwrap()
  }

  fn ok_response(body: &str) -> Response {
    Response {
      status: 200,
      headers: vec![],
      body: body.as_bytes().to_vec(),
    }
  }

  fn manifest(static_paths: &[&str], sound_paths: &[&str]) -> PrecacheManifest {
    PrecacheManifest {
      static_urls: static_paths.iter().map(|p| url(p)).collect(),
      sound_urls: sound_paths.iter().map(|p| url(p)).collect(),
    }
  }

  fn manager(
    store: Arc<MemoryStore>,
    fetcher: Arc<MockFetcher>,
    generation: &str,
    manifest: PrecacheManifest,
  ) -> LifecycleManager<MemoryStore, MockFetcher> {
    LifecycleManager::new(
      store,
      fetcher,
      PartitionNames::new("app", generation),
      manifest,
    )
  }

  #[test]
  fn partition_names_embed_role_and_generation() {
    let names = PartitionNames::new("app", "v3");
    assert_eq!(names.static_partition(), "app-static-v3");
    assert_eq!(names.dynamic_partition(), "app-dynamic-v3");
    assert_eq!(names.version(), "app-cache-v3");
    assert!(names.current_set().contains("app-static-v3"));
    assert!(names.current_set().contains("app-dynamic-v3"));
  }

  #[tokio::test]
  async fn install_precaches_manifest_into_role_partitions() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());
    for path in ["/", "/favicon.ico", "/sounds/rain.mp3"] {
      fetcher.respond(url(path), ok_response(path));
    }

    let manager = manager(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      "v1",
      manifest(&["/", "/favicon.ico"], &["/sounds/rain.mp3"]),
    );

    manager.install().await.unwrap();
    assert_eq!(manager.state(), WorkerState::Waiting);

    let static_p = store.open("app-static-v1").unwrap();
    let dynamic_p = store.open("app-dynamic-v1").unwrap();

    let root_key = Request::get(url("/")).cache_key();
    assert!(store.match_entry(&static_p, &root_key).unwrap().is_some());

    let sound_key = Request::get(url("/sounds/rain.mp3")).cache_key();
    assert!(store.match_entry(&dynamic_p, &sound_key).unwrap().is_some());
    // Roles are not cross-populated
    assert!(store.match_entry(&static_p, &sound_key).unwrap().is_none());
  }

  #[tokio::test]
  async fn install_survives_single_entry_failure() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());
    // /b stays unreachable
    fetcher.respond(url("/a"), ok_response("a"));
    fetcher.respond(url("/c"), ok_response("c"));

    let manager = manager(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      "v1",
      manifest(&["/a", "/b", "/c"], &[]),
    );

    // Install reports overall success despite the failed entry
    manager.install().await.unwrap();
    assert_eq!(manager.state(), WorkerState::Waiting);

    let static_p = store.open("app-static-v1").unwrap();
    for (path, expected) in [("/a", true), ("/b", false), ("/c", true)] {
      let key = Request::get(url(path)).cache_key();
      assert_eq!(
        store.match_entry(&static_p, &key).unwrap().is_some(),
        expected,
        "unexpected precache state for {}",
        path
      );
    }
  }

  #[tokio::test]
  async fn install_does_not_store_non_ok_precache_responses() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.respond(
      url("/gone.png"),
      Response {
        status: 404,
        headers: vec![],
        body: vec![],
      },
    );

    let manager = manager(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      "v1",
      manifest(&["/gone.png"], &[]),
    );
    manager.install().await.unwrap();

    let static_p = store.open("app-static-v1").unwrap();
    let key = Request::get(url("/gone.png")).cache_key();
    assert!(store.match_entry(&static_p, &key).unwrap().is_none());
  }

  #[tokio::test]
  async fn install_is_fatal_when_partitions_cannot_open() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let fetcher = Arc::new(MockFetcher::new());

    let manager = manager(store, fetcher, "v1", manifest(&["/a"], &[]));
    assert!(manager.install().await.is_err());
  }

  #[tokio::test]
  async fn install_runs_at_most_once() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());

    let manager = manager(store, fetcher, "v1", PrecacheManifest::default());
    manager.install().await.unwrap();
    assert!(manager.install().await.is_err());
  }

  #[tokio::test]
  async fn activation_deletes_exactly_the_superseded_generations() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());

    // Leftovers from the previous deployment, plus a foreign partition
    // that shares no reserved prefix and an unrelated near-miss name.
    store.open("app-static-v2").unwrap();
    store.open("app-dynamic-v2").unwrap();
    store.open("other-cache").unwrap();
    store.open("appendix").unwrap();

    let manager = manager(
      Arc::clone(&store),
      fetcher,
      "v3",
      PrecacheManifest::default(),
    );
    manager.install().await.unwrap();
    manager.activate().await.unwrap();
    assert_eq!(manager.state(), WorkerState::Active);

    assert_eq!(
      store.list_partitions().unwrap(),
      vec!["app-dynamic-v3", "app-static-v3", "appendix", "other-cache"]
    );
  }

  #[tokio::test]
  async fn activate_requires_completed_install() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());

    let manager = manager(store, fetcher, "v1", PrecacheManifest::default());
    assert!(manager.activate().await.is_err());
    assert_ne!(manager.state(), WorkerState::Active);
  }

  #[tokio::test]
  async fn clear_all_drops_current_generation_but_not_version() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());

    store.open("other-cache").unwrap();

    let manager = manager(
      Arc::clone(&store),
      fetcher,
      "v3",
      PrecacheManifest::default(),
    );
    manager.install().await.unwrap();
    manager.activate().await.unwrap();

    manager.clear_all().unwrap();

    assert_eq!(store.list_partitions().unwrap(), vec!["other-cache"]);
    assert_eq!(manager.version(), "app-cache-v3");
  }

  #[tokio::test]
  async fn superseded_is_terminal_marking() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());

    let manager = manager(store, fetcher, "v1", PrecacheManifest::default());
    manager.install().await.unwrap();
    manager.mark_superseded();
    assert_eq!(manager.state(), WorkerState::Superseded);
    assert!(manager.activate().await.is_err());
  }
}
