//! Scripted network fetcher for tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Semaphore;
use url::Url;

use crate::net::{Fetcher, Request, Response};

/// Fetcher returning canned responses per URL. URLs with no scripted
/// response reject with a transport error, so a fresh `MockFetcher`
/// behaves like an unreachable network.
pub struct MockFetcher {
  responses: Mutex<HashMap<Url, Response>>,
  calls: Mutex<Vec<Url>>,
  /// When present, every fetch waits for a permit before resolving. Lets
  /// tests hold a background refresh open while asserting on the
  /// foreground path.
  gate: Option<Semaphore>,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self {
      responses: Mutex::new(HashMap::new()),
      calls: Mutex::new(Vec::new()),
      gate: None,
    }
  }

  /// A fetcher whose fetches block until [`release`](Self::release) is
  /// called once per fetch.
  pub fn gated() -> Self {
    Self {
      gate: Some(Semaphore::new(0)),
      ..Self::new()
    }
  }

  /// Script a response for a URL.
  pub fn respond(&self, url: Url, response: Response) {
    self.responses.lock().unwrap().insert(url, response);
  }

  /// Remove the scripted response, making the URL unreachable again.
  pub fn fail(&self, url: &Url) {
    self.responses.lock().unwrap().remove(url);
  }

  /// Let one gated fetch proceed.
  pub fn release(&self) {
    if let Some(gate) = &self.gate {
      gate.add_permits(1);
    }
  }

  /// Number of fetches issued so far.
  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  /// URLs fetched, in order.
  pub fn calls(&self) -> Vec<Url> {
    self.calls.lock().unwrap().clone()
  }
}

impl Default for MockFetcher {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Fetcher for MockFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.url.clone());

    if let Some(gate) = &self.gate {
      let permit = gate
        .acquire()
        .await
        .map_err(|e| eyre!("Gate closed: {}", e))?;
      permit.forget();
    }

    let scripted = self.responses.lock().unwrap().get(&request.url).cloned();
    scripted.ok_or_else(|| eyre!("Network unreachable for {}", request.url))
  }
}
