//! Network fetch interface and request/response types.
//!
//! Strategies never talk to the network directly; they go through the
//! [`Fetcher`] trait so tests can substitute a scripted implementation.
//! A fetch resolves to `Ok(Response)` whenever the transport succeeded,
//! even for non-2xx statuses; `Err` means the request never produced a
//! response at all (offline, DNS failure, connection reset).

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
  Options,
}

impl Method {
  /// Whether this method is a cacheable read. Only GET responses are ever
  /// stored or served from a partition; everything else bypasses the engine.
  pub fn is_retrieval(self) -> bool {
    matches!(self, Method::Get)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
      Method::Options => "OPTIONS",
    }
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
      Method::Patch => reqwest::Method::PATCH,
      Method::Options => reqwest::Method::OPTIONS,
    }
  }
}

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Whether this is a full-page navigation (document load) as opposed to a
  /// subresource fetch. Navigations get the network-first document strategy
  /// and an extra offline fallback to the cached root document.
  pub navigation: bool,
}

impl Request {
  /// A plain GET subresource request.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      navigation: false,
    }
  }

  /// A GET navigation (full-page load) request.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      navigation: true,
    }
  }

  /// Stable store key for this request: SHA-256 over the normalized
  /// identity `METHOD:absolute-url`. `Url` already normalizes the target
  /// (default ports dropped, path percent-encoding canonicalized), so two
  /// spellings of the same resource hash to the same entry.
  pub fn cache_key(&self) -> String {
    cache_key_for(self.method, &self.url)
  }
}

/// Store key for a `(method, url)` identity without building a full request.
pub fn cache_key_for(method: Method, url: &Url) -> String {
  let mut hasher = Sha256::new();
  hasher.update(method.as_str().as_bytes());
  hasher.update(b":");
  hasher.update(url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}

/// Immutable snapshot of a response, as stored in and served from a
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  /// Whether the status is in the "ok" range. Only ok responses are
  /// eligible for caching.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Synthetic 503 returned when a navigation cannot be served from the
  /// network or any cached copy.
  pub fn offline() -> Self {
    Self::synthetic_503("Offline")
  }

  /// Synthetic 503 returned when a cache-first asset is missing and the
  /// network is unreachable.
  pub fn unavailable() -> Self {
    Self::synthetic_503("Resource not available offline")
  }

  fn synthetic_503(message: &str) -> Self {
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: message.as_bytes().to_vec(),
    }
  }
}

/// Network access as seen by the caching engine.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
  /// Perform the request. `Err` means transport failure; an unhappy status
  /// still comes back as `Ok`.
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Real network access via reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let response = self
      .client
      .request(request.method.into(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cache_key_is_stable_across_equivalent_urls() {
    let a = Request::get(Url::parse("https://example.com:443/a").unwrap());
    let b = Request::get(Url::parse("https://example.com/a").unwrap());
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn cache_key_distinguishes_methods() {
    let url = Url::parse("https://example.com/a").unwrap();
    assert_ne!(
      cache_key_for(Method::Get, &url),
      cache_key_for(Method::Head, &url)
    );
  }

  #[test]
  fn only_get_is_retrieval() {
    assert!(Method::Get.is_retrieval());
    assert!(!Method::Post.is_retrieval());
    assert!(!Method::Head.is_retrieval());
  }

  #[test]
  fn synthetic_responses_are_503_plain_text() {
    let offline = Response::offline();
    assert_eq!(offline.status, 503);
    assert!(!offline.is_ok());
    assert_eq!(offline.body, b"Offline");

    let unavailable = Response::unavailable();
    assert_eq!(unavailable.status, 503);
    assert_eq!(unavailable.body, b"Resource not available offline");
  }
}
