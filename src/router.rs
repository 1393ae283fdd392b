//! Request-to-strategy routing.
//!
//! Classification is a pure function over the request and a fixed rule
//! table; it performs no I/O and never touches the store. Rules are
//! evaluated top to bottom, first match wins.

use url::Url;

use crate::net::Request;

/// The three request-serving algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

/// Logical partition role a request is served from. The lifecycle layer
/// maps roles to current-generation partition names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
  Static,
  Dynamic,
}

/// Outcome of classifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  /// Not intercepted: the request goes straight to the network, with no
  /// store read or write.
  Bypass,
  /// Serve through the given strategy against the given partition role.
  Serve {
    strategy: Strategy,
    partition: PartitionRole,
  },
}

/// Rule table inputs: the worker's own origin plus the path patterns that
/// pick strategies. Built from configuration.
#[derive(Debug, Clone)]
pub struct RouteRules {
  /// Same-origin boundary; anything else is bypassed.
  pub origin: Url,
  /// Path suffixes treated as immutable static assets.
  pub static_extensions: Vec<String>,
  /// Path prefix for bundled media, cache-first into the dynamic partition.
  pub sounds_prefix: String,
  /// Framework build output with hashed filenames; safe to cache first.
  pub framework_immutable_prefix: String,
  /// Broader framework prefix; semi-volatile, served stale-while-revalidate.
  pub framework_prefix: String,
}

/// Classify a request into a serving decision.
///
/// Priority order:
/// 1. non-GET method -> Bypass
/// 2. non-http(s) scheme or cross-origin -> Bypass
/// 3. navigation -> NetworkFirst(dynamic)
/// 4. static-asset extension -> CacheFirst(static)
/// 5. sounds prefix -> CacheFirst(dynamic)
/// 6. immutable framework prefix -> CacheFirst(dynamic)
/// 7. framework prefix -> StaleWhileRevalidate(dynamic)
/// 8. default -> NetworkFirst(dynamic)
pub fn classify(request: &Request, rules: &RouteRules) -> Decision {
  if !request.method.is_retrieval() {
    return Decision::Bypass;
  }

  let url = &request.url;
  if !matches!(url.scheme(), "http" | "https") {
    return Decision::Bypass;
  }
  if url.origin() != rules.origin.origin() {
    return Decision::Bypass;
  }

  if request.navigation {
    return Decision::Serve {
      strategy: Strategy::NetworkFirst,
      partition: PartitionRole::Dynamic,
    };
  }

  let path = url.path();

  if rules.static_extensions.iter().any(|ext| path.ends_with(ext)) {
    return Decision::Serve {
      strategy: Strategy::CacheFirst,
      partition: PartitionRole::Static,
    };
  }

  if path.starts_with(&rules.sounds_prefix) {
    return Decision::Serve {
      strategy: Strategy::CacheFirst,
      partition: PartitionRole::Dynamic,
    };
  }

  if path.starts_with(&rules.framework_immutable_prefix) {
    return Decision::Serve {
      strategy: Strategy::CacheFirst,
      partition: PartitionRole::Dynamic,
    };
  }

  if path.starts_with(&rules.framework_prefix) {
    return Decision::Serve {
      strategy: Strategy::StaleWhileRevalidate,
      partition: PartitionRole::Dynamic,
    };
  }

  Decision::Serve {
    strategy: Strategy::NetworkFirst,
    partition: PartitionRole::Dynamic,
  }
}
