use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::lifecycle::{PartitionNames, PrecacheManifest};
use crate::router::RouteRules;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub worker: WorkerConfig,
  #[serde(default)]
  pub routes: RouteConfig,
  #[serde(default)]
  pub precache: PrecacheConfig,
  /// Override for the cache database location
  pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Origin the worker is scoped to, e.g. "https://app.example.com".
  /// Requests to any other origin are bypassed.
  pub origin: String,
  /// Base path under the origin, e.g. "/doit" for project-page deployments
  #[serde(default)]
  pub base_path: String,
  /// Deployment generation id, e.g. "v3". Bumping it makes activation
  /// drop all prior-generation partitions.
  pub generation: String,
  /// Reserved partition-name prefix; every partition this worker manages
  /// is named "{cache_prefix}-{role}-{generation}"
  #[serde(default = "default_cache_prefix")]
  pub cache_prefix: String,
  /// Title used when a push payload carries none
  #[serde(default = "default_app_title")]
  pub app_title: String,
}

fn default_cache_prefix() -> String {
  "app".to_string()
}

fn default_app_title() -> String {
  "App".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
  /// Path suffixes routed cache-first into the static partition
  pub static_extensions: Vec<String>,
  /// Prefix for bundled media, cache-first into the dynamic partition
  pub sounds_prefix: String,
  /// Hashed framework build output, cache-first into the dynamic partition
  pub framework_immutable_prefix: String,
  /// Broader framework prefix, served stale-while-revalidate
  pub framework_prefix: String,
}

impl Default for RouteConfig {
  fn default() -> Self {
    Self {
      static_extensions: [
        ".png",
        ".jpg",
        ".jpeg",
        ".gif",
        ".webp",
        ".svg",
        ".ico",
        ".woff",
        ".woff2",
        ".ttf",
        ".eot",
        ".css",
        ".js",
        ".webmanifest",
        ".json",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      sounds_prefix: "/sounds/".to_string(),
      framework_immutable_prefix: "/_next/static/".to_string(),
      framework_prefix: "/_next/".to_string(),
    }
  }
}

/// Asset lists fetched eagerly at install time. Paths are relative to the
/// worker's origin + base path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrecacheConfig {
  /// App shell and icons, precached into the static partition
  pub static_assets: Vec<String>,
  /// Ambient sound files, precached into the dynamic partition
  pub sounds: Vec<String>,
}

impl Default for PrecacheConfig {
  fn default() -> Self {
    Self {
      static_assets: [
        "/",
        "/favicon.ico",
        "/favicon.svg",
        "/favicon-16x16.png",
        "/favicon-32x32.png",
        "/apple-touch-icon.png",
        "/android-chrome-192x192.png",
        "/android-chrome-512x512.png",
        "/site.webmanifest",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      sounds: [
        "/sounds/10-minutes-swedish-summer-evening-19559.mp3",
        "/sounds/bushes-medium-heavy-wind-in-dry-vegetation-19537.mp3",
        "/sounds/crickets_night_2-19628.mp3",
        "/sounds/cricketsandfrogs-19596.mp3",
        "/sounds/field-recording-backyard-new-york-19524.mp3",
        "/sounds/gentle-rain-on-window-for-sleep-422420.mp3",
        "/sounds/light-rain-on-metal-roof-114527.mp3",
        "/sounds/rain-and-distant-thunder-60230.mp3",
        "/sounds/rain-and-thunder-61426.mp3",
        "/sounds/relaxing-rain-387677.mp3",
        "/sounds/relaxing-rain-444802.mp3",
        "/sounds/rooftop-city-neighbourhood-morning-distant-traffic-residents-activity-19574.mp3",
        "/sounds/sea-sound-4-19385.mp3",
        "/sounds/small-town-ambiance-60015.mp3",
        "/sounds/sweden-springtime-birds-field-recording-190420-19629.mp3",
        "/sounds/tranquil-flow-387676.mp3",
        "/sounds/tranquil-stream-387678.mp3",
        "/sounds/winter-morning-60210.mp3",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offkit.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offkit/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offkit/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offkit.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offkit").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The worker's own origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.worker.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.worker.origin, e))
  }

  /// Resolve a base-relative path to an absolute URL.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    let origin = self.origin_url()?;
    let full = format!("{}{}", self.worker.base_path, path);
    origin
      .join(&full)
      .map_err(|e| eyre!("Invalid precache path {}: {}", path, e))
  }

  /// The root document, precached as the last-resort navigation fallback.
  pub fn root_document(&self) -> Result<Url> {
    self.resolve("/")
  }

  pub fn route_rules(&self) -> Result<RouteRules> {
    Ok(RouteRules {
      origin: self.origin_url()?,
      static_extensions: self.routes.static_extensions.clone(),
      sounds_prefix: self.routes.sounds_prefix.clone(),
      framework_immutable_prefix: self.routes.framework_immutable_prefix.clone(),
      framework_prefix: self.routes.framework_prefix.clone(),
    })
  }

  pub fn partition_names(&self) -> PartitionNames {
    PartitionNames::new(&self.worker.cache_prefix, &self.worker.generation)
  }

  pub fn precache_manifest(&self) -> Result<PrecacheManifest> {
    let static_urls = self
      .precache
      .static_assets
      .iter()
      .map(|p| self.resolve(p))
      .collect::<Result<Vec<_>>>()?;
    let sound_urls = self
      .precache
      .sounds
      .iter()
      .map(|p| self.resolve(p))
      .collect::<Result<Vec<_>>>()?;

    Ok(PrecacheManifest {
      static_urls,
      sound_urls,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn minimal_yaml() -> &'static str {
    r#"
worker:
  origin: "https://pages.example.com"
  base_path: "/doit"
  generation: "v3"
  cache_prefix: "doit"
"#
  }

  #[test]
  fn minimal_config_gets_route_and_precache_defaults() {
    let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();

    assert_eq!(config.worker.generation, "v3");
    assert!(config.routes.static_extensions.contains(&".png".to_string()));
    assert_eq!(config.routes.sounds_prefix, "/sounds/");
    assert!(config
      .precache
      .static_assets
      .contains(&"/site.webmanifest".to_string()));
  }

  #[test]
  fn default_manifest_precaches_the_bundled_sounds() {
    let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();

    assert_eq!(config.precache.sounds.len(), 18);
    assert!(config
      .precache
      .sounds
      .iter()
      .all(|p| p.starts_with("/sounds/") && p.ends_with(".mp3")));

    // They resolve into the manifest's dynamic-partition list
    let manifest = config.precache_manifest().unwrap();
    assert_eq!(manifest.sound_urls.len(), 18);
    assert!(manifest
      .sound_urls
      .iter()
      .any(|u| u.as_str() == "https://pages.example.com/doit/sounds/winter-morning-60210.mp3"));
  }

  #[test]
  fn manifest_urls_resolve_against_origin_and_base_path() {
    let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
    let manifest = config.precache_manifest().unwrap();

    assert_eq!(
      manifest.static_urls[0].as_str(),
      "https://pages.example.com/doit/"
    );
    assert!(manifest
      .static_urls
      .iter()
      .any(|u| u.as_str() == "https://pages.example.com/doit/favicon.ico"));
  }

  #[test]
  fn partition_names_come_from_prefix_and_generation() {
    let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
    let names = config.partition_names();

    assert_eq!(names.static_partition(), "doit-static-v3");
    assert_eq!(names.dynamic_partition(), "doit-dynamic-v3");
    assert_eq!(names.version(), "doit-cache-v3");
  }

  #[test]
  fn invalid_origin_is_rejected() {
    let config: Config = serde_yaml::from_str(
      r#"
worker:
  origin: "not a url"
  generation: "v1"
"#,
    )
    .unwrap();

    assert!(config.origin_url().is_err());
  }
}
