//! Push-notification collaborator interface.
//!
//! The engine only parses the push payload and hands it to a sink; how
//! notifications are displayed and how clicks get focus back is entirely
//! the host's business.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// A fully defaulted notification, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Opaque app data passed through unchanged
  pub data: Option<serde_json::Value>,
}

/// Push payloads arrive as sparse JSON; missing fields get defaults.
#[derive(Debug, Default, Deserialize)]
struct RawPayload {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  badge: Option<String>,
  data: Option<serde_json::Value>,
}

impl NotificationPayload {
  /// Parse a push payload, filling in the stock defaults for anything the
  /// sender left out. `default_title` is the host application's name.
  pub fn from_push(data: &[u8], default_title: &str) -> Result<Self> {
    let raw: RawPayload =
      serde_json::from_slice(data).map_err(|e| eyre!("Failed to parse push payload: {}", e))?;

    Ok(Self {
      title: raw.title.unwrap_or_else(|| default_title.to_string()),
      body: raw
        .body
        .unwrap_or_else(|| "You have a notification".to_string()),
      icon: raw
        .icon
        .unwrap_or_else(|| "/android-chrome-192x192.png".to_string()),
      badge: raw.badge.unwrap_or_else(|| "/favicon-32x32.png".to_string()),
      data: raw.data,
    })
  }
}

/// Host-side notification surface.
pub trait NotificationSink: Send + Sync {
  /// Display a notification.
  fn show(&self, payload: &NotificationPayload) -> Result<()>;

  /// Focus an existing client window on this URL, or open a new one.
  /// Invoked with the app's root URL when a notification is clicked.
  fn open(&self, url: &Url) -> Result<()>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sparse_payload_gets_defaults() {
    let payload = NotificationPayload::from_push(b"{}", "DoIt").unwrap();

    assert_eq!(payload.title, "DoIt");
    assert_eq!(payload.body, "You have a notification");
    assert_eq!(payload.icon, "/android-chrome-192x192.png");
    assert_eq!(payload.badge, "/favicon-32x32.png");
    assert!(payload.data.is_none());
  }

  #[test]
  fn full_payload_passes_through() {
    let json = br#"{
      "title": "Break over",
      "body": "Back to work",
      "icon": "/icon.png",
      "badge": "/badge.png",
      "data": {"pomodoro": 4}
    }"#;
    let payload = NotificationPayload::from_push(json, "DoIt").unwrap();

    assert_eq!(payload.title, "Break over");
    assert_eq!(payload.body, "Back to work");
    assert_eq!(payload.data.unwrap()["pomodoro"], 4);
  }

  #[test]
  fn malformed_payload_is_an_error() {
    assert!(NotificationPayload::from_push(b"not json", "DoIt").is_err());
  }
}
