//! Out-of-band control protocol.
//!
//! The host application can poke the worker at any lifecycle state:
//! force an early activation, ask which generation is running, or wipe
//! every reserved partition. Messages carry their reply channel, so the
//! dispatcher itself stays stateless.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;

use crate::lifecycle::{LifecycleManager, WorkerState};
use crate::net::Fetcher;
use crate::store::CacheStore;

/// Wire format of an incoming control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlRequest {
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  #[serde(rename = "GET_VERSION")]
  GetVersion,
  #[serde(rename = "CLEAR_CACHE")]
  ClearCache,
}

/// Reply to `GET_VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
  pub version: String,
}

/// Reply to `CLEAR_CACHE`, sent only after every deletion has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheReply {
  pub success: bool,
}

/// A control command paired with its reply channel.
#[derive(Debug)]
pub enum ControlMessage {
  /// Force `Waiting -> Activating` without waiting for old instances.
  SkipWaiting,
  GetVersion {
    reply: oneshot::Sender<VersionReply>,
  },
  ClearCache {
    reply: oneshot::Sender<ClearCacheReply>,
  },
}

/// Stateless command dispatcher over the lifecycle manager.
pub struct ControlChannel<S: CacheStore, F: Fetcher> {
  lifecycle: Arc<LifecycleManager<S, F>>,
}

impl<S: CacheStore, F: Fetcher> ControlChannel<S, F> {
  pub fn new(lifecycle: Arc<LifecycleManager<S, F>>) -> Self {
    Self { lifecycle }
  }

  /// Handle one wire-format command and return the serialized reply, if
  /// the command expects one. This is the entry point for hosts speaking
  /// the JSON protocol; typed callers use [`dispatch`](Self::dispatch).
  pub async fn dispatch_request(&self, request: ControlRequest) -> Result<Option<String>> {
    match request {
      ControlRequest::SkipWaiting => {
        self.dispatch(ControlMessage::SkipWaiting).await?;
        Ok(None)
      }
      ControlRequest::GetVersion => {
        let (tx, rx) = oneshot::channel();
        self.dispatch(ControlMessage::GetVersion { reply: tx }).await?;
        let reply = rx.await.map_err(|e| eyre!("Reply channel closed: {}", e))?;
        Ok(Some(
          serde_json::to_string(&reply).map_err(|e| eyre!("Failed to serialize reply: {}", e))?,
        ))
      }
      ControlRequest::ClearCache => {
        let (tx, rx) = oneshot::channel();
        self.dispatch(ControlMessage::ClearCache { reply: tx }).await?;
        let reply = rx.await.map_err(|e| eyre!("Reply channel closed: {}", e))?;
        Ok(Some(
          serde_json::to_string(&reply).map_err(|e| eyre!("Failed to serialize reply: {}", e))?,
        ))
      }
    }
  }

  /// Handle one command. Reply channels whose receiver is gone are
  /// ignored; a dropped caller never crashes the worker.
  pub async fn dispatch(&self, message: ControlMessage) -> Result<()> {
    match message {
      ControlMessage::SkipWaiting => {
        if self.lifecycle.state() == WorkerState::Waiting {
          self.lifecycle.activate().await?;
        } else {
          warn!(
            "SkipWaiting ignored in state {:?}",
            self.lifecycle.state()
          );
        }
      }
      ControlMessage::GetVersion { reply } => {
        let _ = reply.send(VersionReply {
          version: self.lifecycle.version(),
        });
      }
      ControlMessage::ClearCache { reply } => {
        let success = match self.lifecycle.clear_all() {
          Ok(()) => true,
          Err(e) => {
            warn!("ClearCache failed: {}", e);
            false
          }
        };
        let _ = reply.send(ClearCacheReply { success });
      }
    }

    Ok(())
  }
}
