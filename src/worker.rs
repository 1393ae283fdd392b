//! The worker: one deployment generation's event dispatcher.
//!
//! The host's interception point feeds events in through [`Worker::dispatch`]
//! (or the typed methods behind it) and awaits the returned future; that
//! await is the explicit replacement for the platform "keep me alive until
//! my async work settles" primitive. A slow fetch never blocks another:
//! every event is an independent task over shared `Arc` state.

use color_eyre::Result;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::config::Config;
use crate::control::{ControlChannel, ControlMessage, ControlRequest};
use crate::lifecycle::{LifecycleManager, WorkerState};
use crate::net::{cache_key_for, Fetcher, Method, Request, Response};
use crate::notify::{NotificationPayload, NotificationSink};
use crate::router::{classify, Decision, PartitionRole, RouteRules, Strategy};
use crate::store::{CacheStore, PartitionHandle};
use crate::strategy::StrategyEngine;

/// Events the host can deliver to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  /// Run the install transition (precache).
  Install,
  /// Run the activate transition (partition GC).
  Activate,
  /// An intercepted outgoing request.
  Fetch(Request),
  /// An out-of-band control command.
  Message(ControlMessage),
  /// A push payload from the platform.
  Push(Vec<u8>),
  /// The user clicked a displayed notification.
  NotificationClick,
}

/// What a dispatched event produced.
#[derive(Debug)]
pub enum EventOutcome {
  /// The event completed without producing a response.
  Done,
  /// The response to hand back to the intercepted request.
  Response(Response),
}

/// A worker instance bound to a store, a fetcher and one configuration
/// generation.
pub struct Worker<S: CacheStore, F: Fetcher> {
  fetcher: Arc<F>,
  lifecycle: Arc<LifecycleManager<S, F>>,
  control: ControlChannel<S, F>,
  engine: StrategyEngine<S, F>,
  rules: RouteRules,
  static_partition: PartitionHandle,
  dynamic_partition: PartitionHandle,
  root_url: Url,
  app_title: String,
  sink: Option<Arc<dyn NotificationSink>>,
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  /// Build a worker from configuration. Fails if the current-generation
  /// partitions cannot be opened: a worker without its target stores
  /// cannot do anything useful.
  pub fn new(store: Arc<S>, fetcher: Arc<F>, config: &Config) -> Result<Self> {
    let rules = config.route_rules()?;
    let names = config.partition_names();
    let root_url = config.root_document()?;

    let static_partition = store.open(&names.static_partition())?;
    let dynamic_partition = store.open(&names.dynamic_partition())?;

    let lifecycle = Arc::new(LifecycleManager::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      names,
      config.precache_manifest()?,
    ));

    let engine = StrategyEngine::new(Arc::clone(&store), Arc::clone(&fetcher))
      .with_navigation_fallback(static_partition.clone(), cache_key_for(Method::Get, &root_url));

    Ok(Self {
      fetcher,
      control: ControlChannel::new(Arc::clone(&lifecycle)),
      lifecycle,
      engine,
      rules,
      static_partition,
      dynamic_partition,
      root_url,
      app_title: config.worker.app_title.clone(),
      sink: None,
    })
  }

  /// Attach the host's notification surface.
  pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
    self.sink = Some(sink);
    self
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  pub fn version(&self) -> String {
    self.lifecycle.version()
  }

  /// Dispatch one event. The returned future settles only once all of the
  /// event's foreground work has; background revalidations keep running on
  /// their own tasks.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    match event {
      WorkerEvent::Install => {
        self.install().await?;
        Ok(EventOutcome::Done)
      }
      WorkerEvent::Activate => {
        self.activate().await?;
        Ok(EventOutcome::Done)
      }
      WorkerEvent::Fetch(request) => {
        let response = self.handle_fetch(&request).await?;
        Ok(EventOutcome::Response(response))
      }
      WorkerEvent::Message(message) => {
        self.handle_message(message).await?;
        Ok(EventOutcome::Done)
      }
      WorkerEvent::Push(data) => {
        self.handle_push(&data);
        Ok(EventOutcome::Done)
      }
      WorkerEvent::NotificationClick => {
        self.handle_notification_click();
        Ok(EventOutcome::Done)
      }
    }
  }

  /// Precache the manifest into the current-generation partitions.
  pub async fn install(&self) -> Result<()> {
    self.lifecycle.install().await
  }

  /// Garbage-collect superseded generations and take control.
  pub async fn activate(&self) -> Result<()> {
    self.lifecycle.activate().await
  }

  /// Serve one intercepted request. Bypassed requests go straight to the
  /// network with no caching side effect; errors included, nothing is
  /// substituted for them.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Response> {
    match classify(request, &self.rules) {
      Decision::Bypass => self.fetcher.fetch(request).await,
      Decision::Serve {
        strategy,
        partition,
      } => {
        let handle = match partition {
          PartitionRole::Static => &self.static_partition,
          PartitionRole::Dynamic => &self.dynamic_partition,
        };

        match strategy {
          Strategy::CacheFirst => Ok(self.engine.cache_first(request, handle).await),
          Strategy::NetworkFirst => Ok(self.engine.network_first(request, handle).await),
          Strategy::StaleWhileRevalidate => {
            self.engine.stale_while_revalidate(request, handle).await
          }
        }
      }
    }
  }

  /// Handle one control command.
  pub async fn handle_message(&self, message: ControlMessage) -> Result<()> {
    self.control.dispatch(message).await
  }

  /// Handle a wire-format control command, returning the serialized reply
  /// if the command expects one.
  pub async fn handle_request(&self, request: ControlRequest) -> Result<Option<String>> {
    self.control.dispatch_request(request).await
  }

  /// Render a push payload through the notification sink. Failures are
  /// logged and swallowed; a bad payload must never take the worker down.
  pub fn handle_push(&self, data: &[u8]) {
    let Some(sink) = &self.sink else {
      return;
    };

    match NotificationPayload::from_push(data, &self.app_title) {
      Ok(payload) => {
        if let Err(e) = sink.show(&payload) {
          warn!("Failed to show notification: {}", e);
        }
      }
      Err(e) => warn!("Ignoring malformed push payload: {}", e),
    }
  }

  /// Route a notification click back to the app's root URL.
  pub fn handle_notification_click(&self) {
    let Some(sink) = &self.sink else {
      return;
    };

    if let Err(e) = sink.open(&self.root_url) {
      warn!("Failed to open {}: {}", self.root_url, e);
    }
  }
}
