use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use url::Url;

use offkit::config::Config;
use offkit::control::{ControlMessage, ControlRequest};
use offkit::net::{HttpFetcher, Request};
use offkit::store::SqliteStore;
use offkit::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "offkit")]
#[command(about = "Offline-first request interception and caching engine")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offkit/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the manifest and activate this generation
  Install,
  /// Report the running generation id
  Version,
  /// Delete every partition under the reserved naming scheme
  ClearCache,
  /// Send a raw JSON control command, e.g. '{"type":"GET_VERSION"}'
  Control { message: String },
  /// Serve the given URLs through the engine and print the outcome
  Serve {
    urls: Vec<String>,
    /// Treat the requests as full-page navigations
    #[arg(long)]
    navigate: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  init_logging()?;

  let config = Config::load(args.config.as_deref())?;

  let store = match &config.store_path {
    Some(path) => SqliteStore::open(path)?,
    None => SqliteStore::open_default()?,
  };
  let worker = Worker::new(Arc::new(store), Arc::new(HttpFetcher::new()?), &config)?;

  match args.command {
    Command::Install => {
      worker.install().await?;
      worker.activate().await?;
      println!("Installed and activated {}", worker.version());
    }
    Command::Version => {
      let (tx, rx) = oneshot::channel();
      worker
        .handle_message(ControlMessage::GetVersion { reply: tx })
        .await?;
      println!("{}", rx.await?.version);
    }
    Command::ClearCache => {
      let (tx, rx) = oneshot::channel();
      worker
        .handle_message(ControlMessage::ClearCache { reply: tx })
        .await?;
      if !rx.await?.success {
        return Err(eyre!("Failed to clear the cache"));
      }
      println!("Cache cleared");
    }
    Command::Control { message } => {
      let request: ControlRequest = serde_json::from_str(&message)
        .map_err(|e| eyre!("Invalid control message {}: {}", message, e))?;
      if let Some(reply) = worker.handle_request(request).await? {
        println!("{}", reply);
      }
    }
    Command::Serve { urls, navigate } => {
      for raw in urls {
        let url = Url::parse(&raw).map_err(|e| eyre!("Invalid URL {}: {}", raw, e))?;
        let request = if navigate {
          Request::navigate(url)
        } else {
          Request::get(url)
        };

        match worker.handle_fetch(&request).await {
          Ok(response) => {
            println!("{} -> {} ({} bytes)", raw, response.status, response.body.len());
          }
          Err(e) => println!("{} -> error: {}", raw, e),
        }
      }
    }
  }

  Ok(())
}

/// Log to a file under the platform data directory so stdout stays clean
/// for command output. Filtered via RUST_LOG.
fn init_logging() -> Result<()> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("offkit");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(log_dir, "offkit.log");
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(appender)
    .with_ansi(false)
    .init();

  Ok(())
}
