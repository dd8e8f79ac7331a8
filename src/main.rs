use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nexus_sync::config::Config;
use nexus_sync::event::EventHandler;
use nexus_sync::net::{HttpTransport, OutboundRequest};
use nexus_sync::store::SqliteStorage;
use nexus_sync::{ClientCommand, SyncCoordinator};

#[derive(Parser, Debug)]
#[command(name = "nexus-sync")]
#[command(about = "Offline-first request cache and write queue for NexusOS clients")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/nexus-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-warm the static store and activate this store generation
  Install,
  /// Send one request through the offline-first layer
  Fetch {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Treat as a top-level navigation (app shell fallback)
    #[arg(long)]
    navigate: bool,
  },
  /// Replay queued writes now
  Sync,
  /// Show writes waiting for delivery
  Status,
  /// Activate, then drain on background sync and connectivity restore until Ctrl-C
  Run,
}

/// Log to a file so stdout stays clean for command output.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
  let log_dir = config.log_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&log_dir, "nexus-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();

  Ok(guard)
}

fn build_request(
  config: &Config,
  url: &str,
  method: &str,
  headers: &[String],
  data: Option<String>,
  navigate: bool,
) -> Result<OutboundRequest> {
  let url = if url.starts_with('/') {
    config.resolve(url)?
  } else {
    url::Url::parse(url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?
  };

  let mut request = OutboundRequest::new(method, url);
  for header in headers {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Header must look like 'Name: value', got '{}'", header))?;
    request = request.with_header(name.trim(), value.trim());
  }
  if let Some(body) = data {
    request = request.with_body(body);
  }
  if navigate {
    request = request.as_navigation();
  }

  Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config)?;

  let storage = Arc::new(SqliteStorage::open(&config.database_path()?)?);
  let transport = Arc::new(HttpTransport::new(&config)?);
  let coordinator = SyncCoordinator::new(&config, storage, transport)?;

  match args.command {
    Command::Install => {
      if let Some(report) = coordinator.start().await? {
        for store in &report.deleted_stores {
          println!("deleted {}", store);
        }
        if report.migrated_items > 0 {
          println!("migrated {} queued writes", report.migrated_items);
        }
      }
      println!("{}", coordinator.lifecycle_state());
    }
    Command::Fetch {
      url,
      method,
      headers,
      data,
      navigate,
    } => {
      let request = build_request(&config, &url, &method, &headers, data, navigate)?;
      let response = coordinator.handle_request(&request).await?;
      eprintln!("{} {}", response.status, request.url);
      println!("{}", response.text());
    }
    Command::Sync => {
      let reply = coordinator.handle_command(ClientCommand::SyncNow).await?;
      println!("{}", serde_json::to_string_pretty(&reply)?);
    }
    Command::Status => {
      let reply = coordinator.handle_command(ClientCommand::QueueStatus).await?;
      println!("{}", serde_json::to_string_pretty(&reply)?);
    }
    Command::Run => {
      let mut events = EventHandler::new(
        config.background_sync_interval(),
        config.connectivity_probe_interval(),
        config.sync_tag.clone(),
      );

      coordinator.start().await?;
      info!(origin = %config.origin, "nexus-sync running");

      loop {
        tokio::select! {
          _ = tokio::signal::ctrl_c() => break,
          event = events.next() => match event {
            Some(event) => coordinator.handle_event(event).await,
            None => break,
          },
        }
      }

      info!("nexus-sync shutting down");
    }
  }

  Ok(())
}
