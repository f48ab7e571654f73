//! varsend-viewer CLI - receives and prints var_send debug dumps.
//!
//! This is the main binary entry point. See the `varsend_viewer` library
//! for the pipeline itself.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio::sync::mpsc;

use varsend_viewer::constants::{DEFAULT_HOST, DEFAULT_PORT};
use varsend_viewer::{
    client, Config, ConnectionErrorEntry, ConnectionHandler, ConnectionStatus, EventSink,
    MessageSink, MessageStore, ObservabilitySink, ParsedMessage, ViewerEvent, ViewerServer,
};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "varsend-viewer")]
#[command(version)]
#[command(about = "Receive and inspect var_send debug dumps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for dumps and print each one as it arrives
    Listen {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Largest accepted body in bytes
        #[arg(long)]
        max_body_size: Option<u64>,
        /// Per-read timeout in seconds (0 disables)
        #[arg(long)]
        read_timeout: Option<u64>,
        /// Accept several frames per connection
        #[arg(long)]
        multi_frame: bool,
        /// Print each message as a JSON line instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Send a file (or stdin) to a viewer as one dump
    Send {
        /// Viewer address
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        /// Viewer port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// File to send; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("VARSEND_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.format_timestamp_millis().init();
    Ok(())
}

/// Print one delivered message to stdout.
fn print_message(message: &ParsedMessage, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(message)?);
    } else {
        println!(
            "#{} {} {} {} vars {} bytes  {}",
            message.id,
            message.received_at.format("%H:%M:%S"),
            message.peer,
            message.variables.len(),
            message.size_bytes,
            message.preview()
        );
    }
    Ok(())
}

/// Print the error just recorded for a connection.
fn print_connection_error(entry: &ConnectionErrorEntry, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "connection_error": serde_json::to_value(entry)? })
        );
    } else {
        println!(
            "!  {} {} {}",
            entry.at.format("%H:%M:%S"),
            entry.peer,
            entry.error
        );
    }
    Ok(())
}

async fn run_listen(config: Config, json: bool) -> Result<()> {
    let limits = config.frame_limits()?;
    let store = MessageStore::new(config.store_capacity);
    let status = ConnectionStatus::with_capacity(config.store_capacity);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ViewerEvent>();
    let sink = Arc::new(EventSink::new(event_tx));
    let handler = ConnectionHandler::new(
        limits,
        config.connection_mode(),
        Arc::clone(&sink) as Arc<dyn MessageSink>,
        sink as Arc<dyn ObservabilitySink>,
    );

    let server = ViewerServer::start(&config.host, config.port, handler)?;
    log::info!(
        "varsend-viewer v{} ready on {}",
        env!("CARGO_PKG_VERSION"),
        server.local_addr()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(ViewerEvent::Message(message)) => {
                    print_message(&message, json)?;
                    store.deliver(message);
                }
                Some(ViewerEvent::ConnectionError { peer, error, at }) => {
                    status.record(peer, error, at);
                    if let Some(entry) = status.last_error() {
                        print_connection_error(&entry, json)?;
                    }
                }
                None => break,
            },
            _ = &mut shutdown => {
                log::info!("Shutting down...");
                break;
            }
        }
    }

    server.shutdown();
    let stats = store.stats();
    log::info!(
        "Received {} message(s), {} bytes from {} client(s); {} peer(s) with errors",
        stats.message_count,
        stats.total_bytes,
        stats.client_count,
        status.peer_count()
    );
    if let Some(entry) = status.last_error() {
        log::info!("Last connection error: {} from {}", entry.error, entry.peer);
    }
    Ok(())
}

async fn run_send(host: &str, port: u16, file: Option<PathBuf>) -> Result<()> {
    let body = match file {
        Some(path) => std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    let written = client::send_dump(host, port, &body).await?;
    log::info!("Sent {written} bytes to {host}:{port}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            host,
            port,
            config,
            max_body_size,
            read_timeout,
            multi_frame,
            json,
        } => {
            let mut cfg = Config::load(config.as_deref())?;
            if let Some(host) = host {
                cfg.host = host;
            }
            if let Some(port) = port {
                cfg.port = port;
            }
            if let Some(size) = max_body_size {
                cfg.max_body_size = size;
            }
            if let Some(secs) = read_timeout {
                cfg.read_timeout_secs = (secs > 0).then_some(secs);
            }
            if multi_frame {
                cfg.multi_frame = true;
            }
            run_listen(cfg, json).await?;
        }
        Commands::Send { host, port, file } => {
            run_send(&host, port, file).await?;
        }
    }

    Ok(())
}
