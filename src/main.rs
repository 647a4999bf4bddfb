//! httpdump: record HTTP exchanges to disk and serve them back.
//!
//! # Architecture Overview
//!
//! ```text
//!   record                                     serve
//!   ──────                                     ─────
//!   CLI request                                fixture dir
//!       │                                          │
//!       ▼                                          ▼
//!   ┌──────────┐   ┌────────────┐          ┌──────────────┐
//!   │ Recorder │──▶│ http client│──▶ upstream │ ReplayIndex │
//!   └────┬─────┘   └────────────┘          └──────┬───────┘
//!        │ tees                                   ▼
//!        ▼                                 ┌──────────────┐
//!   <dir>/<n>.log                          │   Replayer   │◀── live request
//!   <dir>/bodies/<path>.json               └──────┬───────┘
//!                                                 ▼
//!                                          recorded response
//! ```

use std::path::PathBuf;

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use http::Request;
use http_body_util::{BodyExt, Full};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use httpdump::capture::BoxError;
use httpdump::config::{self, DumpConfig};
use httpdump::lifecycle::signals;
use httpdump::observability::{logging, metrics};
use httpdump::{DirSinkProvider, HttpServer, Recorder, Shutdown};

#[derive(Parser)]
#[command(name = "httpdump")]
#[command(about = "Record HTTP traffic and replay it as a stand-in server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve recorded exchanges
    Serve(ServeArgs),
    /// Perform one request and record it
    Record(RecordArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Fixture directory (overrides `replay.dir`)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Bind address (overrides `replay.bind_address`)
    #[arg(long)]
    listen: Option<String>,
}

#[derive(Args)]
struct RecordArgs {
    /// Dump directory (overrides `capture.dir`)
    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header, `NAME: VALUE`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    url: String,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => DumpConfig::default(),
    };
    logging::init(&config.observability);

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Serve(args) => serve(config, args).await,
        Commands::Record(args) => record(config, args).await,
    }
}

async fn serve(mut config: DumpConfig, args: ServeArgs) -> Result<(), BoxError> {
    if let Some(dir) = args.dir {
        config.replay.dir = Some(dir);
    }
    if let Some(listen) = args.listen {
        config.replay.bind_address = listen;
    }

    tracing::info!(
        dir = ?config.replay.dir,
        bind_address = %config.replay.bind_address,
        request_timeout_secs = config.replay.request_timeout_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.replay.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(signals::trigger_on_ctrl_c(shutdown));

    server.run(listener, receiver).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn record(mut config: DumpConfig, args: RecordArgs) -> Result<(), BoxError> {
    if let Some(dir) = args.dir {
        config.capture.dir = dir;
    }

    let provider = DirSinkProvider::from_config(&config.capture)?;
    let recorder = Recorder::new(provider);
    let client = httpdump::http::client::build();

    let mut builder = Request::builder()
        .method(args.method.as_str())
        .uri(args.url.as_str());
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("invalid header '{header}', expected NAME: VALUE"))?;
        builder = builder.header(name.trim(), value.trim());
    }
    let request = builder.body(Full::new(Bytes::from(args.data.unwrap_or_default())))?;

    let response = recorder.execute(&client, request).await?;
    tracing::info!(status = response.status().as_u16(), url = %args.url, "Response received");

    let mut body = response.into_body();
    let mut stdout = tokio::io::stdout();
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame?.into_data() {
            stdout.write_all(&data).await?;
        }
    }
    stdout.flush().await?;
    Ok(())
}
