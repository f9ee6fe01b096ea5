//! The `tern` binary: serves a directory, configured by a TOML file and command line flags.
//!
//! ```text
//! tern --root ./public --port 8080
//! tern --config tern.toml --log-level debug
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tern_http::config::{ConfigError, ServerConfig};
use tern_http::server::{Server, ServerError};
use thiserror::Error;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "tern", version, about = "A small HTTP/1.1 file server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// address to listen on, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// directory to serve, overrides the configuration
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// maximum number of connections served concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// generate listings for directories without an index file
    #[arg(long)]
    listing: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root) = self.root {
            config.files.root = Some(root);
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.listing {
            config.files.allow_generated_index = true;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder().with_max_level(args.log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {e}");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(cause = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), AppError> {
    let config = args.into_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        let server = Server::builder().config(config).build()?;
        let handle = server.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received ctrl-c");
                handle.stop();
            }
        });
        server.start().await?;
        Ok::<(), AppError>(())
    })
}
