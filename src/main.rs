//! Astro-Coffee Server
//!
//! Loads the configuration, sets up logging and signal handling, and hands
//! the process to the [`Supervisor`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use astrocoffee::Supervisor;
use coffee_core::config::AppConfig;
use coffee_core::error::AppError;
use coffee_worker::source::{ArxivClient, ListingSource};

#[derive(Debug, Parser)]
#[command(name = "coffee-server", version, about = "Astro-Coffee listing server")]
struct Cli {
    /// Base directory the server runs from.
    #[arg(long, default_value = ".")]
    basedir: PathBuf,

    /// Configuration file. Defaults to `<basedir>/coffee_settings.toml`.
    #[arg(long, env = "COFFEE_CONFIG")]
    conf: Option<PathBuf>,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.conf
            .clone()
            .unwrap_or_else(|| self.basedir.join("coffee_settings.toml"))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config_path();

    let config = match AppConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            eprintln!(
                "Copy config/coffee_settings.toml to '{}' and edit it, or pass --conf <FILE>.",
                config_path.display()
            );
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(config = %config_path.display(), "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Astro-Coffee v{}", env!("CARGO_PKG_VERSION"));

    // Handlers go in before startup so an early signal is not fatal.
    let shutdown = shutdown_signal()?;

    let source: Option<Arc<dyn ListingSource>> = if config.arxiv.enabled {
        Some(Arc::new(ArxivClient::new(&config.arxiv)?))
    } else {
        None
    };

    Supervisor::start(config, source).await?.run(shutdown).await
}

/// Install the Ctrl+C and SIGTERM handlers and return a future that
/// resolves on the first signal.
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static, AppError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        Ok(async move {
            tokio::select! {
                _ = interrupt.recv() => tracing::info!("Received SIGINT"),
                _ = terminate.recv() => tracing::info!("Received SIGTERM"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        let ctrl_c = tokio::signal::ctrl_c();
        Ok(async move {
            if let Err(e) = ctrl_c.await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
    }
}
