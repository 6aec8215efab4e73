//! instant-listen
//!
//! Serves a static site whose preparation runs after the listener is bound.
//!
//! # Startup Sequence
//!
//! ```text
//!   config + env + flags
//!          │
//!          ▼
//!   DeferredHandler::new(site::prepare)      (nothing runs yet)
//!          │
//!          ▼
//!   TcpListener::bind ──▶ "Ready on http://…"
//!          │
//!          ▼
//!   AppServer::run ──▶ init() ──▶ site::prepare in background
//!          │                            │
//!          │ requests wait ◀────────────┤ Ready:  requests dispatched
//!          │                            └ Failed: 503s, process exits
//!          ▼
//!   graceful shutdown on SIGINT/SIGTERM
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use instant_listen::config::{
    apply_env_overrides, load_config, loader::set_port, validate_config, ConfigError,
    ServerConfig,
};
use instant_listen::lifecycle::{shutdown_signal, Shutdown};
use instant_listen::observability::{logging, metrics};
use instant_listen::site::{self, SiteOptions};
use instant_listen::{AppServer, DeferredHandler};

#[derive(Parser)]
#[command(name = "instant-listen")]
#[command(about = "Bind immediately, serve the site once it is prepared", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener port (overrides config and PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to serve.
    #[arg(long)]
    site_dir: Option<PathBuf>,

    /// Production mode: cacheable responses.
    #[arg(long)]
    production: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("instant-listen v{} starting", env!("CARGO_PKG_VERSION"));

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    if let Some(port) = cli.port {
        set_port(&mut config, port);
    }
    if let Some(site_dir) = cli.site_dir {
        config.startup.site_dir = site_dir;
    }
    if cli.production {
        config.startup.dev = false;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        site_dir = %config.startup.site_dir.display(),
        dev = config.startup.dev,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let options = SiteOptions {
        root: config.startup.site_dir.clone(),
        dev: config.startup.dev,
    };
    let handler = DeferredHandler::new(move || site::prepare(options));
    let ready = handler.ready_signal();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Ready on http://{}", local_addr);

    let exit_on_failure = config.startup.exit_on_failure;
    let server = AppServer::new(config, handler);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.trigger();
        }
    });

    tokio::select! {
        result = server.run(listener, server_shutdown) => result?,
        Err(err) = ready.wait(), if exit_on_failure => {
            tracing::error!(error = %err, "Request handler failed to initialize, exiting");
            return Err(err.into());
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
