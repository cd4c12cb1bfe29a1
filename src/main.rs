//! azblob-provisioner -- Azure Blob bucket provisioning server.
//!
//! All provisioning state lives in memory. SIGTERM/SIGINT stop accepting
//! connections and wait for in-flight requests up to the configured timeout.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use azblob_provisioner::config::Config;
use azblob_provisioner::provisioner::Provisioner;
use azblob_provisioner::storage::memory::MemoryBackend;
use azblob_provisioner::storage::CloudStorageBackend;

/// Command-line arguments for the provisioner.
#[derive(Parser, Debug)]
#[command(
    name = "azblob-provisioner",
    version,
    about = "Azure Blob bucket provisioner"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "azblob-provisioner.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = azblob_provisioner::config::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        azblob_provisioner::metrics::init_metrics();
        azblob_provisioner::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let backend: Arc<dyn CloudStorageBackend> = Arc::new(MemoryBackend::new(
        &config.cloud.subscription_id,
        &config.cloud.endpoint_suffix,
    ));
    info!(
        "In-memory storage backend initialized: subscription='{}' suffix={}",
        config.cloud.subscription_id, config.cloud.endpoint_suffix
    );

    let provisioner = Provisioner::new(backend, config.cloud.provision_defaults());
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);

    let state = Arc::new(azblob_provisioner::AppState {
        config,
        provisioner: Arc::new(provisioner),
    });

    let app = azblob_provisioner::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("azblob-provisioner listening on {}", bind_addr);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => result?,
        _ = async {
            let _ = signalled_rx.await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!(
                "In-flight requests still running after {}s, exiting",
                shutdown_timeout.as_secs()
            );
        }
    }

    info!("azblob-provisioner shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
