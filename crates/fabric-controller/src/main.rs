use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use clap::Parser;
use fabric_common::config::FabricConfig;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fabric_controller::network::Network;
use fabric_controller::transport;

#[derive(Parser, Debug)]
#[command(name = "fabric-controller")]
struct Cli {
    /// Path to a TOML config file. Absent fields fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address the control-channel WebSocket endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:7443")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            FabricConfig::from_toml_str(&raw)?
        }
        None => FabricConfig::default(),
    };

    let network = Arc::new(Network::new(config));

    spawn_missing_link_scanner(network.clone());

    let app = axum::Router::new()
        .route("/control", get(transport::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(network.clone());

    info!(listen = %cli.listen, "fabric-controller starting");
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically diffs actual vs. desired link topology and dispatches
/// dials for the gap, then sweeps expired pending links. Mirrors
/// `strata-control`'s periodic reconciliation task.
fn spawn_missing_link_scanner(network: Arc<Network>) {
    let interval = network.config().missing_link_scan_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let dispatched = network.run_missing_link_scan();
            let expired = network.clear_expired_pending();
            if dispatched > 0 || expired > 0 {
                info!(dispatched, expired, "missing-link scan complete");
            }
        }
    });
}
