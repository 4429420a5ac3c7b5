use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fabric_common::config::FabricConfig;
use fabric_common::protocol::HelloHeaders;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fabric_router::control_channel::{self, WsRouterControlChannel};
use fabric_router::{DialWorkerPool, LinkRegistry, NullDialer};

#[derive(Parser, Debug)]
#[command(name = "fabric-router")]
struct Cli {
    /// This router's id, as advertised to the controller.
    #[arg(long)]
    router_id: String,

    /// WebSocket URL of the controller's control-channel endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:7443/control")]
    controller_url: String,

    /// Path to this router's hello headers (listeners/dialers), TOML.
    #[arg(long)]
    hello: Option<PathBuf>,

    /// Path to a TOML config file. Absent fields fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,
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

    let hello: HelloHeaders = match &cli.hello {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        }
        None => HelloHeaders {
            version: Some(vec![1]),
            ..Default::default()
        },
    };

    let registry = Arc::new(LinkRegistry::new());
    let (dial_tx, dial_rx) = mpsc::channel(config.dial_worker_count * 2);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(64);

    let control: Arc<dyn fabric_common::protocol::ControlChannel> =
        Arc::new(WsRouterControlChannel::new(outgoing_tx));

    let pool = DialWorkerPool::new(
        registry.clone(),
        Arc::new(NullDialer),
        control,
        config.dial_worker_count,
    );
    tokio::spawn(async move {
        pool.run(dial_rx).await;
    });

    info!(router_id = %cli.router_id, controller_url = %cli.controller_url, "fabric-router starting");
    control_channel::run(
        cli.controller_url,
        cli.router_id,
        hello,
        registry,
        dial_tx,
        outgoing_rx,
    )
    .await;

    Ok(())
}
