use plantpulse_core::GatewayConfig;
use plantpulse_server::GatewayServer;
use plantpulse_source::{PollerConfig, SimulatedSource, SourcePoller};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,plantpulse_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("PlantPulse gateway starting...");

    let config = GatewayConfig::from_env()?;
    let listen_addr = config.listen_addr;
    let poll_interval = config.poll_interval();
    let source_url = config.source_url.clone();

    let server = GatewayServer::from_config(config)?;
    let registry = server.registry();

    // Updates flow: poller -> channel -> hub
    let (update_tx, update_rx) = mpsc::channel(1024);
    let pump_handle = server.spawn_update_pump(update_rx);

    // The OPC-UA endpoint is an external collaborator behind PlantSource.
    // Until a production driver is wired in, the simulator stands in for
    // the endpoint at `source_url`.
    tracing::info!(source = %source_url, "using simulated source");
    let source = SimulatedSource::from_registry(&registry);
    let poller = SourcePoller::new(
        registry,
        source,
        PollerConfig {
            poll_interval,
            ..PollerConfig::default()
        },
    );
    let poller_handle = poller.start(update_tx);

    // Serve HTTP + WebSocket
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("gateway server error: {}", e);
        }
    });

    tracing::info!("PlantPulse gateway ready!");
    tracing::info!("   Login:  http://{}/login", listen_addr);
    tracing::info!("   Stream: ws://{}/stream", listen_addr);
    tracing::info!("   Tags:   http://{}/tags", listen_addr);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = server_handle => {
            tracing::warn!("gateway server stopped");
        }
        _ = pump_handle => {
            tracing::warn!("update pump stopped");
        }
    }

    poller_handle.stop();
    poller_handle.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
