mod bluetooth;
mod config;
mod ipc;
mod session;

use config::BridgeConfig;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = BridgeConfig::from_env();

    info!("Brickbridge starting");
    info!("  socket: {}", config.socket_path.display());
    info!("  rfcomm channel: {}", config.rfcomm_channel);
    info!("  inquiry duration: {:?}", config.inquiry_duration);

    if let Err(e) = ipc::run(config).await {
        error!("Bridge terminated: {}", e);
        std::process::exit(1);
    }
}
