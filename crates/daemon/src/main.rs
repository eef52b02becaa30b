//! slotswapd - slot marketplace service
//!
//! Usage: `slotswapd [CONFIG]`. Without an argument the config is read from
//! `$SLOTSWAP_CONFIG` or the platform config directory.

use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod startup;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting slotswapd");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    if let Err(e) = runtime.block_on(startup::run(config_path)) {
        tracing::error!("slotswapd stopped: {}", e);
        std::process::exit(1);
    }
}
