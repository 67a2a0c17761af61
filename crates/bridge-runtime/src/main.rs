//! # Prompt Bridge Runtime
//!
//! Entry point for the prompt bridge.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration from the environment
//! 3. Create the event bus and the loopback node
//! 4. Run the bridge service: it provisions the plugin instance on the first
//!    heartbeat from the target node, then binds the HTTP listener
//! 5. Stop on Ctrl+C; prompts still pending are cancelled

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bridge_runtime::{load_config, LoopbackNode, LOOPBACK_HEARTBEAT_INTERVAL};
use prompt_bridge::BridgeService;
use shared_bus::InMemoryEventBus;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let config = load_config().context("invalid bridge configuration")?;

    info!("===========================================");
    info!("  Prompt Bridge v{}", prompt_bridge::VERSION);
    info!("===========================================");
    info!("  Execution unit: {}", config.execution_unit());
    info!("  Plugin:         {}", config.target.signature);
    info!("  Listen:         {}{}", config.http_addr(), config.http.prompt_path);
    info!("  Timeout:        {:?}", config.timeouts.request);
    info!("===========================================");

    let bus = Arc::new(InMemoryEventBus::new());
    let node = Arc::new(LoopbackNode::new(config.target.node.clone(), bus.clone()));

    let service = BridgeService::new(config, bus, node.clone())
        .context("failed to create bridge service")?;

    // The service subscribes in `new`, so nothing the node emits is missed.
    node.announce("loopback").await;
    let responder = node.spawn_responder();
    let heartbeats = node.spawn_heartbeats(LOOPBACK_HEARTBEAT_INTERVAL);

    info!("Bridge is running. Press Ctrl+C to stop.");
    let result = service
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await;

    heartbeats.abort();
    responder.abort();

    result.context("bridge service failed")?;
    info!("Bridge shutdown complete");
    Ok(())
}
