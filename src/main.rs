use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};

use campfire_valley::{
    campfire::{CamperRegistry, NoopCamper},
    cli::manifest_path_from_args,
    config::ValleyConfig,
    logging::init_tracing,
    valley::Valley,
};

#[tokio::main]
async fn main() -> Result<()> {
    let manifest_path = manifest_path_from_args()?;
    let config = ValleyConfig::load_or_default(&manifest_path, "valley")
        .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;

    let logging_guard = init_tracing(&config.logging)?;
    tracing::info!(
        target: "main",
        run_id = %logging_guard.run_id(),
        valley = %config.name,
        "valley_process_starting"
    );

    let registry = Arc::new(CamperRegistry::new());
    registry
        .register("camper/noop@v1", NoopCamper::factory())
        .context("failed to register default campers")?;

    let campfire_configs = config.campfires.clone();
    let valley = Valley::new(config).with_camper_registry(registry);
    valley.start().await.context("failed to start valley")?;

    for campfire_config in campfire_configs {
        let name = campfire_config.name.clone();
        if let Err(err) = valley.provision_campfire(campfire_config).await {
            // Tear the valley down before bailing so the dock and broker
            // are not left running.
            valley.stop().await;
            return Err(err).with_context(|| format!("failed to provision campfire '{name}'"));
        }
    }

    wait_for_shutdown_signal().await?;
    tracing::info!(target: "main", "shutdown_signal_received");
    valley.stop().await;

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}
