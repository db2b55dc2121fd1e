//! Savings server - building energy-saving prediction service
//!
//! Serves predictions from the active artifact generation and runs
//! training jobs in the background.

use anyhow::{Context, Result};
use engine_lib::{
    events::{EventSink, FanoutSink, JsonlSink, TracingSink},
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    ArtifactStore, ModelServingManager, TrainingJobScheduler, TrainingPipeline,
};
use savings_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting savings-server");

    let config = ServerConfig::load().context("invalid SAVINGS_* configuration")?;
    info!(
        instance = %config.instance_name,
        model_dir = %config.model_dir.display(),
        "Server configured"
    );

    let logger = StructuredLogger::new(&config.instance_name);
    let store = Arc::new(ArtifactStore::new(config.store())?);

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if let Some(dir) = &config.event_log_dir {
        sinks.push(Arc::new(JsonlSink::new(dir.clone())));
    }
    let sink: Arc<dyn EventSink> = Arc::new(FanoutSink::new(sinks));

    let pipeline = Arc::new(TrainingPipeline::new(config.training(), store.clone(), sink)?);
    let scheduler = Arc::new(TrainingJobScheduler::new(
        pipeline,
        config.scheduler(),
        logger.clone(),
    ));
    let manager = Arc::new(ModelServingManager::new(store, logger.clone()));
    logger.log_startup(SERVER_VERSION, &manager.status().model_version);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SERVING).await;
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        manager,
        scheduler,
    ));
    app_state.refresh_health().await;

    // Serving works from the rule fallback even without artifacts
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
