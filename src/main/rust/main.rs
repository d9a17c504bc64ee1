use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pipeline_camera_push::infrastructure::http;
use pipeline_camera_push::{
    Config, HealthStore, LogFormat, ProcessPipeline, PrometheusReporter, RetryWatchdog,
};

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => return,
    }

    info!(event = "shutdown_requested", "Received shutdown signal");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;
    let settings = config.load()?;

    // Initialize logging
    let level = if config.verbose {
        "debug"
    } else {
        settings.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match settings.logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    let stream = settings.stream;
    info!("Starting camera push pipeline");
    info!("  Camera: {} {}", stream.source().kind().as_str(), stream.source().resolution());
    info!("  Destination: {}", stream.destination().url());
    info!("  Health port: {}", stream.health_port());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // Start health server; a port that cannot be bound is fatal
    let health = HealthStore::new();
    let server_shutdown = CancellationToken::new();
    let (addr, server) = http::bind(health.clone(), stream.health_port(), server_shutdown.clone())
        .map_err(|e| anyhow::anyhow!("Failed to bind health port {}: {}", stream.health_port(), e))?;
    info!("Health server listening on http://{}", addr);
    let health_server = tokio::spawn(server);

    // Create infrastructure implementations (dependency injection)
    let runner = Box::new(ProcessPipeline::new(
        stream.markers().clone(),
        stream.stop_grace(),
    ));
    let metrics_reporter = Arc::new(PrometheusReporter::new());

    let mut watchdog = RetryWatchdog::new(runner, stream, health, metrics_reporter, cancel.clone());
    let final_state = watchdog.run().await;
    info!("Watchdog finished in state {}", final_state);

    // Stop the signal listener and the health server
    cancel.cancel();
    server_shutdown.cancel();
    health_server.await?;

    info!("Pipeline shutdown complete");
    Ok(())
}
