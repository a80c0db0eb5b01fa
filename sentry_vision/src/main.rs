// Service runner: wires the collaborators from `ServiceConfig` and hands control
// to the supervisor until Ctrl-C.

use anyhow::{Context, Result};
use sentry_vision::classifier::{Classifier, HttpClassifier};
use sentry_vision::config::ServiceConfig;
use sentry_vision::inventory::FileInventory;
use sentry_vision::logging::init_logging;
use sentry_vision::persistence::FsSink;
use sentry_vision::pipeline::AnalysisPipeline;
use sentry_vision::stream::StreamConnector;
use sentry_vision::supervisor::{ShutdownSignal, Supervisor};
use sentry_vision::worker::WorkerContext;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    // --- 1. Configuration & Logging ---
    let config = ServiceConfig::from_env().context("Invalid configuration")?;
    init_logging(config.log_file.as_deref())?;
    tracing::info!(
        inventory = %config.inventory_path.display(),
        storage = %config.storage_dir.display(),
        violence_fps = config.rates.violence_fps,
        fire_fps = config.rates.fire_fps,
        "Sentry Vision starting"
    );

    // --- 2. Collaborators ---
    let connector = stream_connector()?;
    let inventory = Arc::new(FileInventory::new(&config.inventory_path));
    let sink = Arc::new(
        FsSink::open(&config.storage_dir)
            .with_context(|| format!("Failed to open storage at {}", config.storage_dir.display()))?,
    );

    let classifier: Option<Arc<dyn Classifier>> = match &config.classifier_url {
        Some(url) => Some(Arc::new(
            HttpClassifier::new(url.clone(), config.classifier_timeout)
                .context("Failed to build classifier client")?,
        )),
        None => {
            tracing::warn!("SENTRY_CLASSIFIER_URL not set, violence analysis disabled");
            None
        }
    };
    let pipeline = Arc::new(AnalysisPipeline::standard(
        classifier,
        &config.rates,
        config.fire.clone(),
    ));

    let worker_ctx = WorkerContext {
        connector,
        inventory: inventory.clone(),
        sink,
        pipeline,
        motion: config.motion.clone(),
        worker: config.worker.clone(),
    };

    // --- 3. Runtime ---
    // Camera workers live on the blocking pool; the async side only runs the supervisor.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let signal = ShutdownSignal::new();
    let mut supervisor = Supervisor::new(inventory, worker_ctx, config.supervisor.clone(), signal.clone());

    let summary = runtime.block_on(async move {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Interrupt received, shutting down");
                    signal.trigger();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
        supervisor.run().await
    });

    // Abandoned workers may still be blocked in a stream read; do not wait on them.
    runtime.shutdown_timeout(Duration::from_secs(1));
    tracing::info!(joined = summary.joined, abandoned = summary.abandoned, "Sentry Vision stopped");
    Ok(())
}

#[cfg(feature = "opencv")]
fn stream_connector() -> Result<Arc<dyn StreamConnector>> {
    Ok(Arc::new(sentry_vision::stream::OpenCvConnector::new()))
}

#[cfg(not(feature = "opencv"))]
fn stream_connector() -> Result<Arc<dyn StreamConnector>> {
    anyhow::bail!("built without a stream backend; rebuild with `--features opencv`")
}
