use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use seqface_container::{Storage, StorageConfig};
use seqface_core::ObjectDetector;
use seqface_detect::RustfaceDetector;
use seqface_pipeline::{BatchConfig, BatchDriver, CancelFlag};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("seqface v{}", env!("CARGO_PKG_VERSION"));

    // Load or create config.
    let mut config = if let Some(config_path) = &cli.config {
        BatchConfig::load(config_path)?
    } else {
        BatchConfig::default()
    };
    if let Some(model) = &cli.model {
        config.detector.model_path = Some(model.to_string_lossy().into_owned());
    }

    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start metrics exporter")?;
        tracing::info!(%addr, "serving Prometheus metrics");
    }

    let code = match cli.command {
        Command::Process { input, format } => {
            let driver = Arc::new(build_driver(config)?);
            let cancel = cancel_on_shutdown();
            let location = driver.storage().resolve(&input)?;

            let worker = Arc::clone(&driver);
            let worker_cancel = cancel.clone();
            let mut result = tokio::task::spawn_blocking(move || {
                worker.process_location(&location, &worker_cancel)
            })
            .await?;
            result.cancelled |= cancel.is_cancelled();

            cli::render(&result, &format, &mut std::io::stdout().lock())?;
            cli::exit_code(&result)
        }
        Command::Batch {
            locations,
            ext,
            workers,
            format,
        } => {
            if let Some(ext) = ext {
                config.extension = ext;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.validate()?;
            tracing::info!(
                locations = locations.len(),
                extension = %config.extension,
                workers = config.workers,
                "batch processing"
            );

            let driver = Arc::new(build_driver(config)?);
            let extension = driver.config().extension.clone();
            let cancel = cancel_on_shutdown();
            let result = driver
                .process_concurrent(&locations, &extension, &cancel)
                .await;

            cli::render(&result, &format, &mut std::io::stdout().lock())?;
            cli::exit_code(&result)
        }
        Command::Pack { output, images } => {
            cli::pack(&output, &images)?;
            0
        }
    };

    Ok(ExitCode::from(code))
}

fn build_driver(config: BatchConfig) -> anyhow::Result<BatchDriver> {
    let detector: Arc<dyn ObjectDetector> = Arc::new(
        RustfaceDetector::from_config(config.detector.clone())
            .context("face detector unavailable (pass --model or set detector.model_path)")?,
    );
    let storage = Arc::new(build_storage(&config.storage));
    Ok(BatchDriver::new(storage, detector, config))
}

/// Local storage is built in; remote clients (hdfs, s3n) are registered by
/// embedding applications through `Storage::with_backend`.
fn build_storage(config: &StorageConfig) -> Storage {
    Storage::new(config.clone())
}

/// Flag that flips when Ctrl+C or SIGTERM arrives.
fn cancel_on_shutdown() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        flag.cancel();
    });
    cancel
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, finishing current records");
}
