//! Render Worker Service
//!
//! Runs the render worker pool against a Redis record store. Documents left
//! without a result by a previous run are re-admitted at startup.
//!
//! ## Architecture
//!
//! - **Store**: Redis hashes (`{prefix}:doc:{id}`) with fingerprint and pending indexes
//! - **Queue**: in-process bounded queue with per-document status tracking
//! - **Renderer**: headless Chromium HTML→PDF, or svg2pdf SVG→PDF
//! - **Telemetry**: OpenTelemetry OTLP export
//!
//! ## Configuration
//!
//! See `worker_render::config` for the environment variables; `RUST_LOG`
//! sets the log level (default: info).

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use worker_render::{
    chromium::ChromiumRenderer,
    config::{RendererKind, WorkerConfig},
    converter::{Renderer, SvgToPdfConverter},
    queue::JobQueue,
    record::RecordStore,
    service::ConverterService,
    storage::RedisRecordStore,
    telemetry,
    worker::WorkerPool,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    if let Err(e) = telemetry::init_telemetry() {
        warn!("Failed to initialize telemetry: {}", e);
    }

    info!("Starting render worker service");

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    info!(
        "Configuration: redis_url={}, key_prefix={}, concurrency={}, queue_capacity={}, render_timeout={:?}, renderer={:?}",
        config.redis_url,
        config.key_prefix,
        config.pool_size,
        config.queue_capacity,
        config.render_timeout,
        config.renderer
    );

    let store: Arc<dyn RecordStore> = Arc::new(
        RedisRecordStore::connect(&config.redis_url, config.key_prefix.clone())
            .await
            .context("Failed to connect to Redis")?,
    );

    let cancel = CancellationToken::new();
    let queue = Arc::new(JobQueue::new(config.queue_capacity));
    let renderer: Arc<dyn Renderer> = match config.renderer {
        RendererKind::Html => {
            info!("Rendering HTML with {}", config.chromium_path.display());
            Arc::new(ChromiumRenderer::new(
                config.chromium_path.clone(),
                config.render_timeout,
            ))
        }
        RendererKind::Svg => Arc::new(SvgToPdfConverter::new()),
    };

    let pool = WorkerPool::from_config(
        &config,
        queue.clone(),
        store.clone(),
        renderer,
        cancel.clone(),
    );

    let service = ConverterService::new(queue, store, cancel.clone());

    // Resuming can wait on a full queue, so it races the shutdown signal.
    let resume = async {
        match service.resume_pending().await {
            Ok(count) => info!("Startup recovery admitted {} documents", count),
            Err(e) => warn!("Startup recovery incomplete: {}", e),
        }
        std::future::pending::<()>().await
    };

    info!("Worker service ready, press Ctrl+C to shutdown");
    tokio::select! {
        signal = signal::ctrl_c() => signal.context("Failed to listen for Ctrl+C")?,
        _ = resume => {}
    }

    info!("Received shutdown signal, waiting for workers to finish...");
    pool.shutdown().await;

    info!("Worker service shutdown complete");
    Ok(())
}
