//! Telemetry and structured logging for the render worker.

use crate::job::{JobOutcome, JobReport};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Renders slower than this are flagged.
const SLOW_RENDER_MS: i64 = 5000;

const TRACER_NAME: &str = "render-worker";

/// Records telemetry for an executed job.
///
/// Emits one OpenTelemetry span per job plus a structured log line carrying
/// the outcome, queue wait and execution time.
pub fn record_job_telemetry(report: &JobReport) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("render_job");

    span.set_attribute(KeyValue::new("document_id", report.document_id.to_string()));
    span.set_attribute(KeyValue::new("worker_id", report.worker_id as i64));
    span.set_attribute(KeyValue::new("outcome", report.outcome.label()));
    span.set_attribute(KeyValue::new("queued_ms", report.queued_ms));
    span.set_attribute(KeyValue::new("duration_ms", report.duration_ms));

    match &report.outcome {
        JobOutcome::Rendered { bytes } => {
            span.set_attribute(KeyValue::new("output_bytes", *bytes as i64));
            info!(
                document_id = %report.document_id,
                worker_id = report.worker_id,
                queued_ms = report.queued_ms,
                duration_ms = report.duration_ms,
                output_bytes = bytes,
                "Render job completed"
            );
        }
        JobOutcome::Failed { error } | JobOutcome::Aborted { error } => {
            span.set_attribute(KeyValue::new("error", error.clone()));
            warn!(
                document_id = %report.document_id,
                worker_id = report.worker_id,
                outcome = report.outcome.label(),
                error = %error,
                "Render job failed"
            );
        }
        JobOutcome::Skipped => {
            info!(
                document_id = %report.document_id,
                worker_id = report.worker_id,
                "Render job skipped"
            );
        }
    }

    if report.duration_ms > SLOW_RENDER_MS {
        warn!(
            document_id = %report.document_id,
            duration_ms = report.duration_ms,
            "Render exceeded performance threshold (5000ms)"
        );
    }

    span.end();
}

/// Records a worker heartbeat with the number of jobs still tracked.
pub fn record_worker_heartbeat(worker_id: usize, tracked_jobs: usize) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("worker_heartbeat");

    span.set_attribute(KeyValue::new("worker_id", worker_id as i64));
    span.set_attribute(KeyValue::new("tracked_jobs", tracked_jobs as i64));
    span.end();

    debug!(worker_id, tracked_jobs, "Worker heartbeat");
}

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default: info).
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initializes OpenTelemetry with OTLP exporter.
///
/// Reads configuration from environment variables:
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - Collector endpoint (default: http://localhost:4317)
/// - `OTEL_SERVICE_NAME` - Service name (default: render-worker)
pub fn init_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| TRACER_NAME.to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DocumentId;

    fn report(outcome: JobOutcome, duration_ms: i64) -> JobReport {
        JobReport {
            document_id: DocumentId::new(),
            worker_id: 2,
            outcome,
            queued_ms: 4,
            duration_ms,
        }
    }

    #[test]
    fn test_record_rendered_job() {
        // Should not panic with the default no-op tracer
        record_job_telemetry(&report(JobOutcome::Rendered { bytes: 1024 }, 12));
    }

    #[test]
    fn test_record_failed_and_slow_jobs() {
        record_job_telemetry(&report(
            JobOutcome::Failed {
                error: "Test error".to_string(),
            },
            SLOW_RENDER_MS + 1,
        ));
        record_job_telemetry(&report(JobOutcome::Skipped, 0));
        record_worker_heartbeat(0, 3);
    }
}
