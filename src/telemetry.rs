//! Telemetry logic.
//! Support tracing, metrics and logging.
use axum::extract::{MatchedPath, Request};
use axum::http::Version;
use axum::middleware::Next;
use axum::response::IntoResponse;
use metrics::{Unit, gauge};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{Span, Tracer};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::time::sleep;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use std::error::Error;
use std::time::{Duration, Instant};

use crate::config::Telemetry;

type BoxError = Box<dyn Error + Send + Sync>;

fn ressources() -> Resource {
    Resource::builder()
        .with_service_name(env!("CARGO_CRATE_NAME"))
        .build()
}

/// Create tracer for OLTP.
pub fn setup_tracer(endpoint: &str) -> Result<SdkTracerProvider, BoxError> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(ressources())
        .build())
}

/// Create OLTP exporter for logs.
pub fn setup_logging(
    endpoint: &str,
) -> Result<OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>, BoxError> {
    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider: SdkLoggerProvider = SdkLoggerProvider::builder()
        .with_resource(ressources())
        .with_batch_exporter(exporter)
        .build();
    Ok(OpenTelemetryTracingBridge::new(&provider))
}

/// Install the global `tracing` subscriber.
///
/// Logs go to stdout, filtered by `RUST_LOG` (default `info`). When an OTLP
/// endpoint is configured, logs and spans are exported there too.
pub fn init(config: &Telemetry) -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            global::set_tracer_provider(setup_tracer(endpoint)?);
            registry.with(setup_logging(endpoint)?).try_init()?;
            tracing::info!(%endpoint, "exporting telemetry with OTLP");
        },
        None => registry.try_init()?,
    }

    Ok(())
}

/// Create recorder for Prometheus metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    metrics::describe_gauge!(
        "process_cpu_usage",
        Unit::Percent,
        "CPU usage of the process in percentage."
    );
    metrics::describe_gauge!(
        "process_memory_used_bytes",
        Unit::Bytes,
        "Total process memory in bytes."
    );
    metrics::describe_counter!(
        "orphaned_posts_deleted_total",
        Unit::Count,
        "Posts deleted by a reconciliation because their author does not exist."
    );
    metrics::describe_counter!(
        "cascade_posts_deleted_total",
        Unit::Count,
        "Posts deleted along with their author."
    );

    let mut system = System::new_with_specifics(RefreshKind::nothing());
    let pid = Pid::from_u32(std::process::id());

    // Update system information every 10 seconds.
    tokio::spawn(async move {
        loop {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing().with_memory().with_cpu(),
            );

            if let Some(process) = system.process(pid) {
                gauge!("process_memory_used_bytes").set(process.memory() as f64);
                gauge!("process_cpu_usage").set(process.cpu_usage() as f64);
            }

            sleep(Duration::from_secs(10)).await;
        }
    });

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()
}

/// Track every metrics into one function.
pub async fn track(req: Request, next: Next) -> impl IntoResponse {
    let tracer = global::tracer("tracing-http");
    let mut otel_span = tracer.start("http-request");

    let start = Instant::now();
    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };
    let method = req.method().clone();
    let version = match req.version() {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "UNKNOWN",
    };

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    otel_span.set_attribute(KeyValue::new("version", version));
    otel_span.set_attribute(KeyValue::new("path", path.clone()));
    otel_span.set_attribute(KeyValue::new("method", method.to_string()));
    otel_span.set_attribute(KeyValue::new("status", status.clone()));

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    otel_span.end();

    response
}
