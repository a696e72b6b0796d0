//! Tracing subscriber setup shared by both binaries

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Flushes pending spans on drop. Keep it alive for the life of `main`.
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to shut down tracer provider: {e}");
            }
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `observability.log_level`. Spans are exported over
/// OTLP/gRPC when `observability.otel_endpoint` is set.
pub fn init_tracing(config: &ObservabilityConfig, service_name: &str) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let json_layer = config
        .json_logging
        .then(|| fmt::layer().json().with_target(true).with_current_span(true));
    let text_layer = (!config.json_logging).then(|| fmt::layer().with_target(true));

    let provider = match &config.otel_endpoint {
        Some(endpoint) => Some(otlp_provider(endpoint, service_name)?),
        None => None,
    };
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to install tracing subscriber: {}", e),
        })?;

    if let Some(endpoint) = &config.otel_endpoint {
        tracing::info!(endpoint = %endpoint, "OTLP span export enabled");
    }

    Ok(TelemetryGuard { provider })
}

fn otlp_provider(endpoint: &str, service_name: &str) -> Result<TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to build OTLP exporter for {}: {}", endpoint, e),
        })?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
