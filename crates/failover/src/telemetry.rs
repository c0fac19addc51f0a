//! Logging setup with optional OpenTelemetry export.

use crate::config::TelemetrySettings;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Flushes pending spans and shuts the tracer provider down when dropped.
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build an OTLP (gRPC) tracer and install its provider globally.
pub fn init_tracer(service_name: &str, otlp_endpoint: &str) -> Result<Tracer, Box<dyn std::error::Error>> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_endpoint)
        .build()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    let tracer = provider.tracer(service_name.to_string());
    opentelemetry::global::set_tracer_provider(provider);
    Ok(tracer)
}

/// Install the global subscriber.
///
/// With telemetry disabled this is plain `common::logging`. Must be called
/// from within the Tokio runtime when telemetry is enabled.
pub fn setup_tracing(
    settings: &TelemetrySettings,
    log_level: &str,
    json: bool,
) -> Result<Option<TelemetryGuard>, Box<dyn std::error::Error>> {
    if !settings.enabled {
        common::logging::init_with(log_level, json);
        return Ok(None);
    }

    let tracer = init_tracer(&settings.service_name, &settings.otlp_endpoint)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    tracing::info!(
        service_name = %settings.service_name,
        otlp_endpoint = %settings.otlp_endpoint,
        "Tracing initialized with OpenTelemetry export"
    );
    Ok(Some(TelemetryGuard))
}
