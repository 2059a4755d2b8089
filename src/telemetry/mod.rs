//! Tracing subscriber setup.
//!
//! Logs go to stdout either as bunyan formatted json or as human readable text.
//! When an OTLP endpoint is configured, spans are exported there as well.
use opentelemetry::sdk::propagation::TraceContextPropagator;
use opentelemetry::sdk::trace::{BatchConfig, Tracer};
use opentelemetry::sdk::{trace, Resource};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

use crate::server::config::LogFormat;

const SERVICE_NAME: &str = "cassprober";

fn otlp_tracer(exporter_endpoint: &str) -> anyhow::Result<Tracer> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(exporter_endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            trace::config().with_resource(Resource::new(vec![KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                SERVICE_NAME.to_string(),
            )])),
        )
        .with_batch_config(BatchConfig::default().with_max_queue_size(1024 * 1024))
        .install_batch(opentelemetry::runtime::Tokio)?;

    global::set_text_map_propagator(TraceContextPropagator::new());
    Ok(tracer)
}

/// Installs the global subscriber.
///
/// `level` accepts anything [`EnvFilter`] does (`info`, `debug`, `cassprober=trace`...).
pub fn init_subscriber(
    format: LogFormat,
    level: &str,
    otlp_endpoint: Option<&str>,
) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level)?;
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(otlp_tracer(endpoint)?)),
        None => None,
    };

    let registry = Registry::default().with(filter).with(otel_layer);
    match format {
        LogFormat::Json => registry
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(
                SERVICE_NAME.to_string(),
                std::io::stdout,
            ))
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    Ok(())
}
