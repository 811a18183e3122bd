use anyhow::{Context, Result};
use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    logs::{BatchLogProcessor, LoggerProvider},
    propagation::TraceContextPropagator,
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::{TelemetryConfig, TelemetryProviders};

const TRACER_NAME: &str = "fleetrack";

fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn service_resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        config.service_name.clone(),
    )])
}

/// OTLP/gRPC exporters for spans and logs, sharing one resource
fn build_providers(config: &TelemetryConfig) -> Result<TelemetryProviders> {
    let resource = service_resource(config);

    let span_exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter, runtime::Tokio)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let log_exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otel_endpoint)
        .build()
        .context("failed to build OTLP log exporter")?;

    let logger_provider = LoggerProvider::builder()
        .with_log_processor(BatchLogProcessor::builder(log_exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build();

    Ok(TelemetryProviders {
        tracer_provider,
        logger_provider,
    })
}

/// Install the global tracing subscriber.
///
/// JSON lines always go to stdout. With `otel_enabled` spans and log events
/// are also exported over OTLP and W3C trace context becomes the global
/// propagator; the returned providers must be passed to [`shutdown_telemetry`].
pub fn init_telemetry(config: &TelemetryConfig) -> Result<Option<TelemetryProviders>> {
    if !config.otel_enabled {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_list(true)
            .with_current_span(true);

        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(fmt_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(None);
    }

    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    let providers = build_providers(config)?;

    let tracer = providers.tracer_provider.tracer(TRACER_NAME);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(true)
        .with_current_span(true);

    // span layer must precede the log bridge so events see the active span
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(OpenTelemetryTracingBridge::new(&providers.logger_provider))
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(Some(providers))
}

/// Flush and close exporters
pub fn shutdown_telemetry(providers: Option<TelemetryProviders>) {
    let Some(providers) = providers else {
        return;
    };
    if let Err(e) = providers.tracer_provider.shutdown() {
        eprintln!("tracer provider shutdown failed: {:?}", e);
    }
    if let Err(e) = providers.logger_provider.shutdown() {
        eprintln!("logger provider shutdown failed: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_local_only() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "fleetrack");
        assert_eq!(config.otel_endpoint, "http://localhost:4317");
        assert!(!config.otel_enabled);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_local_only_subscriber_installs_once() {
        let config = TelemetryConfig::default();
        let providers = init_telemetry(&config).unwrap();
        assert!(providers.is_none());

        // the global subscriber is already set
        assert!(init_telemetry(&config).is_err());
    }

    #[test]
    fn test_shutdown_without_providers_is_noop() {
        shutdown_telemetry(None);
    }

    #[test]
    fn test_resource_carries_service_name() {
        let config = TelemetryConfig {
            service_name: "tracker-gateway".to_string(),
            ..TelemetryConfig::default()
        };
        let resource = service_resource(&config);
        let value = resource.get(opentelemetry::Key::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        ));
        assert_eq!(
            value.map(|v| v.to_string()),
            Some("tracker-gateway".to_string())
        );
    }
}
