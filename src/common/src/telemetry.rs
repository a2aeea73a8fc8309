use anyhow::{Result, anyhow};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::env;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// Install the global subscriber for a process.
///
/// Logs always go to stderr through the fmt layer, filtered by `RUST_LOG`
/// (default `info`). Spans are additionally exported when
/// `OTEL_TRACES_EXPORTER` is `otlp` or `stdout`.
pub fn init_telemetry(service_name: &'static str) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let tracer = match env::var("OTEL_TRACES_EXPORTER").as_deref() {
        Ok("otlp") => {
            let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());
            match otlp_tracer(&endpoint, service_name) {
                Ok(tracer) => Some(tracer),
                Err(e) => {
                    eprintln!("{}: otlp exporter unavailable ({}), using stdout", service_name, e);
                    Some(stdout_tracer(service_name))
                }
            }
        }
        Ok("stdout") => Some(stdout_tracer(service_name)),
        _ => None,
    };

    // try_init: tests spin up several roles in one process
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .with(tracer.map(OpenTelemetryLayer::new))
        .try_init();
}

fn otlp_tracer(endpoint: &str, service_name: &'static str) -> Result<Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    if !(endpoint.contains("4318") || endpoint.contains("/v1/traces")) {
        return Err(anyhow!("only the http/protobuf OTLP endpoint is supported: {}", endpoint));
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .build();

    Ok(provider.tracer(service_name))
}

fn stdout_tracer(service_name: &'static str) -> Tracer {
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();

    provider.tracer(service_name)
}
