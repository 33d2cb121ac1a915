//! Tracing setup for the events API.
//!
//! A single formatted stream (JSON or pretty, on stdout or stderr) carries
//! every log line. In JSON mode each line is flattened and tagged with the
//! fields of the enclosing `event_operation` span, so `operation` and `actor`
//! sit next to the message. Spans are also exported over OTLP when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry::trace::TraceError;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{Config as TraceConfig, Sampler, Tracer},
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use std::io;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

const DEFAULT_OTLP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

/// OTLP span export settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OtlpConfig {
    pub endpoint: String,
    /// Fraction of root traces kept, clamped to `0.0..=1.0`.
    pub sampling_rate: f64,
    pub timeout: Duration,
}

impl OtlpConfig {
    fn sampler(&self) -> Sampler {
        match self.sampling_rate {
            rate if rate >= 1.0 => Sampler::AlwaysOn,
            rate if rate <= 0.0 => Sampler::AlwaysOff,
            rate => Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub output: LogOutput,
    /// Deployment name; `production`/`prod` switches the defaults to JSON at `info`.
    pub environment: String,
    pub otlp: Option<OtlpConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl LoggingConfig {
    /// Read `OSGOODE_EVENTS_ENV`, `OSGOODE_EVENTS_LOG_FORMAT`,
    /// `OSGOODE_EVENTS_LOG_OUTPUT` and the standard `OTEL_EXPORTER_OTLP_*` /
    /// `OTEL_TRACES_SAMPLER_ARG` variables. `RUST_LOG` is read at init time.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment =
            lookup("OSGOODE_EVENTS_ENV").unwrap_or_else(|| "development".to_string());
        let production = is_production(&environment);

        let format = match lookup("OSGOODE_EVENTS_LOG_FORMAT").as_deref() {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(value) if value.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ if production => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let output = match lookup("OSGOODE_EVENTS_LOG_OUTPUT").as_deref() {
            Some(value) if value.eq_ignore_ascii_case("stdout") => LogOutput::Stdout,
            _ => LogOutput::Stderr,
        };

        let otlp = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .filter(|endpoint| !endpoint.trim().is_empty())
            .map(|endpoint| OtlpConfig {
                endpoint,
                sampling_rate: lookup("OTEL_TRACES_SAMPLER_ARG")
                    .and_then(|raw| raw.parse::<f64>().ok())
                    .map(|rate| rate.clamp(0.0, 1.0))
                    .unwrap_or(if production { 0.1 } else { 1.0 }),
                timeout: lookup("OTEL_EXPORTER_OTLP_TIMEOUT")
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_OTLP_TIMEOUT),
            });

        Self {
            format,
            output,
            environment,
            otlp,
        }
    }

    fn default_directives(&self) -> String {
        let level = if is_production(&self.environment) {
            "info"
        } else {
            "debug"
        };
        format!("{level},hyper=info,tower=info,mongodb=info")
    }

    fn resource(&self) -> Resource {
        Resource::new([
            KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ])
    }
}

fn is_production(environment: &str) -> bool {
    matches!(environment, "production" | "prod")
}

/// Install the global subscriber. Hold the returned guard until exit so
/// buffered lines are flushed.
pub fn init_logging(config: LoggingConfig) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directives()));

    let (writer, guard) = match config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    };

    let otel_layer = match config.otlp.as_ref().map(|otlp| otlp_tracer(&config, otlp)) {
        Some(Ok(tracer)) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
        Some(Err(error)) => {
            eprintln!("OTLP export disabled: {error}");
            None
        }
        None => None,
    };
    let exporting = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        environment = %config.environment,
        format = ?config.format,
        otlp_endpoint = config.otlp.as_ref().map(|otlp| otlp.endpoint.as_str()),
        exporting,
        "logging initialized"
    );
    Ok(guard)
}

fn otlp_tracer(config: &LoggingConfig, otlp: &OtlpConfig) -> Result<Tracer, TraceError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(otlp.endpoint.clone())
        .with_timeout(otlp.timeout);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            TraceConfig::default()
                .with_sampler(otlp.sampler())
                .with_resource(config.resource()),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

/// Flush and stop span export.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Log a security event.
#[macro_export]
macro_rules! log_security_event {
    ($event_type:expr, $($arg:tt)*) => {
        tracing::warn!(
            security.event_type = %$event_type,
            $($arg)*
        );
    };
}

/// Span wrapping a single event operation.
pub fn event_span(operation: &str, actor: &str) -> tracing::Span {
    tracing::info_span!("event_operation", operation, actor)
}
