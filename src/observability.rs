//! 日志与追踪初始化
//!
//! Console or file logging through `tracing-subscriber`, plus an optional
//! OTLP span exporter when built with the `opentelemetry` feature.

use ha_common::config::{HaConfig, LogConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, fmt::writer::BoxMakeWriter, prelude::*};

use crate::error::Result;
#[cfg(feature = "opentelemetry")]
use crate::error::Error;
#[cfg(feature = "opentelemetry")]
use opentelemetry::KeyValue;
#[cfg(feature = "opentelemetry")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};

const LOG_FILE_NAME: &str = "wifi-ha.log";

/// Keeps the tracer provider and the non-blocking log writer alive.
#[derive(Default)]
pub struct ObservabilityGuard {
    #[cfg(feature = "opentelemetry")]
    tracer_provider: Option<SdkTracerProvider>,
    _log_guard: Option<WorkerGuard>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        #[cfg(feature = "opentelemetry")]
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown tracer provider: {e:?}");
        }
    }
}

/// 初始化日志与追踪
///
/// `component` names the role this process runs (`gateway` / `operator`),
/// `None` when it runs both; it becomes part of the OTLP service name.
pub fn init_observability(
    config: &HaConfig,
    #[cfg_attr(not(feature = "opentelemetry"), allow(unused_variables))] component: Option<&str>,
) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();
    let observability = config.observability_config();

    let (writer, ansi) = match observability.log.output.as_str() {
        "file" => {
            let (writer, log_guard) = file_writer(&observability.log)?;
            guard._log_guard = Some(log_guard);
            (writer, false)
        }
        _ => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(ansi)
        .with_writer(writer);

    #[cfg(feature = "opentelemetry")]
    let otel_layer = match build_tracer_provider(config, component)? {
        Some(provider) => {
            use opentelemetry::trace::TracerProvider as _;
            let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
            guard.tracer_provider = Some(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    #[cfg(not(feature = "opentelemetry"))]
    let otel_layer: Option<tracing_subscriber::layer::Identity> = None;

    tracing_subscriber::registry()
        .with(env_filter(&observability.filter_level))
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .ok();

    Ok(guard)
}

/// `RUST_LOG` wins over the configured level; an unparsable directive falls back to `info`.
fn env_filter(filter_level: &str) -> EnvFilter {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| filter_level.to_string());

    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Ignoring log filter '{directive}' ({e}), using info");
        EnvFilter::new("info")
    })
}

fn file_writer(log: &LogConfig) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let dir = Path::new(&log.path);
    std::fs::create_dir_all(dir)?;

    let (writer, guard) = if log.rotate {
        println!("Logging to {} (daily rotation)", dir.join(LOG_FILE_NAME).display());
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_NAME))
    } else {
        let path = dir.join(LOG_FILE_NAME);
        println!("Logging to {}", path.display());
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_appender::non_blocking(file)
    };
    Ok((BoxMakeWriter::new(writer), guard))
}

#[cfg(feature = "opentelemetry")]
fn build_tracer_provider(
    config: &HaConfig,
    component: Option<&str>,
) -> Result<Option<SdkTracerProvider>> {
    let tracing_cfg = config.tracing_config();
    if !tracing_cfg.enable {
        return Ok(None);
    }
    tracing_cfg
        .validate()
        .map_err(|errors| Error::custom(errors.join("; ")))?;

    let service_name = tracing_cfg.service_name_for(component);
    println!(
        "📊 OTLP tracing: service={}, endpoint={}, sample_ratio={}",
        service_name, tracing_cfg.endpoint, tracing_cfg.sample_ratio
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(tracing_cfg.endpoint.clone())
        .build()
        .map_err(|e| Error::custom(format!("Failed to build OTLP exporter: {e}")))?;

    let attributes = std::iter::once(KeyValue::new("service.instance.id", config.name.clone()))
        .chain(
            tracing_cfg
                .resource_attributes
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        );
    let resource = Resource::builder()
        .with_service_name(service_name)
        .with_attributes(attributes)
        .build();

    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            tracing_cfg.sample_ratio,
        ))))
        .with_batch_exporter(exporter)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_log_dir_and_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("nested/logs");
        let log = LogConfig {
            output: "file".to_string(),
            rotate: false,
            path: log_dir.display().to_string(),
        };

        let (_writer, guard) = file_writer(&log).unwrap();
        drop(guard);
        assert!(log_dir.join(LOG_FILE_NAME).is_file());
    }

    #[test]
    fn test_unparsable_filter_falls_back_to_info() {
        // Only meaningful when RUST_LOG does not override the configured level.
        if std::env::var("RUST_LOG").is_ok_and(|v| !v.trim().is_empty()) {
            return;
        }
        assert_eq!(env_filter("warn").to_string(), "warn");
        assert_eq!(env_filter("info,h2=loud").to_string(), "info");
    }
}
