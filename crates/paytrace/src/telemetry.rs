use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use paytrace_core::config::Config;
use paytrace_trace::export::encode::ResourceInfo;
use paytrace_trace::export::log::LogExporter;
use paytrace_trace::export::otlp::{ExportCompression, ExportConfig, ExportProtocol, OtlpExporter};
use paytrace_trace::{SinkConfig, SpanExporter, SpanSink};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_cli_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub fn init_run_tracing(json: bool) {
    let ansi = std::io::stderr().is_terminal();
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let compact_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(std::io::stderr)
            .compact()
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(compact_layer)
        .try_init();
}

/// Ships hop spans over OTLP when an endpoint is configured, else logs them.
pub fn build_span_sink(cfg: &Config) -> anyhow::Result<SpanSink> {
    let exporter: Arc<dyn SpanExporter> = match &cfg.export_otlp_endpoint {
        Some(endpoint) => {
            let exporter = OtlpExporter::new(
                ExportConfig {
                    endpoint: endpoint.clone(),
                    protocol: ExportProtocol::parse(&cfg.export_otlp_protocol),
                    compression: ExportCompression::parse(&cfg.export_otlp_compression),
                    headers: cfg.export_otlp_headers.clone(),
                    timeout: cfg.export_otlp_timeout,
                },
                ResourceInfo {
                    service_version: cfg.service_version.clone(),
                    environment: cfg.environment.clone(),
                },
            )
            .with_context(|| format!("configure otlp exporter for {endpoint}"))?;
            tracing::info!(%endpoint, protocol = %cfg.export_otlp_protocol, "exporting spans over otlp");
            Arc::new(exporter)
        }
        None => Arc::new(LogExporter),
    };
    Ok(SpanSink::spawn(exporter, SinkConfig::default()))
}
