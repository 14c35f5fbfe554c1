//! Logging and distributed-tracing bootstrap.
//!
//! Structured logging is `tracing` + `tracing-subscriber`'s `EnvFilter`,
//! driven by `config.tracing.log_level` (mirrors `LOG_LEVEL`). Distributed
//! tracing layers `tracing-opentelemetry` on top so that spans created with
//! `#[instrument]` anywhere in the workspace are exported as OTLP spans,
//! unless `OTEL_SDK_DISABLED=true`. `FORCE_CONSOLE` switches the fmt layer
//! from JSON to human-readable output even when stdout is not a TTY (useful
//! under `docker logs` / CI).

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TracingConfig;

/// Guard that must be held for the process lifetime; dropping it flushes any
/// buffered spans before shutdown.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

fn build_env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_otel_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .build()
                .expect("failed to build OTLP span exporter"),
        )
        .build()
}

pub fn init(config: &TracingConfig) -> TelemetryGuard {
    let env_filter = build_env_filter(&config.log_level);

    if config.otel_sdk_disabled {
        if config.force_console {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        return TelemetryGuard { provider: None };
    }

    let provider = build_otel_provider();
    let tracer = provider.tracer("eddo");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    if config.force_console {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(otel_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .with(otel_layer)
            .init();
    }

    TelemetryGuard {
        provider: Some(provider),
    }
}
