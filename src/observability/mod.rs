// src/observability/mod.rs
//! Logging and metrics setup
//!
//! Both initialisers install process-global state and should be called once
//! from the binary before the pool is built.

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{PoolError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| PoolError::Telemetry(format!("invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    installed.map_err(|e| PoolError::Telemetry(e.to_string()))
}

/// Install the Prometheus exporter if an address is configured
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    describe_metrics();

    let Some(addr) = config.metrics_addr else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PoolError::Telemetry(format!("failed to start metrics exporter: {}", e)))?;

    info!(%addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("robot_pool_allocations_total", "Worker allocations by outcome");
    metrics::describe_counter!("robot_pool_runs_total", "Robot runs by outcome");
    metrics::describe_histogram!(
        "robot_pool_run_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of robot runs"
    );
    metrics::describe_gauge!("robot_pool_workers_allocated", "Workers currently allocated");
}
