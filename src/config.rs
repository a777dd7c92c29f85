// SPDX-License-Identifier: MIT
//! Configuration resolution.
//!
//! Everything the pipeline needs is resolved once, in one place, from the process
//! environment. Values are taken from environment variables when present:
//!
//! * `OTEL_EXPORTER_OTLP_ENDPOINT` (or `OTEL_EXPORTER_ENDPOINT`) – collector address,
//!   e.g. `http://collector:4317`.
//! * `OTEL_EXPORTER_OTLP_{TRACES,METRICS,LOGS}_ENDPOINT` – per-signal overrides.
//! * `OTEL_EXPORTER_OTLP_TIMEOUT` – export RPC timeout in milliseconds.
//! * `OTEL_SERVICE_NAME` – `service.name` (required).
//! * `OTEL_SERVICE_VERSION` – `service.version`.
//! * `DEPLOYMENT_ENVIRONMENT` (or `RUST_ENV`) – `deployment.environment`.
//! * `OTEL_TRACES_SAMPLER`, `OTEL_TRACES_SAMPLER_ARG` – trace sampling.
//! * `OTEL_BSP_*`, `OTEL_BLRP_*` – span / log batch thresholds.
//! * `OTEL_METRIC_EXPORT_INTERVAL` – metric export interval in milliseconds.
//! * `OTEL_SHUTDOWN_TIMEOUT` – upper bound on the final flush in milliseconds.
//! * `RUST_LOG` – local log filter.
//!
//! Empty values count as unset.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::exporter::{Endpoint, ExporterConfig, DEFAULT_ENDPOINT, DEFAULT_EXPORT_TIMEOUT};
use crate::provider::{BatchPolicy, SamplerPolicy, DEFAULT_METRIC_INTERVAL};
use crate::resource::ServiceIdentity;

/// Default bound on the final flush at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Local log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// One of the three telemetry signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    fn endpoint_var(self) -> &'static str {
        match self {
            Signal::Traces => "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
            Signal::Metrics => "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT",
            Signal::Logs => "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

/// Fully resolved telemetry configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryConfig {
    pub identity: ServiceIdentity,
    pub exporter: ExporterConfig,
    pub sampler: SamplerPolicy,
    pub span_batch: BatchPolicy,
    pub log_batch: BatchPolicy,
    pub metric_interval: Duration,
    pub shutdown_timeout: Duration,
    /// `tracing_subscriber::EnvFilter` directives for local output.
    pub log_filter: String,
}

impl TelemetryConfig {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    /// Fails when the service name is missing or any value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults for everything but the service name. Environment is not consulted.
    pub fn for_service(name: &str) -> Result<Self, ConfigError> {
        let name = name.to_string();
        Self::from_lookup(move |key| (key == "OTEL_SERVICE_NAME").then(|| name.clone()))
    }

    /// Resolve configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let name = get("OTEL_SERVICE_NAME").ok_or(ConfigError::MissingServiceName)?;
        let identity = ServiceIdentity::new(
            name,
            get("OTEL_SERVICE_VERSION"),
            get("DEPLOYMENT_ENVIRONMENT").or_else(|| get("RUST_ENV")),
        )?;

        let shared = get("OTEL_EXPORTER_OTLP_ENDPOINT")
            .or_else(|| get("OTEL_EXPORTER_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = |signal: Signal| match get(signal.endpoint_var()) {
            Some(own) => Endpoint::parse(signal, &own),
            None => Endpoint::parse(signal, &shared),
        };
        let exporter = ExporterConfig {
            traces: endpoint(Signal::Traces)?,
            metrics: endpoint(Signal::Metrics)?,
            logs: endpoint(Signal::Logs)?,
            timeout: millis(&get, "OTEL_EXPORTER_OTLP_TIMEOUT", DEFAULT_EXPORT_TIMEOUT)?,
        };

        let sampler = match get("OTEL_TRACES_SAMPLER") {
            Some(name) => {
                SamplerPolicy::from_name(&name, get("OTEL_TRACES_SAMPLER_ARG").as_deref())?
            }
            None => SamplerPolicy::default(),
        };

        let spans = BatchPolicy::spans_default();
        let span_batch = BatchPolicy {
            scheduled_delay: millis(&get, "OTEL_BSP_SCHEDULE_DELAY", spans.scheduled_delay)?,
            max_queue_size: count(&get, "OTEL_BSP_MAX_QUEUE_SIZE", spans.max_queue_size)?,
            max_export_batch_size: count(
                &get,
                "OTEL_BSP_MAX_EXPORT_BATCH_SIZE",
                spans.max_export_batch_size,
            )?,
        };

        let logs = BatchPolicy::logs_default();
        let log_batch = BatchPolicy {
            scheduled_delay: millis(&get, "OTEL_BLRP_SCHEDULE_DELAY", logs.scheduled_delay)?,
            max_queue_size: count(&get, "OTEL_BLRP_MAX_QUEUE_SIZE", logs.max_queue_size)?,
            max_export_batch_size: count(
                &get,
                "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE",
                logs.max_export_batch_size,
            )?,
        };

        Ok(Self {
            identity,
            exporter,
            sampler,
            span_batch,
            log_batch,
            metric_interval: millis(&get, "OTEL_METRIC_EXPORT_INTERVAL", DEFAULT_METRIC_INTERVAL)?,
            shutdown_timeout: millis(&get, "OTEL_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT)?,
            log_filter: get("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

fn number<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => Err(ConfigError::InvalidNumber { var, value: raw }),
        },
        None => Ok(default),
    }
}

/// A buffer size; zero would make the batch processor drop every record.
fn count<G>(get: &G, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match number(get, var, default)? {
        0 => Err(ConfigError::InvalidNumber {
            var,
            value: get(var).unwrap_or_default(),
        }),
        n => Ok(n),
    }
}

fn millis<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    number(get, var, default_ms).map(Duration::from_millis)
}
