// SPDX-License-Identifier: MIT
//! Error types for telemetry bootstrap.
//!
//! Only bootstrap problems are errors. Export failures at runtime are reported by the
//! SDK through its internal logs and never reach callers; flush problems during close
//! end up in a [`crate::shutdown::ShutdownReport`].

use opentelemetry_otlp::ExporterBuildError;

use crate::config::Signal;

/// Configuration problems detected while resolving [`crate::config::TelemetryConfig`].
///
/// All of these are fatal to startup: the process should not run with a broken
/// endpoint or an anonymous service identity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `service.name` was not configured (or configured as an empty string).
    #[error("service name is required: set OTEL_SERVICE_NAME")]
    MissingServiceName,

    /// An exporter endpoint is not a usable network address.
    #[error("invalid {signal} exporter endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint {
        signal: Signal,
        endpoint: String,
        reason: String,
    },

    /// A numeric setting could not be parsed.
    #[error("invalid value `{value}` for {var}")]
    InvalidNumber { var: &'static str, value: String },

    /// Unknown `OTEL_TRACES_SAMPLER` value.
    #[error("unsupported sampler `{0}`")]
    InvalidSampler(String),

    /// `OTEL_TRACES_SAMPLER_ARG` is not a ratio in `0.0..=1.0`.
    #[error("invalid sampler ratio `{0}`, expected a number between 0.0 and 1.0")]
    InvalidSamplerArg(String),
}

/// Errors returned while building or installing the telemetry pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The OTLP exporter builder rejected its configuration.
    #[error("failed to build {signal} exporter: {source}")]
    Exporter {
        signal: Signal,
        #[source]
        source: ExporterBuildError,
    },

    /// A process-wide [`crate::telemetry::Telemetry`] is already installed.
    #[error("telemetry is already installed for this process")]
    AlreadyInstalled,

    /// The global `tracing` subscriber could not be set.
    #[error("failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
}
