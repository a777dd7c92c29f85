// SPDX-License-Identifier: MIT
//! OTLP/gRPC exporter factory.
//!
//! Every signal gets its own tonic channel. Channels are created lazily, so building
//! an exporter never touches the network: an unreachable collector only shows up
//! later as export failures logged by the SDK.

use std::fmt;
use std::time::Duration;

use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig};
use url::Url;

use crate::config::Signal;
use crate::error::{ConfigError, TelemetryError};

/// Default collector endpoint (OTLP/gRPC port).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
/// Default timeout of a single export RPC.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// A validated collector address.
///
/// Accepts either a full URL (`http://collector:4317`) or a bare `host:port`, which
/// is treated as plain-text `http`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(signal: Signal, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            signal,
            endpoint: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("endpoint is empty".into()));
        }
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".into()));
        }

        Ok(Self(candidate.trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where and how the three exporters talk to the collector.
///
/// Produced by a single resolution step; all signals share one endpoint unless a
/// per-signal override was configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExporterConfig {
    pub traces: Endpoint,
    pub metrics: Endpoint,
    pub logs: Endpoint,
    pub timeout: Duration,
}

impl ExporterConfig {
    /// Same endpoint for every signal.
    pub fn shared(endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            traces: endpoint.clone(),
            metrics: endpoint.clone(),
            logs: endpoint,
            timeout,
        }
    }

    pub fn endpoint(&self, signal: Signal) -> &Endpoint {
        match signal {
            Signal::Traces => &self.traces,
            Signal::Metrics => &self.metrics,
            Signal::Logs => &self.logs,
        }
    }
}

/// The three OTLP exporters, one per signal.
pub struct Exporters {
    pub spans: SpanExporter,
    pub metrics: MetricExporter,
    pub logs: LogExporter,
}

impl fmt::Debug for Exporters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporters").finish_non_exhaustive()
    }
}

/// Build the trace, metric and log exporters for `cfg`.
///
/// Must be called from within a Tokio runtime (tonic spawns the channel worker).
///
/// # Errors
/// Returns [`TelemetryError::Exporter`] if the OTLP builder rejects its settings.
pub fn make_exporters(cfg: &ExporterConfig) -> Result<Exporters, TelemetryError> {
    let spans = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(cfg.traces.as_str())
        .with_timeout(cfg.timeout)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Traces,
            source,
        })?;

    let metrics = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(cfg.metrics.as_str())
        .with_timeout(cfg.timeout)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Metrics,
            source,
        })?;

    let logs = LogExporter::builder()
        .with_tonic()
        .with_endpoint(cfg.logs.as_str())
        .with_timeout(cfg.timeout)
        .build()
        .map_err(|source| TelemetryError::Exporter {
            signal: Signal::Logs,
            source,
        })?;

    tracing::debug!(
        traces = %cfg.traces,
        metrics = %cfg.metrics,
        logs = %cfg.logs,
        "OTLP exporters created"
    );

    Ok(Exporters {
        spans,
        metrics,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn bare_host_port_is_normalized() {
        let ep = Endpoint::parse(Signal::Traces, "collector.local:4317").unwrap();
        assert_eq!(ep.as_str(), "http://collector.local:4317");
    }

    #[test]
    fn full_url_is_kept() {
        let ep = Endpoint::parse(Signal::Logs, "https://otel.example.com:4317/").unwrap();
        assert_eq!(ep.as_str(), "https://otel.example.com:4317");
    }

    #[test]
    fn invalid_endpoints_fail_fast() {
        for raw in ["", "   ", "http://", "ftp://collector:21", "not a host:4317"] {
            let err = Endpoint::parse(Signal::Metrics, raw).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidEndpoint { signal: Signal::Metrics, .. }),
                "expected invalid endpoint for {raw:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn shared_config_targets_one_endpoint() {
        let ep = Endpoint::parse(Signal::Traces, DEFAULT_ENDPOINT).unwrap();
        let cfg = ExporterConfig::shared(ep.clone(), DEFAULT_EXPORT_TIMEOUT);
        for signal in Signal::ALL {
            assert_eq!(cfg.endpoint(signal), &ep);
        }
    }

    #[tokio::test]
    async fn construction_does_not_touch_the_network() {
        // Nothing listens on port 1; a blocking connect would fail or hang here.
        let ep = Endpoint::parse(Signal::Traces, "127.0.0.1:1").unwrap();
        let cfg = ExporterConfig::shared(ep, DEFAULT_EXPORT_TIMEOUT);

        let started = Instant::now();
        let _exporters = tokio_test::assert_ok!(make_exporters(&cfg));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
