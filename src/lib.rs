// SPDX-License-Identifier: MIT
//! Process-wide OpenTelemetry bootstrap for the `favorite` service.
//!
//! At startup a single pipeline is built that exports traces, metrics and logs over
//! OTLP/gRPC to one collector:
//! * Traces: batch span processor, always-on sampling by default.
//! * Metrics: periodic reader on a fixed interval.
//! * Logs: `tracing` events bridged into a batch log processor.
//! * W3C Trace Context propagation.
//!
//! The primary entry points are [`TelemetryConfig::from_env`], [`init_telemetry`] and
//! [`TelemetryHandle`]. Code far from `main` reaches the installed pipeline through
//! [`global`].
//!
//! # Feature Flags
//! * `console-log` (default) – add a compact console formatter (file/line/thread id).
//!
//! # Quick Start
//! ```no_run
//! use favorite_otel::{init_telemetry, TelemetryConfig};
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::from_env()?)?;
//!     // business logic
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod error;
pub mod exporter;
pub mod propagation;
pub mod provider;
pub mod resource;
pub mod shutdown;
pub mod telemetry;

pub use config::{Signal, TelemetryConfig};
pub use error::{ConfigError, TelemetryError};
pub use shutdown::{shutdown_signal, ShutdownReport, TelemetryHandle};
pub use telemetry::{global, init_telemetry, install_global, Telemetry};
