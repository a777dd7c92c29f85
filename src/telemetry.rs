// SPDX-License-Identifier: MIT
//! The process-wide telemetry facade.
//!
//! [`init_telemetry`] runs the whole bootstrap once, on the startup thread:
//!
//! ```text
//! TelemetryConfig -> Resource -> OTLP exporters -> providers -> Telemetry
//!     -> install_global -> tracing subscriber -> TelemetryHandle
//! ```
//!
//! * [`Telemetry`] – composed providers + W3C propagator; safe to use from any thread.
//! * [`install_global`] / [`global`] – one-time publication of the facade.
//! * [`TelemetryHandle`] – scoped guard that closes the pipeline on every exit path.
//!
//! # Example
//! ```no_run
//! use favorite_otel::{init_telemetry, TelemetryConfig};
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let handle = init_telemetry(TelemetryConfig::from_env()?)?;
//! tracing::info!("application started");
//! // ... application logic ...
//! handle.shutdown(); // flush final batches
//! # Ok(()) }
//! ```
//!
//! # Threading Model
//! Emit calls only enqueue into in-memory buffers. Batch processors and the periodic
//! metric reader export from their own background threads through tonic channels
//! driven by the Tokio runtime, so telemetry must be initialized inside a
//! (multi-threaded) Tokio runtime.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use opentelemetry::global as otel_global;
use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt, TracerProvider as _};
use opentelemetry::Context;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLogger;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracer;
use opentelemetry_sdk::Resource;
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::filter_fn;
#[cfg(feature = "console-log")]
use tracing_subscriber::fmt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::{TelemetryConfig, DEFAULT_LOG_FILTER};
use crate::error::TelemetryError;
use crate::exporter::make_exporters;
use crate::provider::Providers;
use crate::resource::build_resource;
use crate::shutdown::{self, ShutdownReport, TelemetryHandle};

/// Instrumentation scope used for spans bridged from `tracing`.
const SCOPE: &str = env!("CARGO_PKG_NAME");

static GLOBAL: OnceLock<Telemetry> = OnceLock::new();

/// Composed tracer, meter and logger providers plus the trace-context propagator.
///
/// Owns the only providers of the process. After [`Telemetry::close`] every handle
/// obtained from it keeps working as a no-op.
pub struct Telemetry {
    providers: Providers,
    resource: Resource,
    propagator: TraceContextPropagator,
    closed: AtomicBool,
}

impl Telemetry {
    pub fn compose(providers: Providers, resource: Resource) -> Self {
        Self {
            providers,
            resource,
            propagator: TraceContextPropagator::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn tracer(&self, name: &'static str) -> SdkTracer {
        self.providers.tracer.tracer(name)
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.providers.meter.meter(name)
    }

    pub fn logger(&self, name: &'static str) -> SdkLogger {
        self.providers.logger.logger(name)
    }

    pub fn propagator(&self) -> &TraceContextPropagator {
        &self.propagator
    }

    /// Decode the remote span context carried by `carrier`, if it holds a valid one.
    pub fn extract_context(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        let cx = self.propagator.extract(carrier);
        let span_context = cx.span().span_context().clone();
        span_context.is_valid().then_some(span_context)
    }

    pub fn inject_context(&self, span_context: &SpanContext, carrier: &mut dyn Injector) {
        let cx = Context::new().with_remote_span_context(span_context.clone());
        self.propagator.inject_context(&cx, carrier);
    }

    /// Identity attributes shared by every signal.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flush and shut down all providers, waiting at most `timeout`.
    ///
    /// Only the first call does any work; later calls return a report with
    /// `already_closed` set. Errors are logged and reported, never returned.
    ///
    /// [`Telemetry::is_closed`] turns true as soon as the first call starts, before the
    /// buffered records are flushed.
    pub fn close(&self, timeout: Duration) -> ShutdownReport {
        // Marked before flushing so a racing close (explicit shutdown vs. Drop) is a
        // no-op instead of a second flush.
        if self.closed.swap(true, Ordering::AcqRel) {
            return ShutdownReport::already_closed();
        }
        shutdown::close_providers(&self.providers, timeout)
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Publish `telemetry` as the process-wide instance.
///
/// Publication is atomic: concurrent [`global`] callers see either nothing or the
/// fully constructed facade. Only the first call succeeds; any later call returns
/// [`TelemetryError::AlreadyInstalled`], leaves the installed facade untouched and
/// drops the rejected one. The OpenTelemetry global tracer/meter providers and text
/// map propagator are pointed at the installed facade as well.
pub fn install_global(telemetry: Telemetry) -> Result<&'static Telemetry, TelemetryError> {
    let mut fresh = false;
    let installed = GLOBAL.get_or_init(|| {
        fresh = true;
        telemetry
    });
    if !fresh {
        warn!("telemetry already installed, ignoring second instance");
        return Err(TelemetryError::AlreadyInstalled);
    }

    otel_global::set_tracer_provider(installed.providers.tracer.clone());
    otel_global::set_meter_provider(installed.providers.meter.clone());
    otel_global::set_text_map_propagator(installed.propagator.clone());
    Ok(installed)
}

/// The installed facade, if [`install_global`] has run.
pub fn global() -> Option<&'static Telemetry> {
    GLOBAL.get()
}

/// Build the pipeline from `cfg`, install it process-wide and wire `tracing` into it.
///
/// # Returns
/// A [`TelemetryHandle`] that closes the pipeline when shut down or dropped.
///
/// # Errors
/// * [`TelemetryError::Exporter`] if an exporter cannot be built.
/// * [`TelemetryError::AlreadyInstalled`] if telemetry was initialized before.
/// * [`TelemetryError::Subscriber`] if a global `tracing` subscriber is already set;
///   the freshly installed pipeline is closed in that case.
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
    let resource = build_resource(&cfg.identity);
    let exporters = make_exporters(&cfg.exporter)?;
    let providers = Providers::build(&resource, exporters, &cfg);
    let telemetry = install_global(Telemetry::compose(providers, resource))?;
    let handle = TelemetryHandle::new(telemetry, cfg.shutdown_timeout);

    init_subscriber(telemetry, &cfg.log_filter)?;

    info!(
        service.name = %cfg.identity.name(),
        service.version = %cfg.identity.version(),
        deployment.environment = %cfg.identity.environment(),
        endpoint = %cfg.exporter.traces,
        "telemetry initialized"
    );
    Ok(handle)
}

/// Events from the export path itself must not be fed back into the pipeline.
///
/// Matches whole crate segments, so `tower_http` or an application crate named
/// `hyperdrive` is not mistaken for `tower` or `hyper`.
fn is_pipeline_internal(target: &str) -> bool {
    const EXPORT_PATH: [&str; 9] = [
        "opentelemetry",
        "opentelemetry_sdk",
        "opentelemetry_otlp",
        "opentelemetry_appender_tracing",
        "tonic",
        "h2",
        "hyper",
        "hyper_util",
        "tower",
    ];
    let krate = target.split("::").next().unwrap_or(target);
    EXPORT_PATH.contains(&krate)
}

fn init_subscriber(telemetry: &Telemetry, log_filter: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter `{log_filter}` ({e}), using `{DEFAULT_LOG_FILTER}`");
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let otel_trace_layer = OpenTelemetryLayer::new(telemetry.tracer(SCOPE))
        .with_filter(filter_fn(|meta| !is_pipeline_internal(meta.target())));
    let bridge_layer = OpenTelemetryTracingBridge::new(&telemetry.providers.logger)
        .with_filter(filter_fn(|meta| !is_pipeline_internal(meta.target())));

    let registry = Registry::default()
        .with(filter)
        .with(bridge_layer)
        .with(otel_trace_layer);

    // Console formatting: plain compact single-line output.
    #[cfg(feature = "console-log")]
    let registry = registry.with(
        fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .compact(),
    );

    registry
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
