// SPDX-License-Identifier: MIT
//! Bounded flush-and-close of the pipeline, and the process termination hook.
//!
//! Closing never fails and never hangs: each provider is flushed and shut down on its
//! own helper thread, and the caller waits at most the configured timeout. Providers
//! that did not finish in time are reported and left behind so process exit can
//! proceed.

use std::fmt;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::Signal;
use crate::provider::Providers;
use crate::telemetry::Telemetry;

/// Outcome of closing the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Signals whose buffers were flushed and exporters released.
    pub completed: Vec<Signal>,
    /// Signals whose flush or shutdown reported an error (data may be lost).
    pub failed: Vec<(Signal, String)>,
    /// Signals still flushing when the timeout elapsed.
    pub timed_out: Vec<Signal>,
    /// Set when the pipeline had already been closed; nothing was done.
    pub already_closed: bool,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }

    pub(crate) fn already_closed() -> Self {
        Self {
            already_closed: true,
            ..Self::default()
        }
    }

    fn log(&self) {
        if self.is_clean() {
            info!(signals = ?self.completed, "telemetry flushed and closed");
            return;
        }
        for (signal, reason) in &self.failed {
            warn!(%signal, %reason, "telemetry flush failed, buffered records dropped");
        }
        if !self.timed_out.is_empty() {
            warn!(signals = ?self.timed_out, "telemetry flush timed out, continuing shutdown");
        }
    }
}

type CloseTask = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// Flush then shut down every provider, waiting at most `timeout` overall.
pub(crate) fn close_providers(providers: &Providers, timeout: Duration) -> ShutdownReport {
    let tracer = providers.tracer.clone();
    let meter = providers.meter.clone();
    let logger = providers.logger.clone();
    let tasks: [(Signal, CloseTask); 3] = [
        (
            Signal::Traces,
            Box::new(move || finish(tracer.force_flush(), || tracer.shutdown())),
        ),
        (
            Signal::Metrics,
            Box::new(move || finish(meter.force_flush(), || meter.shutdown())),
        ),
        (
            Signal::Logs,
            Box::new(move || finish(logger.force_flush(), || logger.shutdown())),
        ),
    ];

    let mut report = ShutdownReport::default();
    let mut pending = Vec::with_capacity(tasks.len());
    let (tx, rx) = mpsc::channel();
    for (signal, task) in tasks {
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("otel-close-{signal}"))
            .spawn(move || {
                // The receiver is gone once the deadline passed; nothing to report to.
                let _ = tx.send((signal, task()));
            });
        match spawned {
            Ok(_) => pending.push(signal),
            Err(e) => report.failed.push((signal, e.to_string())),
        }
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    while !pending.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((signal, result)) => {
                pending.retain(|s| *s != signal);
                match result {
                    Ok(()) => report.completed.push(signal),
                    Err(reason) => report.failed.push((signal, reason)),
                }
            }
            Err(_) => break,
        }
    }
    report.timed_out = pending;
    report.log();
    report
}

fn finish<E, F>(flushed: Result<(), E>, shutdown: F) -> Result<(), String>
where
    E: fmt::Display,
    F: FnOnce() -> Result<(), E>,
{
    let mut errs = Vec::new();
    if let Err(e) = flushed {
        errs.push(format!("flush: {e}"));
    }
    if let Err(e) = shutdown() {
        errs.push(format!("shutdown: {e}"));
    }
    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs.join(", "))
    }
}

/// Scoped owner of the installed pipeline.
///
/// Returned by [`crate::telemetry::init_telemetry`]. Call [`TelemetryHandle::shutdown`]
/// at a controlled point before exiting; if the handle is dropped instead (early
/// return, `?`, panic unwinding) the pipeline is closed from `Drop`. Either way the
/// close is bounded by the configured timeout and never returns an error.
pub struct TelemetryHandle {
    telemetry: &'static Telemetry,
    timeout: Duration,
}

impl TelemetryHandle {
    pub(crate) fn new(telemetry: &'static Telemetry, timeout: Duration) -> Self {
        Self { telemetry, timeout }
    }

    pub fn telemetry(&self) -> &'static Telemetry {
        self.telemetry
    }

    /// Flush and close all providers.
    ///
    /// # Examples
    /// ```no_run
    /// # use favorite_otel::{init_telemetry, TelemetryConfig};
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let handle = init_telemetry(TelemetryConfig::from_env()?)?;
    /// // work...
    /// let report = handle.shutdown();
    /// assert!(report.timed_out.is_empty());
    /// # Ok(()) }
    /// ```
    pub fn shutdown(self) -> ShutdownReport {
        self.telemetry.close(self.timeout)
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        if !self.telemetry.is_closed() {
            self.telemetry.close(self.timeout);
        }
    }
}

impl fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("closed", &self.telemetry.is_closed())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Resolves when the process is asked to terminate (Ctrl-C, or SIGTERM on Unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
