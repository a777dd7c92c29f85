// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use favorite_otel::{global, init_telemetry, shutdown_signal, TelemetryConfig};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::KeyValue;
use tracing::{info, info_span, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Stand-in for one inbound request of the hosting web framework.
async fn handle_request() {
    let Some(telemetry) = global() else {
        warn!("telemetry not installed");
        return;
    };
    let meter = telemetry.meter("favorite");
    let requests = meter.u64_counter("favorite.requests").build();
    let latency = meter.f64_histogram("favorite.request.duration").with_unit("s").build();

    let started = Instant::now();
    info!(task = "handle_request", "looking up favorite");
    tokio::time::sleep(Duration::from_millis(50))
        .instrument(info_span!("favorite.lookup"))
        .await;
    info!(task = "handle_request", "completed request");

    let route = KeyValue::new("route", "/favorites");
    requests.add(1, &[route.clone()]);
    latency.record(started.elapsed().as_secs_f64(), &[route]);
}

async fn serve() {
    let mut headers = HashMap::new();
    headers.insert(
        "traceparent".to_string(),
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for id in 0u64.. {
        ticker.tick().await;
        let span = info_span!("handle_request", favorite.request_id = id);
        // Continue the caller's trace when a traceparent header came in.
        let parent = favorite_otel::propagation::extract_parent(&headers);
        if parent.has_active_span() {
            let _ = span.set_parent(parent);
        }
        handle_request().instrument(span).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = TelemetryConfig::from_env().context("invalid telemetry configuration")?;
    let telemetry = init_telemetry(cfg).context("failed to initialize telemetry")?;
    info!("application started");

    tokio::select! {
        _ = serve() => {}
        _ = shutdown_signal() => {}
    }

    info!("shutting down");
    let report = telemetry.shutdown();
    if !report.is_clean() {
        eprintln!("telemetry shutdown incomplete: {report:?}");
    }
    Ok(())
}
