// SPDX-License-Identifier: MIT
//! Tracer, meter and logger providers.
//!
//! Each provider wraps its exporter behind a buffering stage so emit calls never wait
//! on the network:
//!
//! * traces: [`BatchSpanProcessor`] + [`SamplerPolicy`] (always sample by default);
//! * metrics: [`PeriodicReader`] exporting on a fixed interval;
//! * logs: [`BatchLogProcessor`].
//!
//! The batch processors and the periodic reader run on their own background threads.
//! The builders are generic over the SDK exporter traits so any exporter can be used.

use std::time::Duration;

use opentelemetry_sdk::logs::{self, BatchLogProcessor, LogExporter, SdkLoggerProvider};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{self, BatchSpanProcessor, Sampler, SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::Resource;

use crate::config::TelemetryConfig;
use crate::error::ConfigError;
use crate::exporter::Exporters;

/// Default metric export interval.
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(60);

/// Which traces are recorded and exported.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SamplerPolicy {
    /// Record every trace.
    #[default]
    AlwaysOn,
    AlwaysOff,
    /// Keep a fixed fraction of traces, by trace id.
    TraceIdRatio(f64),
    /// Follow the parent's decision; use the inner policy for root spans.
    ParentBased(Box<SamplerPolicy>),
}

impl SamplerPolicy {
    /// Parse the standard `OTEL_TRACES_SAMPLER` / `OTEL_TRACES_SAMPLER_ARG` pair.
    ///
    /// A missing ratio argument means `1.0`.
    pub fn from_name(name: &str, arg: Option<&str>) -> Result<Self, ConfigError> {
        let ratio = || -> Result<f64, ConfigError> {
            let Some(raw) = arg else {
                return Ok(1.0);
            };
            match raw.trim().parse::<f64>() {
                Ok(r) if (0.0..=1.0).contains(&r) => Ok(r),
                _ => Err(ConfigError::InvalidSamplerArg(raw.to_string())),
            }
        };

        let policy = match name.trim().to_ascii_lowercase().as_str() {
            "always_on" => Self::AlwaysOn,
            "always_off" => Self::AlwaysOff,
            "traceidratio" => Self::TraceIdRatio(ratio()?),
            "parentbased_always_on" => Self::ParentBased(Box::new(Self::AlwaysOn)),
            "parentbased_always_off" => Self::ParentBased(Box::new(Self::AlwaysOff)),
            "parentbased_traceidratio" => {
                Self::ParentBased(Box::new(Self::TraceIdRatio(ratio()?)))
            }
            _ => return Err(ConfigError::InvalidSampler(name.to_string())),
        };
        Ok(policy)
    }

    pub fn to_sampler(&self) -> Sampler {
        match self {
            Self::AlwaysOn => Sampler::AlwaysOn,
            Self::AlwaysOff => Sampler::AlwaysOff,
            Self::TraceIdRatio(ratio) => Sampler::TraceIdRatioBased(*ratio),
            Self::ParentBased(root) => Sampler::ParentBased(Box::new(root.to_sampler())),
        }
    }
}

/// Buffering thresholds of a batch processor.
///
/// A batch is exported when `max_export_batch_size` records are queued or
/// `scheduled_delay` has elapsed, whichever comes first. Records arriving while the
/// queue holds `max_queue_size` entries are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    pub scheduled_delay: Duration,
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
}

impl BatchPolicy {
    /// OpenTelemetry defaults for spans.
    pub fn spans_default() -> Self {
        Self {
            scheduled_delay: Duration::from_millis(5000),
            max_queue_size: 2048,
            max_export_batch_size: 512,
        }
    }

    /// OpenTelemetry defaults for log records.
    pub fn logs_default() -> Self {
        Self {
            scheduled_delay: Duration::from_millis(1000),
            ..Self::spans_default()
        }
    }
}

pub fn build_tracer_provider<E>(
    resource: Resource,
    exporter: E,
    batch: &BatchPolicy,
    sampler: &SamplerPolicy,
) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    let config = trace::BatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size)
        .with_scheduled_delay(batch.scheduled_delay)
        .with_max_export_batch_size(batch.max_export_batch_size)
        .build();
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(config)
        .build();

    SdkTracerProvider::builder()
        .with_span_processor(processor)
        .with_sampler(sampler.to_sampler())
        .with_resource(resource)
        .build()
}

pub fn build_meter_provider<E>(
    resource: Resource,
    exporter: E,
    interval: Duration,
) -> SdkMeterProvider
where
    E: PushMetricExporter + 'static,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build()
}

pub fn build_logger_provider<E>(
    resource: Resource,
    exporter: E,
    batch: &BatchPolicy,
) -> SdkLoggerProvider
where
    E: LogExporter + 'static,
{
    let config = logs::BatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size)
        .with_scheduled_delay(batch.scheduled_delay)
        .with_max_export_batch_size(batch.max_export_batch_size)
        .build();
    let processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(config)
        .build();

    SdkLoggerProvider::builder()
        .with_log_processor(processor)
        .with_resource(resource)
        .build()
}

/// The provider trio. Provider handles are reference counted; clones share state.
#[derive(Clone, Debug)]
pub struct Providers {
    pub tracer: SdkTracerProvider,
    pub meter: SdkMeterProvider,
    pub logger: SdkLoggerProvider,
}

impl Providers {
    /// Wrap the OTLP exporters in providers sharing one resource.
    pub fn build(resource: &Resource, exporters: Exporters, cfg: &TelemetryConfig) -> Self {
        Self {
            tracer: build_tracer_provider(
                resource.clone(),
                exporters.spans,
                &cfg.span_batch,
                &cfg.sampler,
            ),
            meter: build_meter_provider(resource.clone(), exporters.metrics, cfg.metric_interval),
            logger: build_logger_provider(resource.clone(), exporters.logs, &cfg.log_batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{build_resource, ServiceIdentity};
    use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider as _};
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry::trace::{Tracer as _, TracerProvider as _};
    use opentelemetry::{Key, Value};
    use opentelemetry_sdk::logs::InMemoryLogExporter;
    use opentelemetry_sdk::metrics::InMemoryMetricExporter;
    use opentelemetry_sdk::trace::InMemorySpanExporter;

    fn resource() -> Resource {
        build_resource(&ServiceIdentity::new("favorite", None, None).unwrap())
    }

    #[test]
    fn sampler_names_are_parsed() {
        assert_eq!(
            SamplerPolicy::from_name("always_on", None).unwrap(),
            SamplerPolicy::AlwaysOn
        );
        assert_eq!(
            SamplerPolicy::from_name("TraceIdRatio", Some("0.25")).unwrap(),
            SamplerPolicy::TraceIdRatio(0.25)
        );
        assert_eq!(
            SamplerPolicy::from_name("parentbased_traceidratio", None).unwrap(),
            SamplerPolicy::ParentBased(Box::new(SamplerPolicy::TraceIdRatio(1.0)))
        );
        assert!(matches!(
            SamplerPolicy::from_name("jaeger_remote", None),
            Err(ConfigError::InvalidSampler(_))
        ));
        assert!(matches!(
            SamplerPolicy::from_name("traceidratio", Some("1.5")),
            Err(ConfigError::InvalidSamplerArg(_))
        ));
    }

    #[test]
    fn default_sampler_records_every_span() {
        assert_eq!(SamplerPolicy::default(), SamplerPolicy::AlwaysOn);

        let exporter = InMemorySpanExporter::default();
        let provider = build_tracer_provider(
            resource(),
            exporter.clone(),
            &BatchPolicy::spans_default(),
            &SamplerPolicy::default(),
        );
        let tracer = provider.tracer("provider-test");
        for _ in 0..10 {
            tracer.in_span("favorite.lookup", |_cx| {});
        }
        provider.force_flush().unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 10);
        assert!(spans.iter().all(|s| s.span_context.is_sampled()));
        assert!(spans.iter().all(|s| s.name == "favorite.lookup"));
    }

    #[test]
    fn always_off_drops_spans() {
        let exporter = InMemorySpanExporter::default();
        let provider = build_tracer_provider(
            resource(),
            exporter.clone(),
            &BatchPolicy::spans_default(),
            &SamplerPolicy::AlwaysOff,
        );
        provider.tracer("provider-test").in_span("dropped", |_cx| {});
        provider.force_flush().unwrap();

        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn spans_are_buffered_until_flush() {
        let exporter = InMemorySpanExporter::default();
        let batch = BatchPolicy {
            scheduled_delay: Duration::from_secs(3600),
            ..BatchPolicy::spans_default()
        };
        let provider =
            build_tracer_provider(resource(), exporter.clone(), &batch, &SamplerPolicy::AlwaysOn);
        provider.tracer("provider-test").in_span("buffered", |_cx| {});

        assert!(exporter.get_finished_spans().unwrap().is_empty());
        provider.force_flush().unwrap();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn metrics_are_exported_by_the_reader() {
        let exporter = InMemoryMetricExporter::default();
        let provider = build_meter_provider(resource(), exporter.clone(), DEFAULT_METRIC_INTERVAL);
        let counter = provider.meter("provider-test").u64_counter("requests").build();
        counter.add(1, &[]);
        counter.add(2, &[]);

        assert!(exporter.get_finished_metrics().unwrap().is_empty());
        provider.force_flush().unwrap();
        assert!(!exporter.get_finished_metrics().unwrap().is_empty());
    }

    #[test]
    fn log_records_carry_the_resource() {
        let exporter = InMemoryLogExporter::default();
        let provider =
            build_logger_provider(resource(), exporter.clone(), &BatchPolicy::logs_default());
        let logger = provider.logger("provider-test");
        let mut record = logger.create_log_record();
        record.set_body(AnyValue::String("favorite added".into()));
        logger.emit(record);
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].resource.get(&Key::from_static_str("service.name")),
            Some(Value::from("favorite"))
        );
    }
}
