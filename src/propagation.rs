// SPDX-License-Identifier: MIT
//! W3C Trace Context propagation (`traceparent` / `tracestate`).
//!
//! Carriers are anything implementing the OpenTelemetry [`Extractor`] / [`Injector`]
//! traits, e.g. a `HashMap<String, String>` of headers or a framework-specific
//! adapter. The functions are stateless.

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Decode a remote span context from `carrier`.
///
/// Returns `None` when no valid `traceparent` header is present.
pub fn extract_context(carrier: &dyn Extractor) -> Option<SpanContext> {
    let cx = TraceContextPropagator::new().extract(carrier);
    let span_context = cx.span().span_context().clone();
    span_context.is_valid().then_some(span_context)
}

/// Context to use as parent for spans handling an inbound call.
///
/// Falls back to an empty context (new root trace) when nothing is propagated.
pub fn extract_parent(carrier: &dyn Extractor) -> Context {
    TraceContextPropagator::new().extract(carrier)
}

/// Encode `span_context` into `carrier`. Invalid contexts write nothing.
pub fn inject_context(span_context: &SpanContext, carrier: &mut dyn Injector) {
    let cx = Context::new().with_remote_span_context(span_context.clone());
    TraceContextPropagator::new().inject_context(&cx, carrier);
}

/// Encode the span active in `cx` into `carrier` (for outbound calls).
pub fn inject_current(cx: &Context, carrier: &mut dyn Injector) {
    TraceContextPropagator::new().inject_context(cx, carrier);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};
    use std::collections::HashMap;

    fn remote(flags: TraceFlags, state: TraceState) -> SpanContext {
        SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            flags,
            true,
            state,
        )
    }

    #[test]
    fn inject_then_extract_round_trips() {
        let states = [
            TraceState::default(),
            TraceState::from_key_value([("vendor", "opaque"), ("favorite", "1")]).unwrap(),
        ];
        for flags in [TraceFlags::SAMPLED, TraceFlags::default()] {
            for state in states.clone() {
                let ctx = remote(flags, state);
                let mut carrier: HashMap<String, String> = HashMap::new();
                inject_context(&ctx, &mut carrier);
                assert_eq!(extract_context(&carrier), Some(ctx));
            }
        }
    }

    #[test]
    fn traceparent_header_format() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        inject_context(&remote(TraceFlags::SAMPLED, TraceState::default()), &mut carrier);
        assert_eq!(
            carrier.get("traceparent").map(String::as_str),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
    }

    #[test]
    fn extracts_inbound_header() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        let ctx = extract_context(&carrier).unwrap();
        assert!(ctx.is_remote());
        assert!(ctx.is_sampled());
        assert_eq!(
            ctx.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
    }

    #[test]
    fn missing_or_malformed_header_yields_none() {
        let empty: HashMap<String, String> = HashMap::new();
        assert_eq!(extract_context(&empty), None);

        let mut garbage: HashMap<String, String> = HashMap::new();
        garbage.insert("traceparent".to_string(), "not-a-traceparent".to_string());
        assert_eq!(extract_context(&garbage), None);
        assert!(!extract_parent(&garbage).has_active_span());
    }

    #[test]
    fn inject_current_writes_active_span() {
        let ctx = remote(TraceFlags::SAMPLED, TraceState::default());
        let cx = Context::new().with_remote_span_context(ctx.clone());
        let mut carrier: HashMap<String, String> = HashMap::new();
        inject_current(&cx, &mut carrier);
        assert_eq!(extract_context(&carrier), Some(ctx));
    }

    #[test]
    fn invalid_context_injects_nothing() {
        let mut carrier: HashMap<String, String> = HashMap::new();
        inject_context(&SpanContext::empty_context(), &mut carrier);
        assert!(carrier.is_empty());
    }
}
