//! Listener trait and built-in sinks
//!
//! Exactly one listener is active per engine. Dispatch happens on the
//! thread that performed the observed operation, so implementations must
//! tolerate concurrent invocation and should keep handlers cheap:
//! blocking I/O here directly inflates observed-call latency.

use crate::event::{ExternalCallEvent, RequestEvent, ResponseEvent, TickEvent};

/// Sink receiving finalized events.
///
/// Handlers are invoked synchronously from arbitrary threads. A panic in a
/// handler is caught by the dispatcher and never reaches the observed
/// operation's caller.
pub trait TrafficListener: Send + Sync {
    /// One accepted request/response pair completed.
    fn on_completed(&self, request: &RequestEvent, response: &ResponseEvent);

    /// The application entered an opaque external channel.
    fn on_external_call(&self, request: &ExternalCallEvent);

    /// One sampling window of ambient traffic closed.
    fn on_tick(&self, tick: &TickEvent);
}

/// Listener that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl TrafficListener for NullListener {
    fn on_completed(&self, _request: &RequestEvent, _response: &ResponseEvent) {}
    fn on_external_call(&self, _request: &ExternalCallEvent) {}
    fn on_tick(&self, _tick: &TickEvent) {}
}

/// Listener that logs each event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl TrafficListener for LogListener {
    fn on_completed(&self, request: &RequestEvent, response: &ResponseEvent) {
        tracing::debug!(
            source_id = request.source.id,
            site = %request.source.label,
            line = request.source.line,
            target = request.target.as_deref().unwrap_or("-"),
            request_bytes = request.bytes,
            response_bytes = response.bytes,
            status = response.status,
            duration_us = response.duration.as_micros() as u64,
            "observed call completed"
        );
    }

    fn on_external_call(&self, request: &ExternalCallEvent) {
        tracing::debug!(
            source_id = request.source.id,
            site = %request.source.label,
            line = request.source.line,
            "external call"
        );
    }

    fn on_tick(&self, tick: &TickEvent) {
        tracing::debug!(sent = tick.sent, received = tick.received, "traffic tick");
    }
}
