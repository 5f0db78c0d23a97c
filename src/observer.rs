//! Adapter-facing observation engine
//!
//! Per-library adapters translate concrete API calls into the generic
//! event shapes and hand them here. The engine is a transparent observer:
//! the wrapped operation runs exactly once on every path, and its value or
//! panic reaches the real caller unchanged, whatever the filters or the
//! listener do.

use crate::dispatch::Dispatcher;
use crate::event::{ExternalCallEvent, RequestEvent, ResponseEvent, ResponseMeta};
use crate::filter::{AcceptAll, RequestFilter, ResponseFilter};
use crate::listener::TrafficListener;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Event-attribution and dispatch engine.
///
/// Built once at a composition root from explicit parts; treated as
/// read-only afterwards, so it can be shared freely across threads.
pub struct NetworkObserver {
    request_filter: Arc<dyn RequestFilter>,
    response_filter: Arc<dyn ResponseFilter>,
    dispatcher: Dispatcher,
}

impl NetworkObserver {
    /// Engine with accept-all filters and the given listener.
    pub fn new(listener: Arc<dyn TrafficListener>) -> Self {
        Self::with_filters(Arc::new(AcceptAll), Arc::new(AcceptAll), listener)
    }

    pub fn with_filters(
        request_filter: Arc<dyn RequestFilter>,
        response_filter: Arc<dyn ResponseFilter>,
        listener: Arc<dyn TrafficListener>,
    ) -> Self {
        Self {
            request_filter,
            response_filter,
            dispatcher: Dispatcher::new(listener),
        }
    }

    /// Dispatcher sharing this engine's listener, for wiring a sampler to
    /// the same sink.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Observe one request/response operation.
    ///
    /// `op` performs the real work and reports the measurements the
    /// adapter can extract from its outcome. It runs exactly once whether
    /// the event is accepted, rejected at either filter stage, or the
    /// filters themselves misbehave; its return value is passed through
    /// untouched and a panic inside it unwinds to the caller unchanged.
    pub fn submit_request_response<T>(
        &self,
        request: RequestEvent,
        op: impl FnOnce() -> (T, ResponseMeta),
    ) -> T {
        if !self.accept_request(&request) {
            // Rejected up front: run the operation, skip measurement
            // entirely, and never build a response event for this call.
            let (value, _meta) = op();
            return value;
        }

        let started = Instant::now();
        let (value, meta) = op();
        let duration = started.elapsed();

        let response = ResponseEvent {
            bytes: meta.bytes,
            status: meta.status,
            duration,
        };
        if self.accept_response(&response) {
            self.dispatcher.completed(&request, &response);
        }

        value
    }

    /// Report entry into an opaque channel (process execution, embedded
    /// browser navigation). Fire-and-forget; filters do not apply.
    pub fn submit_external_call(&self, request: ExternalCallEvent) {
        self.dispatcher.external_call(&request);
    }

    /// A panicking filter must not disturb the observed call; treat the
    /// panic as rejection so nothing gets dispatched.
    fn accept_request(&self, request: &RequestEvent) -> bool {
        catch_unwind(AssertUnwindSafe(|| self.request_filter.accept(request))).unwrap_or_else(
            |_| {
                tracing::warn!(source_id = request.source.id, "request filter panicked");
                false
            },
        )
    }

    fn accept_response(&self, response: &ResponseEvent) -> bool {
        catch_unwind(AssertUnwindSafe(|| self.response_filter.accept(response))).unwrap_or_else(
            |_| {
                tracing::warn!("response filter panicked");
                false
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CodeSource;
    use crate::listener::NullListener;

    fn request() -> RequestEvent {
        RequestEvent::new(
            CodeSource {
                id: 9,
                label: "client.rs".to_string(),
                line: 21,
            },
            Some(64),
            Some("https://example.com".to_string()),
        )
    }

    struct RejectRequests;

    impl RequestFilter for RejectRequests {
        fn accept(&self, _: &RequestEvent) -> bool {
            false
        }
    }

    #[test]
    fn test_operation_value_passes_through() {
        let observer = NetworkObserver::new(Arc::new(NullListener));
        let value =
            observer.submit_request_response(request(), || (42u32, ResponseMeta::default()));
        assert_eq!(value, 42);
    }

    #[test]
    fn test_rejected_request_still_returns_value() {
        let observer = NetworkObserver::with_filters(
            Arc::new(RejectRequests),
            Arc::new(AcceptAll),
            Arc::new(NullListener),
        );
        let value = observer
            .submit_request_response(request(), || ("done", ResponseMeta::default()));
        assert_eq!(value, "done");
    }

    #[test]
    fn test_operation_runs_exactly_once_when_rejected() {
        let observer = NetworkObserver::with_filters(
            Arc::new(RejectRequests),
            Arc::new(AcceptAll),
            Arc::new(NullListener),
        );
        let mut runs = 0;
        observer.submit_request_response(request(), || {
            runs += 1;
            ((), ResponseMeta::default())
        });
        assert_eq!(runs, 1);
    }

    // Dispatch counting, panic transparency and filter-panic behavior are
    // covered by tests/observer_pipeline.rs against a recording listener.
}
