//! Event dispatch
//!
//! [`Dispatcher`] routes accepted events to the single active listener,
//! synchronously, on whichever thread produced the event. Every listener
//! invocation is isolated: a panicking listener is logged and dropped,
//! never surfaced to the observed operation's caller.
//!
//! Synchronous dispatch is a deliberate low-volume-diagnostics tradeoff.
//! For hosts where listener I/O cost matters, [`QueuedListener`] decouples
//! the hot path from delivery through a bounded lock-free queue with a
//! dedicated drain thread and a drop-oldest overflow policy.

use crate::event::{ExternalCallEvent, RequestEvent, ResponseEvent, TickEvent};
use crate::listener::TrafficListener;
use crossbeam::queue::ArrayQueue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Routes accepted events to exactly one active listener.
#[derive(Clone)]
pub struct Dispatcher {
    listener: Arc<dyn TrafficListener>,
}

impl Dispatcher {
    pub fn new(listener: Arc<dyn TrafficListener>) -> Self {
        Self { listener }
    }

    /// Deliver one accepted request/response pair.
    pub fn completed(&self, request: &RequestEvent, response: &ResponseEvent) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.listener.on_completed(request, response);
        }));
        if outcome.is_err() {
            tracing::warn!(source_id = request.source.id, "listener panicked in on_completed");
        }
    }

    /// Deliver one accepted external-call event.
    pub fn external_call(&self, request: &ExternalCallEvent) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.listener.on_external_call(request);
        }));
        if outcome.is_err() {
            tracing::warn!(
                source_id = request.source.id,
                "listener panicked in on_external_call"
            );
        }
    }

    /// Deliver one sampling tick.
    pub fn tick(&self, tick: &TickEvent) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.listener.on_tick(tick);
        }));
        if outcome.is_err() {
            tracing::warn!("listener panicked in on_tick");
        }
    }
}

/// One queued event awaiting delivery by the drain thread.
enum QueuedEvent {
    Completed(RequestEvent, ResponseEvent),
    External(ExternalCallEvent),
    Tick(TickEvent),
}

/// Queue statistics for a [`QueuedListener`].
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub pushed: u64,
    pub dropped: u64,
    pub depth: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Fraction of pushed events displaced by overflow (0.0 to 1.0).
    pub fn drop_rate(&self) -> f64 {
        if self.pushed == 0 {
            0.0
        } else {
            self.dropped as f64 / self.pushed as f64
        }
    }
}

/// Listener decorator that buffers events through a bounded lock-free
/// queue and delivers them from a dedicated drain thread.
///
/// The enqueue path never blocks: when the queue is full the oldest
/// event is displaced and counted. Per-thread enqueue order is preserved
/// by the FIFO queue. Dropping the decorator signals the drain thread,
/// which delivers whatever is still queued before exiting.
pub struct QueuedListener {
    queue: Arc<ArrayQueue<QueuedEvent>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl QueuedListener {
    /// Pause between drain sweeps when the queue is empty.
    const IDLE_WAIT: Duration = Duration::from_millis(5);

    /// Wrap `inner` with a queue of the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(inner: Arc<dyn TrafficListener>, capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");

        let queue = Arc::new(ArrayQueue::new(capacity));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_queue = Arc::clone(&queue);
        let worker_shutdown = Arc::clone(&shutdown);
        let delivery = Dispatcher::new(inner);
        let worker = thread::spawn(move || {
            Self::drain_worker(worker_queue, worker_shutdown, delivery);
        });

        Self {
            queue,
            shutdown,
            worker: Some(worker),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            depth: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    /// Signal the drain thread and wait for it to deliver the backlog.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn enqueue(&self, event: QueuedEvent) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if self.queue.force_push(event).is_some() {
            // Oldest event displaced: queue is saturated.
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stop_worker(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn drain_worker(
        queue: Arc<ArrayQueue<QueuedEvent>>,
        shutdown: Arc<AtomicBool>,
        delivery: Dispatcher,
    ) {
        loop {
            let stopping = shutdown.load(Ordering::SeqCst);

            let mut delivered = false;
            while let Some(event) = queue.pop() {
                delivered = true;
                match event {
                    QueuedEvent::Completed(request, response) => {
                        delivery.completed(&request, &response);
                    }
                    QueuedEvent::External(request) => delivery.external_call(&request),
                    QueuedEvent::Tick(tick) => delivery.tick(&tick),
                }
            }

            if stopping {
                break;
            }
            if !delivered {
                thread::sleep(Self::IDLE_WAIT);
            }
        }
    }
}

impl TrafficListener for QueuedListener {
    fn on_completed(&self, request: &RequestEvent, response: &ResponseEvent) {
        self.enqueue(QueuedEvent::Completed(request.clone(), response.clone()));
    }

    fn on_external_call(&self, request: &ExternalCallEvent) {
        self.enqueue(QueuedEvent::External(request.clone()));
    }

    fn on_tick(&self, tick: &TickEvent) {
        self.enqueue(QueuedEvent::Tick(tick.clone()));
    }
}

impl Drop for QueuedListener {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CodeSource;
    use std::sync::Mutex;
    use std::time::SystemTime;

    fn request() -> RequestEvent {
        RequestEvent::new(
            CodeSource {
                id: 7,
                label: "client.rs".to_string(),
                line: 3,
            },
            Some(10),
            None,
        )
    }

    fn response() -> ResponseEvent {
        ResponseEvent {
            bytes: Some(20),
            status: Some(200),
            duration: Duration::from_millis(1),
        }
    }

    fn tick() -> TickEvent {
        TickEvent {
            sent: 500,
            received: 100,
            timestamp: SystemTime::now(),
        }
    }

    #[derive(Default)]
    struct Recording {
        completed: Mutex<Vec<(RequestEvent, ResponseEvent)>>,
        external: Mutex<Vec<ExternalCallEvent>>,
        ticks: Mutex<Vec<TickEvent>>,
    }

    impl TrafficListener for Recording {
        fn on_completed(&self, request: &RequestEvent, response: &ResponseEvent) {
            self.completed
                .lock()
                .unwrap()
                .push((request.clone(), response.clone()));
        }
        fn on_external_call(&self, request: &ExternalCallEvent) {
            self.external.lock().unwrap().push(request.clone());
        }
        fn on_tick(&self, tick: &TickEvent) {
            self.ticks.lock().unwrap().push(tick.clone());
        }
    }

    struct Panicking;

    impl TrafficListener for Panicking {
        fn on_completed(&self, _: &RequestEvent, _: &ResponseEvent) {
            panic!("exporter down");
        }
        fn on_external_call(&self, _: &ExternalCallEvent) {
            panic!("exporter down");
        }
        fn on_tick(&self, _: &TickEvent) {
            panic!("exporter down");
        }
    }

    #[test]
    fn test_dispatcher_delivers_each_event_once() {
        let recording = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new(recording.clone());

        dispatcher.completed(&request(), &response());
        dispatcher.external_call(&ExternalCallEvent::new(request().source));
        dispatcher.tick(&tick());

        assert_eq!(recording.completed.lock().unwrap().len(), 1);
        assert_eq!(recording.external.lock().unwrap().len(), 1);
        assert_eq!(recording.ticks.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dispatcher_isolates_panicking_listener() {
        let dispatcher = Dispatcher::new(Arc::new(Panicking));
        // None of these may unwind into the caller.
        dispatcher.completed(&request(), &response());
        dispatcher.external_call(&ExternalCallEvent::new(request().source));
        dispatcher.tick(&tick());
    }

    #[test]
    fn test_queued_listener_delivers_backlog_on_shutdown() {
        let recording = Arc::new(Recording::default());
        let queued = QueuedListener::new(recording.clone(), 64);

        for _ in 0..10 {
            queued.on_completed(&request(), &response());
        }
        queued.on_tick(&tick());
        queued.shutdown();

        assert_eq!(recording.completed.lock().unwrap().len(), 10);
        assert_eq!(recording.ticks.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_queued_listener_counts_pushes() {
        let queued = QueuedListener::new(Arc::new(crate::listener::NullListener), 8);
        for _ in 0..5 {
            queued.on_tick(&tick());
        }
        let stats = queued.stats();
        assert_eq!(stats.pushed, 5);
        assert_eq!(stats.capacity, 8);
    }

    #[test]
    fn test_queue_stats_drop_rate() {
        let stats = QueueStats {
            pushed: 200,
            dropped: 10,
            depth: 4,
            capacity: 64,
        };
        assert_eq!(stats.drop_rate(), 0.05);

        let empty = QueueStats {
            pushed: 0,
            dropped: 0,
            depth: 0,
            capacity: 64,
        };
        assert_eq!(empty.drop_rate(), 0.0);
    }

    #[test]
    #[should_panic(expected = "queue capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = QueuedListener::new(Arc::new(crate::listener::NullListener), 0);
    }
}
