//! Reference wire exporter
//!
//! One possible listener, not a core requirement: each accepted event
//! becomes a small JSON record `{type, time_point, size}` written as one
//! line to a configured sink. Write failures are logged and dropped;
//! an exporter outage must never surface in the observed call.

use crate::event::{ExternalCallEvent, RequestEvent, ResponseEvent, TickEvent};
use crate::listener::TrafficListener;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::SystemTime;

/// One exported event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// `"call"`, `"potential"` or `"tick"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Event time as epoch milliseconds
    pub time_point: u64,
    /// Payload size in bytes, when the event carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl WireRecord {
    fn new(kind: &str, at: SystemTime, size: Option<u64>) -> Self {
        Self {
            kind: kind.to_string(),
            time_point: epoch_millis(at),
            size,
        }
    }
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Listener serializing each event as one JSON line into a writer.
pub struct JsonLinesListener<W: Write + Send> {
    sink: Mutex<W>,
}

impl<W: Write + Send> JsonLinesListener<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    fn write(&self, record: &WireRecord) {
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            // A writer that panicked mid-write stays unusable; skip.
            Err(_) => return,
        };
        let outcome = serde_json::to_writer(&mut *sink, record)
            .map_err(anyhow::Error::from)
            .and_then(|()| sink.write_all(b"\n").map_err(anyhow::Error::from));
        if let Err(error) = outcome {
            tracing::warn!("wire export failed: {error:#}");
        }
    }
}

impl JsonLinesListener<TcpStream> {
    /// Connect the exporter to a TCP sink such as `127.0.0.1:8080`.
    pub fn tcp(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let stream = TcpStream::connect(&addr)
            .with_context(|| format!("Failed to connect wire sink {addr:?}"))?;
        Ok(Self::new(stream))
    }
}

impl<W: Write + Send> TrafficListener for JsonLinesListener<W> {
    fn on_completed(&self, request: &RequestEvent, _response: &ResponseEvent) {
        self.write(&WireRecord::new("call", request.started_at, request.bytes));
    }

    fn on_external_call(&self, request: &ExternalCallEvent) {
        self.write(&WireRecord::new("potential", request.started_at, None));
    }

    fn on_tick(&self, tick: &TickEvent) {
        self.write(&WireRecord::new("tick", tick.timestamp, Some(tick.sent)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CodeSource;
    use std::sync::Arc;
    use std::time::Duration;

    /// Writer capturing exported bytes for inspection.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lines(captured: &Captured) -> Vec<WireRecord> {
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn request(at: SystemTime) -> RequestEvent {
        RequestEvent {
            source: CodeSource {
                id: 5,
                label: "client.rs".to_string(),
                line: 8,
            },
            bytes: Some(256),
            target: None,
            started_at: at,
        }
    }

    #[test]
    fn test_completed_record_shape() {
        let captured = Captured::default();
        let listener = JsonLinesListener::new(captured.clone());
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        listener.on_completed(
            &request(at),
            &ResponseEvent {
                bytes: Some(512),
                status: Some(200),
                duration: Duration::from_millis(30),
            },
        );

        let records = lines(&captured);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "call");
        assert_eq!(records[0].time_point, 1_700_000_000_123);
        assert_eq!(records[0].size, Some(256));
    }

    #[test]
    fn test_external_record_has_no_size() {
        let captured = Captured::default();
        let listener = JsonLinesListener::new(captured.clone());
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(42);

        listener.on_external_call(&ExternalCallEvent {
            source: request(at).source,
            started_at: at,
        });

        let raw = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        // `size` is omitted entirely, not serialized as null.
        assert!(!raw.contains("size"));
        let records = lines(&captured);
        assert_eq!(records[0].kind, "potential");
        assert_eq!(records[0].time_point, 42);
        assert_eq!(records[0].size, None);
    }

    #[test]
    fn test_tick_record_carries_sent_bytes() {
        let captured = Captured::default();
        let listener = JsonLinesListener::new(captured.clone());

        listener.on_tick(&TickEvent {
            sent: 500,
            received: 100,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(1000),
        });

        let records = lines(&captured);
        assert_eq!(records[0].kind, "tick");
        assert_eq!(records[0].size, Some(500));
    }

    #[test]
    fn test_records_are_one_per_line() {
        let captured = Captured::default();
        let listener = JsonLinesListener::new(captured.clone());
        let at = SystemTime::now();

        for _ in 0..3 {
            listener.on_external_call(&ExternalCallEvent {
                source: request(at).source,
                started_at: at,
            });
        }
        assert_eq!(lines(&captured).len(), 3);
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("sink gone"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let listener = JsonLinesListener::new(Broken);
        // Must not panic or propagate.
        listener.on_tick(&TickEvent {
            sent: 1,
            received: 1,
            timestamp: SystemTime::now(),
        });
    }
}
