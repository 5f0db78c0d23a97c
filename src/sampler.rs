//! Periodic differential traffic sampling
//!
//! Traffic that no interception point can see (native code, helper
//! processes, platform internals) still moves the host's cumulative byte
//! counters. The sampler polls those counters from a dedicated background
//! thread and attributes the deltas to fixed windows as [`TickEvent`]s.
//!
//! The wait sits between the two reads of a window rather than on a fixed
//! wall-clock grid, so dispatch and read latency drift the cadence; that
//! is acceptable for diagnostic sampling. Each iteration reads fresh
//! values, so a slow listener delays the next window but never corrupts a
//! delta.

use crate::dispatch::Dispatcher;
use crate::event::TickEvent;
use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

/// Nominal sampling cadence.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1000);

/// Cumulative byte counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    /// Total bytes sent since counter start
    pub sent: u64,
    /// Total bytes received since counter start
    pub received: u64,
}

/// Source of cumulative sent/received byte counters.
///
/// Which source fits (whole host, one interface, a cgroup) depends on the
/// platform and is decided at the composition root.
pub trait TrafficCounters: Send {
    fn read(&mut self) -> Result<CounterSample>;
}

/// Counters read from `/proc/net/dev`, loopback excluded.
#[derive(Debug, Clone)]
pub struct ProcNetDev {
    path: PathBuf,
}

impl ProcNetDev {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/proc/net/dev"),
        }
    }

    /// Read counters from an alternate file in `/proc/net/dev` format.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcNetDev {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficCounters for ProcNetDev {
    fn read(&mut self) -> Result<CounterSample> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        parse_proc_net_dev(&text)
    }
}

/// Sum per-interface rx/tx byte columns of `/proc/net/dev` content.
///
/// Layout per interface line: `iface: rx_bytes rx_packets ... tx_bytes ...`
/// with `tx_bytes` as the 9th numeric column. `lo` does not count.
fn parse_proc_net_dev(text: &str) -> Result<CounterSample> {
    let mut sent: u64 = 0;
    let mut received: u64 = 0;

    for line in text.lines() {
        let Some((iface, counters)) = line.split_once(':') else {
            continue; // header lines
        };
        let iface = iface.trim();
        if iface == "lo" {
            continue;
        }

        let fields: Vec<&str> = counters.split_whitespace().collect();
        let parse = |index: usize| -> Result<u64> {
            fields
                .get(index)
                .and_then(|field| field.parse().ok())
                .with_context(|| format!("Malformed counter line for interface {iface}"))
        };
        received = received.saturating_add(parse(0)?);
        sent = sent.saturating_add(parse(8)?);
    }

    Ok(CounterSample { sent, received })
}

/// Background sampler emitting one [`TickEvent`] per window.
///
/// Holds a dedicated thread for its whole lifetime; [`stop`](Self::stop)
/// or dropping the handle signals the loop and joins it.
pub struct TrafficSampler {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TrafficSampler {
    /// Start sampling `counters` on a background thread, dispatching each
    /// window's delta through `dispatcher`.
    pub fn spawn(
        counters: impl TrafficCounters + 'static,
        dispatcher: Dispatcher,
        period: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let worker = thread::spawn(move || {
            sample_loop(counters, dispatcher, period, stop_rx);
        });
        Self {
            stop: Some(stop_tx),
            worker: Some(worker),
        }
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TrafficSampler {
    fn drop(&mut self) {
        self.halt();
    }
}

fn sample_loop(
    mut counters: impl TrafficCounters,
    dispatcher: Dispatcher,
    period: Duration,
    stop: Receiver<()>,
) {
    loop {
        let first = match counters.read() {
            Ok(sample) => Some(sample),
            Err(error) => {
                tracing::warn!("traffic counter read failed: {error:#}");
                None
            }
        };

        // The period wait doubles as the cancellation point.
        match stop.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(first) = first else {
            continue; // window lost to a read error; try the next one
        };
        let second = match counters.read() {
            Ok(sample) => sample,
            Err(error) => {
                tracing::warn!("traffic counter read failed: {error:#}");
                continue;
            }
        };

        // Saturating: a counter reset must not produce a bogus delta.
        dispatcher.tick(&TickEvent {
            sent: second.sent.saturating_sub(first.sent),
            received: second.received.saturating_sub(first.received),
            timestamp: SystemTime::now(),
        });
    }
}
