//! Netlens - in-process network activity observer
//!
//! This library attributes network-related activity inside a running
//! application to the code paths that caused it, without altering that
//! activity's outcome, and reports it as structured events to a single
//! pluggable listener. It provides call-site fingerprinting, two-stage
//! event filtering, synchronous dispatch with panic isolation, and a
//! periodic differential sampler for traffic no interception point can
//! see.

pub mod config;
pub mod dispatch;
pub mod event;
pub mod export;
pub mod filter;
pub mod fingerprint;
pub mod listener;
pub mod observer;
pub mod sampler;

pub use config::ObserverConfig;
pub use dispatch::Dispatcher;
pub use event::{
    CodeSource, ExternalCallEvent, RequestEvent, ResponseEvent, ResponseMeta, TickEvent,
};
pub use fingerprint::{CallSite, Fingerprinter};
pub use listener::TrafficListener;
pub use observer::NetworkObserver;
pub use sampler::TrafficSampler;
