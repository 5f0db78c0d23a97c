//! Event model for observed network activity
//!
//! Every observation produces immutable value types: a request/response
//! pair for an intercepted library call, a one-shot record for entry into
//! an opaque channel (process execution, embedded browser navigation), or
//! a periodic delta sample of ambient traffic counters.

use std::time::{Duration, SystemTime};

/// Identity of the application call path and lexical site behind an event.
///
/// `id` fingerprints the application-level call path (see
/// [`crate::fingerprint`]); `label` and `line` pin the specific
/// interception site. Created fresh per observation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeSource {
    /// 64-bit call-path fingerprint (0 when no in-prefix frames resolved)
    pub id: u64,
    /// Source file of the interception site
    pub label: String,
    /// Line number of the interception site
    pub line: u32,
}

/// An about-to-happen or just-happened outbound operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    /// Call path and site that triggered the operation
    pub source: CodeSource,
    /// Outbound payload size in bytes, if the adapter could measure it
    pub bytes: Option<u64>,
    /// Target of the operation (URL, host), if known
    pub target: Option<String>,
    /// Wall-clock start of the operation
    pub started_at: SystemTime,
}

impl RequestEvent {
    /// Build a request event starting now.
    pub fn new(source: CodeSource, bytes: Option<u64>, target: Option<String>) -> Self {
        Self {
            source,
            bytes,
            target,
            started_at: SystemTime::now(),
        }
    }
}

/// Outcome of one observed operation.
///
/// Paired 1:1 with a [`RequestEvent`] that passed the request filter;
/// never constructed otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    /// Inbound payload size in bytes, if measurable
    pub bytes: Option<u64>,
    /// Protocol status code, if the operation has one
    pub status: Option<u16>,
    /// Time the operation took
    pub duration: Duration,
}

/// Response measurements an adapter extracts from an operation's outcome.
///
/// The engine combines this with its own timing to build the
/// [`ResponseEvent`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResponseMeta {
    pub bytes: Option<u64>,
    pub status: Option<u16>,
}

/// Entry into an opaque channel for which no response can be measured.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCallEvent {
    /// Call path and site that entered the channel
    pub source: CodeSource,
    /// Wall-clock time of entry
    pub started_at: SystemTime,
}

impl ExternalCallEvent {
    /// Build an external-call event starting now.
    pub fn new(source: CodeSource) -> Self {
        Self {
            source,
            started_at: SystemTime::now(),
        }
    }
}

/// Ambient traffic over one sampling window, not attached to any
/// [`CodeSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickEvent {
    /// Bytes sent during the window
    pub sent: u64,
    /// Bytes received during the window
    pub received: u64,
    /// Wall-clock time the window closed
    pub timestamp: SystemTime,
}
