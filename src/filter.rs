//! Two-stage event filtering
//!
//! Filters gate whether a finished observation reaches the listener; they
//! never gate the observed operation itself. The default accepts
//! everything. Expression-built filters support:
//! - requests: `target=REGEX`, `min_bytes=N`
//! - responses: `status=4xx|5xx|NNN`, `min_bytes=N`, `min_duration_ms=N`
//!
//! Clauses are comma-separated and all must hold for an event to pass.

use crate::event::{RequestEvent, ResponseEvent};
use anyhow::{bail, Context, Result};
use regex::Regex;

/// Accept/reject predicate over outbound requests.
///
/// `accept` must not panic; a panicking filter is treated as rejection by
/// the engine, and the observed operation is unaffected either way.
pub trait RequestFilter: Send + Sync {
    fn accept(&self, request: &RequestEvent) -> bool;
}

/// Accept/reject predicate over measured responses.
pub trait ResponseFilter: Send + Sync {
    fn accept(&self, response: &ResponseEvent) -> bool;
}

/// Default filter: passes every event through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RequestFilter for AcceptAll {
    fn accept(&self, _request: &RequestEvent) -> bool {
        true
    }
}

impl ResponseFilter for AcceptAll {
    fn accept(&self, _response: &ResponseEvent) -> bool {
        true
    }
}

/// Request filter built from an expression like
/// `target=^https://api\.,min_bytes=1024`.
#[derive(Debug)]
pub struct RequestRules {
    target: Option<Regex>,
    min_bytes: Option<u64>,
}

impl RequestRules {
    /// Parse a request filter expression.
    pub fn from_expr(expr: &str) -> Result<Self> {
        let mut target = None;
        let mut min_bytes = None;

        for clause in expr.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            match clause.split_once('=') {
                Some(("target", pattern)) => {
                    target = Some(
                        Regex::new(pattern)
                            .with_context(|| format!("Invalid target pattern: {pattern}"))?,
                    );
                }
                Some(("min_bytes", value)) => {
                    min_bytes = Some(parse_number(value, "min_bytes")?);
                }
                _ => bail!(
                    "Invalid request filter clause: {}. Expected target=REGEX or min_bytes=N",
                    clause
                ),
            }
        }

        Ok(Self { target, min_bytes })
    }
}

impl RequestFilter for RequestRules {
    fn accept(&self, request: &RequestEvent) -> bool {
        if let Some(pattern) = &self.target {
            // A request with no target cannot match a target rule.
            match &request.target {
                Some(target) if pattern.is_match(target) => {}
                _ => return false,
            }
        }
        if let Some(threshold) = self.min_bytes {
            if request.bytes.unwrap_or(0) < threshold {
                return false;
            }
        }
        true
    }
}

/// Response filter built from an expression like
/// `status=4xx|5xx,min_duration_ms=250`.
#[derive(Debug)]
pub struct ResponseRules {
    statuses: Option<Vec<StatusRule>>,
    min_bytes: Option<u64>,
    min_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
enum StatusRule {
    /// A status class such as `4xx`: any code in `[400, 500)`
    Class(u16),
    /// One exact status code
    Exact(u16),
}

impl StatusRule {
    fn matches(self, status: u16) -> bool {
        match self {
            StatusRule::Class(base) => (base..base + 100).contains(&status),
            StatusRule::Exact(code) => status == code,
        }
    }
}

impl ResponseRules {
    /// Parse a response filter expression.
    pub fn from_expr(expr: &str) -> Result<Self> {
        let mut statuses = None;
        let mut min_bytes = None;
        let mut min_duration_ms = None;

        for clause in expr.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            match clause.split_once('=') {
                Some(("status", spec)) => {
                    let mut rules = Vec::new();
                    for part in spec.split('|') {
                        rules.push(parse_status_rule(part.trim())?);
                    }
                    statuses = Some(rules);
                }
                Some(("min_bytes", value)) => {
                    min_bytes = Some(parse_number(value, "min_bytes")?);
                }
                Some(("min_duration_ms", value)) => {
                    min_duration_ms = Some(parse_number(value, "min_duration_ms")?);
                }
                _ => bail!(
                    "Invalid response filter clause: {}. \
                     Expected status=SPEC, min_bytes=N or min_duration_ms=N",
                    clause
                ),
            }
        }

        Ok(Self {
            statuses,
            min_bytes,
            min_duration_ms,
        })
    }
}

impl ResponseFilter for ResponseRules {
    fn accept(&self, response: &ResponseEvent) -> bool {
        if let Some(rules) = &self.statuses {
            match response.status {
                Some(status) if rules.iter().any(|rule| rule.matches(status)) => {}
                _ => return false,
            }
        }
        if let Some(threshold) = self.min_bytes {
            if response.bytes.unwrap_or(0) < threshold {
                return false;
            }
        }
        if let Some(threshold) = self.min_duration_ms {
            if (response.duration.as_millis() as u64) < threshold {
                return false;
            }
        }
        true
    }
}

/// Parse one status spec: a class (`1xx`..`5xx`) or an exact code.
fn parse_status_rule(spec: &str) -> Result<StatusRule> {
    if let Some(hundreds) = spec.strip_suffix("xx") {
        let class: u16 = hundreds
            .parse()
            .ok()
            .filter(|class| (1..=5).contains(class))
            .with_context(|| format!("Invalid status class: {spec}"))?;
        return Ok(StatusRule::Class(class * 100));
    }
    let code = parse_number::<u16>(spec, "status")?;
    Ok(StatusRule::Exact(code))
}

fn parse_number<T: std::str::FromStr>(value: &str, clause: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .ok()
        .with_context(|| format!("Invalid {clause} value: {value}"))
}
