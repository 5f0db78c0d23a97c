//! Composition-root configuration
//!
//! One explicit value constructed at startup and turned into engine parts
//! there; the running core never consults configuration. Loadable from
//! TOML so hosts can ship the observer's knobs next to their own.

use crate::export::JsonLinesListener;
use crate::filter::{AcceptAll, RequestFilter, RequestRules, ResponseFilter, ResponseRules};
use crate::fingerprint::{Fingerprinter, DEFAULT_PREFIX_SEGMENTS, MAX_WALK_DEPTH};
use crate::listener::{LogListener, TrafficListener};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Engine configuration.
///
/// # Example
/// ```
/// use netlens::config::ObserverConfig;
///
/// let config: ObserverConfig = toml::from_str(
///     r#"
///     sample_period_ms = 500
///     request_filter = "min_bytes=1024"
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.sample_period_ms, 500);
/// assert_eq!(config.prefix_segments, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Module path segments kept as the fingerprint prefix
    #[serde(default = "default_prefix_segments")]
    pub prefix_segments: usize,

    /// Maximum stack frames consumed per fingerprint
    #[serde(default = "default_max_walk_depth")]
    pub max_walk_depth: usize,

    /// Nominal sampling window in milliseconds
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    /// Request filter expression (see [`RequestRules`]); absent = accept all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_filter: Option<String>,

    /// Response filter expression (see [`ResponseRules`]); absent = accept all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_filter: Option<String>,

    /// TCP address for the JSON-lines wire exporter; absent = host wires
    /// its own listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

fn default_prefix_segments() -> usize {
    DEFAULT_PREFIX_SEGMENTS
}

fn default_max_walk_depth() -> usize {
    MAX_WALK_DEPTH
}

fn default_sample_period_ms() -> u64 {
    1000
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            prefix_segments: default_prefix_segments(),
            max_walk_depth: default_max_walk_depth(),
            sample_period_ms: default_sample_period_ms(),
            request_filter: None,
            response_filter: None,
            sink: None,
        }
    }
}

impl ObserverConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse observer config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.prefix_segments == 0 {
            bail!("prefix_segments must be >= 1");
        }
        if self.max_walk_depth == 0 {
            bail!("max_walk_depth must be >= 1");
        }
        if self.sample_period_ms == 0 {
            bail!("sample_period_ms must be >= 1");
        }
        // Filter expressions must at least parse at startup.
        if let Some(expr) = &self.request_filter {
            RequestRules::from_expr(expr)?;
        }
        if let Some(expr) = &self.response_filter {
            ResponseRules::from_expr(expr)?;
        }
        Ok(())
    }

    /// Nominal sampling window.
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    /// Fingerprint engine configured per this value.
    pub fn fingerprinter(&self) -> Fingerprinter {
        Fingerprinter::with_limits(self.prefix_segments, self.max_walk_depth)
    }

    /// Build the configured request filter.
    pub fn build_request_filter(&self) -> Result<Arc<dyn RequestFilter>> {
        Ok(match &self.request_filter {
            Some(expr) => Arc::new(RequestRules::from_expr(expr)?),
            None => Arc::new(AcceptAll),
        })
    }

    /// Build the configured response filter.
    pub fn build_response_filter(&self) -> Result<Arc<dyn ResponseFilter>> {
        Ok(match &self.response_filter {
            Some(expr) => Arc::new(ResponseRules::from_expr(expr)?),
            None => Arc::new(AcceptAll),
        })
    }

    /// Build the configured listener: the JSON-lines wire exporter when a
    /// `sink` address is set, otherwise the log listener.
    pub fn build_listener(&self) -> Result<Arc<dyn TrafficListener>> {
        Ok(match &self.sink {
            Some(addr) => Arc::new(JsonLinesListener::tcp(addr.as_str())?),
            None => Arc::new(LogListener),
        })
    }
}
