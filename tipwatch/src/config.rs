//! Top-level configuration for a monitor process.
//!
//! This module aggregates configuration for:
//!
//! - the remote chain source (Esplora URL, timeouts, retry and pacing),
//! - reconciliation parameters (`ReconcilerConfig`),
//! - the analytics pipeline (`AnalyticsConfig`),
//! - the metrics exporter (enable flag + listen address),
//! - and the delay between reconciliation cycles.
//!
//! Values default to the monitor's production settings.
//! `MonitorConfig::from_env` layers `TIPWATCH_*` environment overrides on
//! top of the defaults.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::analytics::AnalyticsConfig;
use crate::reconcile::ReconcilerConfig;

/// Errors raised while building or validating configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the HTTP chain source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Base URL of the Esplora API, e.g. `"https://blockstream.info/api/"`.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Attempts per request before reporting unavailable.
    pub max_attempts: u32,
    /// Delay between attempts of the same request.
    pub retry_delay: Duration,
    /// Minimum spacing between the starts of any two requests.
    pub min_request_interval: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://blockstream.info/api/".to_string(),
            request_timeout: Duration::from_secs(10),
            max_attempts: 25,
            retry_delay: Duration::from_secs(2),
            min_request_interval: Duration::from_secs(2),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9898)),
        }
    }
}

/// Top-level configuration for a monitor process.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub source: SourceConfig,
    pub reconciler: ReconcilerConfig,
    pub analytics: AnalyticsConfig,
    pub metrics: MetricsConfig,
    /// Delay between the end of one reconciliation cycle and the next.
    pub cycle_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            reconciler: ReconcilerConfig::default(),
            analytics: AnalyticsConfig::default(),
            metrics: MetricsConfig::default(),
            cycle_interval: Duration::from_secs(20),
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `TIPWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(cfg)
    }

    /// Applies overrides looked up by variable name.
    ///
    /// Recognised variables:
    ///
    /// - `TIPWATCH_BASE_URL`
    /// - `TIPWATCH_WINDOW_SIZE`
    /// - `TIPWATCH_MAX_HISTORY`
    /// - `TIPWATCH_MAX_ANCESTOR_STEPS`
    /// - `TIPWATCH_CYCLE_INTERVAL_SECS`
    /// - `TIPWATCH_REQUEST_INTERVAL_MS`
    /// - `TIPWATCH_METRICS_ADDR` (`off` disables the exporter)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TIPWATCH_BASE_URL") {
            self.source.base_url = url;
        }
        if let Some(n) = parse_var(&lookup, "TIPWATCH_WINDOW_SIZE")? {
            self.reconciler.window_size = n;
        }
        if let Some(n) = parse_var(&lookup, "TIPWATCH_MAX_HISTORY")? {
            self.analytics.max_history = n;
        }
        if let Some(n) = parse_var(&lookup, "TIPWATCH_MAX_ANCESTOR_STEPS")? {
            self.reconciler.max_ancestor_steps = Some(n);
        }
        if let Some(secs) = parse_var(&lookup, "TIPWATCH_CYCLE_INTERVAL_SECS")? {
            self.cycle_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var(&lookup, "TIPWATCH_REQUEST_INTERVAL_MS")? {
            self.source.min_request_interval = Duration::from_millis(ms);
        }
        match lookup("TIPWATCH_METRICS_ADDR").as_deref() {
            None => {}
            Some("off") => self.metrics.enabled = false,
            Some(addr) => {
                self.metrics.listen_addr = addr.parse().map_err(|_| ConfigError::Env {
                    var: "TIPWATCH_METRICS_ADDR",
                    value: addr.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Checks every sub-configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.source.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        self.reconciler.validate()?;
        self.analytics.validate()?;
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = MonitorConfig::default();
        cfg.validate().expect("defaults should validate");
        assert_eq!(cfg.reconciler.window_size, 100);
        assert_eq!(cfg.analytics.max_history, 100);
        assert_eq!(cfg.source.max_attempts, 25);
        assert_eq!(cfg.cycle_interval, Duration::from_secs(20));
    }

    #[test]
    fn overrides_are_applied() {
        let mut cfg = MonitorConfig::default();
        cfg.apply_overrides(lookup(&[
            ("TIPWATCH_BASE_URL", "http://localhost:3002/api"),
            ("TIPWATCH_WINDOW_SIZE", "12"),
            ("TIPWATCH_MAX_ANCESTOR_STEPS", " 6 "),
            ("TIPWATCH_CYCLE_INTERVAL_SECS", "5"),
            ("TIPWATCH_METRICS_ADDR", "off"),
        ]))
        .expect("overrides should apply");

        assert_eq!(cfg.source.base_url, "http://localhost:3002/api");
        assert_eq!(cfg.reconciler.window_size, 12);
        assert_eq!(cfg.reconciler.max_ancestor_steps, Some(6));
        assert_eq!(cfg.cycle_interval, Duration::from_secs(5));
        assert!(!cfg.metrics.enabled);
    }

    #[test]
    fn malformed_override_is_reported() {
        let mut cfg = MonitorConfig::default();
        let err = cfg
            .apply_overrides(lookup(&[("TIPWATCH_WINDOW_SIZE", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Env {
                var: "TIPWATCH_WINDOW_SIZE",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut cfg = MonitorConfig::default();
        cfg.reconciler.window_size = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }
}
