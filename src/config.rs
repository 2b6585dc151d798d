//! Configuration management for Sheetquote

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Engine configuration
///
/// Tunables for the step-execution engine. Everything here has a documented
/// default and can be overridden from the environment or a TOML file; the
/// engine itself never reads ambient state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// DevTools WebSocket endpoint of the browser to attach to
    pub cdp_endpoint: String,

    /// Maximum concurrent calculation runs
    pub max_concurrent_runs: usize,

    /// Overall per-run timeout in seconds; on expiry the coordinator cancels
    /// the run and tears the session down
    pub run_timeout_secs: u64,

    /// Default per-operation timeout in milliseconds
    pub default_timeout_ms: u64,

    /// Implicit wait applied while locating elements, in milliseconds
    pub selector_wait_ms: u64,

    /// Retry attempts for transient network-class errors
    pub transient_retries: u32,

    /// Base delay for exponential backoff between transient retries, ms
    pub backoff_base_ms: u64,

    /// Backoff multiplier applied per attempt
    pub backoff_multiplier: f64,

    /// Retries of a single step across session recreations
    pub max_step_retries: u32,

    /// Consecutive session failures before the session is declared dead
    /// and a fresh one is created
    pub session_failure_threshold: u32,

    /// Window during which a released session may be reused for the same
    /// domain, in seconds; zero disables reuse
    pub session_reuse_secs: u64,

    /// Decimal precision for mm -> cm conversion (round half up)
    pub unit_precision: u32,

    /// Wait-step durations in milliseconds: short, default, long, longest
    pub wait_short_ms: u64,
    pub wait_default_ms: u64,
    pub wait_long_ms: u64,
    pub wait_longest_ms: u64,

    /// Enable humanized pacing between page interactions
    pub humanize: bool,

    /// API key for the external captcha solving service, if any
    pub captcha_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cdp_endpoint: "ws://localhost:9222".to_string(),
            max_concurrent_runs: 4,
            run_timeout_secs: 180,
            default_timeout_ms: 30000,
            selector_wait_ms: 5000,
            transient_retries: 3,
            backoff_base_ms: 250,
            backoff_multiplier: 2.0,
            max_step_retries: 3,
            session_failure_threshold: 2,
            session_reuse_secs: 60,
            unit_precision: 2,
            wait_short_ms: 500,
            wait_default_ms: 1000,
            wait_long_ms: 1500,
            wait_longest_ms: 5000,
            humanize: true,
            captcha_api_key: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Ok(endpoint) = env::var("SHEETQUOTE_CDP_ENDPOINT") {
            config.cdp_endpoint = endpoint;
        }

        if let Ok(runs) = env::var("SHEETQUOTE_MAX_RUNS") {
            config.max_concurrent_runs = runs
                .parse()
                .map_err(|_| Error::config_invalid("Invalid SHEETQUOTE_MAX_RUNS"))?;
        }

        if let Ok(timeout) = env::var("SHEETQUOTE_RUN_TIMEOUT") {
            config.run_timeout_secs = timeout
                .parse()
                .map_err(|_| Error::config_invalid("Invalid SHEETQUOTE_RUN_TIMEOUT"))?;
        }

        if let Ok(timeout) = env::var("SHEETQUOTE_DEFAULT_TIMEOUT") {
            config.default_timeout_ms = timeout
                .parse()
                .map_err(|_| Error::config_invalid("Invalid SHEETQUOTE_DEFAULT_TIMEOUT"))?;
        }

        if let Ok(retries) = env::var("SHEETQUOTE_STEP_RETRIES") {
            config.max_step_retries = retries
                .parse()
                .map_err(|_| Error::config_invalid("Invalid SHEETQUOTE_STEP_RETRIES"))?;
        }

        if let Ok(threshold) = env::var("SHEETQUOTE_FAILURE_THRESHOLD") {
            config.session_failure_threshold = threshold
                .parse()
                .map_err(|_| Error::config_invalid("Invalid SHEETQUOTE_FAILURE_THRESHOLD"))?;
        }

        if let Ok(humanize) = env::var("SHEETQUOTE_HUMANIZE") {
            config.humanize = humanize
                .parse()
                .map_err(|_| Error::config_invalid("Invalid SHEETQUOTE_HUMANIZE"))?;
        }

        if let Ok(key) = env::var("SHEETQUOTE_CAPTCHA_API_KEY") {
            config.captcha_api_key = Some(key);
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_invalid(format!("Failed to read config file: {}", e)))?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| Error::config_invalid(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Per-operation default timeout as a `Duration`
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Implicit element-location wait as a `Duration`
    pub fn selector_wait(&self) -> Duration {
        Duration::from_millis(self.selector_wait_ms)
    }

    /// Backoff delay for the given zero-based transient retry attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ms = self.backoff_base_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session_failure_threshold, 2);
        assert_eq!(config.unit_precision, 2);
        assert_eq!(config.wait_default_ms, 1000);
        assert!(config.humanize);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let config = EngineConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::from_millis(250));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_from_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            max_concurrent_runs = 8
            session_failure_threshold = 5
            humanize = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_runs, 8);
        assert_eq!(config.session_failure_threshold, 5);
        assert!(!config.humanize);
        // untouched fields fall back to defaults
        assert_eq!(config.unit_precision, 2);
    }
}
