use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TrackerError};
use crate::finnhub;
use crate::scheduler::SchedulerConfig;

pub const DEFAULT_HOLDINGS_API_URL: &str = "http://localhost:8080/api";

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub holdings_api_url: String,
    pub finnhub_api_url: String,
    pub finnhub_api_key: String,
    pub refresh_interval: Duration,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub request_timeout: Duration,
    pub failure_cooldown: Duration,
    pub error_dismiss_after: Duration,
    pub max_concurrent_quotes: usize,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            holdings_api_url: DEFAULT_HOLDINGS_API_URL.to_string(),
            finnhub_api_url: finnhub::DEFAULT_BASE_URL.to_string(),
            finnhub_api_key: String::new(),
            refresh_interval: scheduler.interval,
            rate_limit: 5,
            rate_window: Duration::from_millis(1000),
            request_timeout: scheduler.request_timeout,
            failure_cooldown: scheduler.failure_cooldown,
            error_dismiss_after: scheduler.error_dismiss_after,
            max_concurrent_quotes: scheduler.max_concurrent_quotes,
            email: None,
            password: None,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build a config from any key lookup. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let config = Config {
            holdings_api_url: lookup("HOLDINGS_API_URL").unwrap_or(defaults.holdings_api_url),
            finnhub_api_url: lookup("FINNHUB_API_URL").unwrap_or(defaults.finnhub_api_url),
            finnhub_api_key: lookup("FINNHUB_API_KEY").unwrap_or_default(),
            refresh_interval: parse_or(&lookup, "REFRESH_INTERVAL_SECS", 60).map(Duration::from_secs)?,
            rate_limit: parse_or(&lookup, "RATE_LIMIT", defaults.rate_limit)?,
            rate_window: parse_or(&lookup, "RATE_WINDOW_MS", 1000).map(Duration::from_millis)?,
            request_timeout: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 10).map(Duration::from_secs)?,
            failure_cooldown: parse_or(&lookup, "FAILURE_COOLDOWN_SECS", 5).map(Duration::from_secs)?,
            error_dismiss_after: parse_or(&lookup, "ERROR_DISMISS_SECS", 5).map(Duration::from_secs)?,
            max_concurrent_quotes: parse_or(&lookup, "MAX_CONCURRENT_QUOTES", defaults.max_concurrent_quotes)?,
            email: lookup("TRACKER_EMAIL"),
            password: lookup("TRACKER_PASSWORD"),
        };

        if config.refresh_interval.is_zero() {
            return Err(TrackerError::Config(
                "REFRESH_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if config.request_timeout.is_zero() {
            return Err(TrackerError::Config(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if config.max_concurrent_quotes == 0 {
            return Err(TrackerError::Config(
                "MAX_CONCURRENT_QUOTES must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.refresh_interval,
            failure_cooldown: self.failure_cooldown,
            request_timeout: self.request_timeout,
            error_dismiss_after: self.error_dismiss_after,
            max_concurrent_quotes: self.max_concurrent_quotes,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TrackerError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
