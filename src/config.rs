//! Client configuration from the environment

use crate::error::ScanError;
use std::env;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const API_URL_VAR: &str = "SCANWATCH_API_URL";
pub const POLL_INTERVAL_VAR: &str = "SCANWATCH_POLL_INTERVAL_MS";
pub const FETCH_TIMEOUT_VAR: &str = "SCANWATCH_FETCH_TIMEOUT_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "SCANWATCH_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub poll: PollConfig,
    /// Timeout for submission, report and catalog requests.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Upper bound on a single status fetch; keeps a hung request from
    /// holding the one-fetch-at-a-time gate.
    pub fetch_timeout: Duration,
}

impl PollConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            fetch_timeout: interval,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::with_interval(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll: PollConfig::default(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Values given on the command line. Each one replaces its environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Flags first, then `SCANWATCH_*` variables, then defaults. The fetch
    /// timeout follows the resolved poll interval unless set explicitly.
    /// Validation runs once, on the merged result.
    pub fn load(overrides: &Overrides) -> Result<Self, ScanError> {
        Self::resolve(|key| env::var(key).ok(), overrides)
    }

    fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, ScanError> {
        let api_url = match &overrides.api_url {
            Some(url) => url.clone(),
            None => lookup(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        };
        let interval = match overrides.poll_interval_ms {
            Some(ms) => ms,
            None => millis(&lookup, POLL_INTERVAL_VAR)?.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        };
        let fetch_timeout = match overrides.fetch_timeout_ms {
            Some(ms) => ms,
            None => millis(&lookup, FETCH_TIMEOUT_VAR)?.unwrap_or(interval),
        };
        let request_timeout =
            millis(&lookup, REQUEST_TIMEOUT_VAR)?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);

        let config = Self {
            api_url,
            poll: PollConfig {
                interval: Duration::from_millis(interval),
                fetch_timeout: Duration::from_millis(fetch_timeout),
            },
            request_timeout: Duration::from_millis(request_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScanError> {
        if self.api_url.trim().is_empty() {
            return Err(ScanError::Config("API URL must not be empty".into()));
        }
        if self.poll.interval.is_zero() {
            return Err(ScanError::Config("poll interval must be positive".into()));
        }
        if self.poll.fetch_timeout.is_zero() {
            return Err(ScanError::Config("fetch timeout must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ScanError::Config("request timeout must be positive".into()));
        }
        Ok(())
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, ScanError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ScanError::Config(format!("{} must be a number of milliseconds, got {:?}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve_with(vars: &[(&str, &str)], overrides: &Overrides) -> Result<ClientConfig, ScanError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::resolve(|key| vars.get(key).cloned(), overrides)
    }

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ScanError> {
        resolve_with(vars, &Overrides::default())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert_eq!(config.poll.fetch_timeout, config.poll.interval);
    }

    #[test]
    fn test_fetch_timeout_follows_interval() {
        let config = load(&[(POLL_INTERVAL_VAR, "750")]).unwrap();
        assert_eq!(config.poll.interval, Duration::from_millis(750));
        assert_eq!(config.poll.fetch_timeout, Duration::from_millis(750));

        let config = load(&[(POLL_INTERVAL_VAR, "750"), (FETCH_TIMEOUT_VAR, "300")]).unwrap();
        assert_eq!(config.poll.fetch_timeout, Duration::from_millis(300));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            load(&[(POLL_INTERVAL_VAR, "soon")]),
            Err(ScanError::Config(_))
        ));
        assert!(matches!(
            load(&[(POLL_INTERVAL_VAR, "0")]),
            Err(ScanError::Config(_))
        ));
        assert!(matches!(
            load(&[(API_URL_VAR, "  ")]),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn test_interval_flag_keeps_explicit_fetch_timeout() {
        let flags = Overrides {
            poll_interval_ms: Some(1000),
            ..Overrides::default()
        };

        let config = resolve_with(&[(FETCH_TIMEOUT_VAR, "20000")], &flags).unwrap();
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.poll.fetch_timeout, Duration::from_secs(20));

        let config = resolve_with(&[(POLL_INTERVAL_VAR, "9000")], &flags).unwrap();
        assert_eq!(config.poll.fetch_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_flags_replace_invalid_env_values() {
        let flags = Overrides {
            api_url: Some("http://scans.internal:9000".into()),
            poll_interval_ms: Some(1000),
            fetch_timeout_ms: Some(400),
        };
        let config = resolve_with(
            &[
                (API_URL_VAR, " "),
                (POLL_INTERVAL_VAR, "0"),
                (FETCH_TIMEOUT_VAR, "never"),
            ],
            &flags,
        )
        .unwrap();

        assert_eq!(config.api_url, "http://scans.internal:9000");
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.poll.fetch_timeout, Duration::from_millis(400));
    }

    #[test]
    fn test_flags_are_validated() {
        let flags = Overrides {
            poll_interval_ms: Some(0),
            ..Overrides::default()
        };
        assert!(matches!(
            resolve_with(&[(POLL_INTERVAL_VAR, "1000")], &flags),
            Err(ScanError::Config(_))
        ));
    }
}
