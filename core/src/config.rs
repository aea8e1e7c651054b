//! Dispatcher configuration.
//!
//! Defaults suit a client-side library: four workers, a 30 second request
//! timeout, and a `webclient/<version>` user agent. `from_env` lets a host
//! override them without code changes.

use std::time::Duration;

use crate::http::Headers;

const LOG_TARGET: &str = "webclient_core::config";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WORKERS: usize = 4;

pub const ENV_WORKERS: &str = "WEBCLIENT_WORKERS";
pub const ENV_TIMEOUT_SECS: &str = "WEBCLIENT_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "WEBCLIENT_USER_AGENT";

/// Settings shared by every request a dispatcher sends.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker threads, i.e. the maximum number of requests in
    /// flight at once.
    pub workers: usize,
    /// Timeout given to new builders.
    pub default_timeout: Duration,
    pub user_agent: Option<String>,
    /// Headers every new builder starts with.
    pub default_headers: Headers,
    pub worker_thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            default_timeout: DEFAULT_TIMEOUT,
            user_agent: Some(format!("webclient/{}", env!("CARGO_PKG_VERSION"))),
            default_headers: Headers::new(),
            worker_thread_name: "webclient-worker".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Defaults overlaid with `WEBCLIENT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are
    /// ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_WORKERS) {
            match raw.trim().parse::<usize>() {
                Ok(workers) if workers > 0 => config.workers = workers,
                _ => tracing::warn!(target: LOG_TARGET, value = %raw, "ignoring invalid {}", ENV_WORKERS),
            }
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            {
                Some(timeout) => config.default_timeout = timeout,
                None => tracing::warn!(target: LOG_TARGET, value = %raw, "ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }
        if let Some(raw) = lookup(ENV_USER_AGENT) {
            let raw = raw.trim();
            config.user_agent = if raw.is_empty() {
                None
            } else {
                Some(raw.to_string())
            };
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert!(config.user_agent.unwrap().starts_with("webclient/"));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn overrides_from_lookup() {
        let config = DispatcherConfig::from_lookup(lookup(&[
            (ENV_WORKERS, "8"),
            (ENV_TIMEOUT_SECS, "2.5"),
            (ENV_USER_AGENT, "my-app/1.0"),
        ]));
        assert_eq!(config.workers, 8);
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.user_agent.as_deref(), Some("my-app/1.0"));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = DispatcherConfig::from_lookup(lookup(&[
            (ENV_WORKERS, "0"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]));
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn out_of_range_timeouts_keep_default() {
        for raw in ["1e30", "inf", "NaN", "-5", "0"] {
            let config = DispatcherConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, raw)]));
            assert_eq!(config.default_timeout, DEFAULT_TIMEOUT, "{raw}");
        }
    }

    #[test]
    fn empty_user_agent_disables_it() {
        let config = DispatcherConfig::from_lookup(lookup(&[(ENV_USER_AGENT, "  ")]));
        assert!(config.user_agent.is_none());
    }
}
