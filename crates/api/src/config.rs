//! Application configuration

use std::env;
use std::time::Duration;

use deskrelay_shared::MessageSource;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Counterpart service
    pub remote_base_url: String,
    /// Which side of the pair this deployment is; stamped on every message
    /// created here and carried as the provenance marker when forwarding
    pub service_origin: MessageSource,

    // Sync worker
    pub sync_interval_secs: u64,
    pub freshness_window_secs: u64,

    // Forwarder
    pub forward_max_attempts: usize,
    pub forward_timeout_secs: u64,

    // WebSocket
    pub outbound_queue_size: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            remote_base_url: env::var("REMOTE_BASE_URL")
                .map_err(|_| ConfigError::Missing("REMOTE_BASE_URL"))?,
            service_origin: {
                let raw = env::var("SERVICE_ORIGIN")
                    .map_err(|_| ConfigError::Missing("SERVICE_ORIGIN"))?;
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("SERVICE_ORIGIN", raw))?
            },

            sync_interval_secs: parse_var("SYNC_INTERVAL_SECS", 30)?,
            freshness_window_secs: parse_var("FRESHNESS_WINDOW_SECS", 300)?,

            forward_max_attempts: parse_var("FORWARD_MAX_ATTEMPTS", 3)?,
            forward_timeout_secs: parse_var("FORWARD_TIMEOUT_SECS", 10)?,

            outbound_queue_size: parse_var("OUTBOUND_QUEUE_SIZE", 256)?,
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

/// Parse an optional numeric environment variable. Absent → default; set but
/// unparsable → `ConfigError::Invalid`, so a typo fails at startup instead of
/// silently running with a default.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable name; the process environment is shared
    // across parallel tests

    #[test]
    fn test_unset_var_uses_default() {
        let value: u64 = parse_var("DESKRELAY_TEST_UNSET_VAR", 30).unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn test_set_var_overrides_default() {
        env::set_var("DESKRELAY_TEST_SET_VAR", "5");
        let value: usize = parse_var("DESKRELAY_TEST_SET_VAR", 3).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_unparsable_var_fails_loudly() {
        env::set_var("DESKRELAY_TEST_BAD_VAR", "three");
        let err = parse_var::<usize>("DESKRELAY_TEST_BAD_VAR", 3).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("DESKRELAY_TEST_BAD_VAR", _)));
    }
}
