//! Runtime configuration loaded from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PROCFLOW_EVENT_STORE` | `in-memory` | `in-memory` or `postgres` |
//! | `DATABASE_URL` | (none) | required when the store is `postgres` |
//! | `PROCFLOW_DB_MAX_CONNECTIONS` | `5` | Postgres pool size |
//! | `PROCFLOW_RETRY_MAX_ATTEMPTS` | `16` | conflict retries, `0` disables them |
//! | `PROCFLOW_RETRY_BASE_DELAY_MS` | `5` | first backoff delay |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::event_store::StoreBackend;
use crate::retry::RetryPolicy;

pub const EVENT_STORE_VAR: &str = "PROCFLOW_EVENT_STORE";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "PROCFLOW_DB_MAX_CONNECTIONS";
pub const RETRY_MAX_ATTEMPTS_VAR: &str = "PROCFLOW_RETRY_MAX_ATTEMPTS";
pub const RETRY_BASE_DELAY_VAR: &str = "PROCFLOW_RETRY_BASE_DELAY_MS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeConfig {
    pub store: StoreBackend,
    pub retry: RetryPolicy,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup(EVENT_STORE_VAR).as_deref().map(str::trim) {
            None | Some("") | Some("in-memory") | Some("memory") => StoreBackend::InMemory,
            Some("postgres") => {
                let url = lookup(DATABASE_URL_VAR)
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
                let max_connections =
                    parse_or(&lookup, MAX_CONNECTIONS_VAR, DEFAULT_MAX_CONNECTIONS)?;
                if max_connections == 0 {
                    return Err(ConfigError::Invalid {
                        var: MAX_CONNECTIONS_VAR,
                        value: "0".to_string(),
                    });
                }
                StoreBackend::Postgres { url, max_connections }
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: EVENT_STORE_VAR,
                    value: other.to_string(),
                });
            }
        };

        let defaults = RetryPolicy::default();
        let max_attempts = parse_or(&lookup, RETRY_MAX_ATTEMPTS_VAR, defaults.max_attempts)?;
        let base_delay_ms = parse_or(
            &lookup,
            RETRY_BASE_DELAY_VAR,
            defaults.base_delay.as_millis() as u64,
        )?;
        let retry = defaults
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(base_delay_ms));

        Ok(Self { store, retry })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        RuntimeConfig::from_lookup(move |var| vars.get(var).cloned())
    }

    #[test]
    fn from_env_reads_the_process_environment() {
        assert_eq!(
            RuntimeConfig::from_env(),
            RuntimeConfig::from_lookup(|var| std::env::var(var).ok())
        );
    }

    #[test]
    fn defaults_to_in_memory_with_default_retries() {
        let config = config(&[]).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.retry.max_attempts, 16);
    }

    #[test]
    fn postgres_requires_a_database_url() {
        assert_eq!(
            config(&[(EVENT_STORE_VAR, "postgres")]),
            Err(ConfigError::Missing(DATABASE_URL_VAR))
        );

        let config = config(&[
            (EVENT_STORE_VAR, "postgres"),
            (DATABASE_URL_VAR, "postgres://localhost/procflow"),
            (MAX_CONNECTIONS_VAR, "12"),
        ])
        .unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Postgres {
                url: "postgres://localhost/procflow".to_string(),
                max_connections: 12
            }
        );
    }

    #[test]
    fn retry_settings_are_read() {
        let config = config(&[(RETRY_MAX_ATTEMPTS_VAR, "0"), (RETRY_BASE_DELAY_VAR, "40")]).unwrap();
        assert_eq!(config.retry.max_attempts, 0);
        assert_eq!(config.retry.base_delay, Duration::from_millis(40));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(
            config(&[(EVENT_STORE_VAR, "redis")]),
            Err(ConfigError::Invalid {
                var: EVENT_STORE_VAR,
                value: "redis".to_string()
            })
        );
        assert_eq!(
            config(&[(RETRY_MAX_ATTEMPTS_VAR, "many")]),
            Err(ConfigError::Invalid {
                var: RETRY_MAX_ATTEMPTS_VAR,
                value: "many".to_string()
            })
        );
        assert!(matches!(
            config(&[
                (EVENT_STORE_VAR, "postgres"),
                (DATABASE_URL_VAR, "postgres://localhost/procflow"),
                (MAX_CONNECTIONS_VAR, "0"),
            ]),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
