//! Server configuration loaded from environment variables.
//!
//! Every knob has a default so the server starts with no configuration
//! at all. Overrides:
//!
//! | Variable                | Default          | Meaning                         |
//! |-------------------------|------------------|---------------------------------|
//! | `SYNC_API_PORT`         | `8080`           | HTTP listen port                |
//! | `SYNC_API_BIND`         | `0.0.0.0`        | HTTP bind address               |
//! | `SYNC_API_DATABASE`     | `orderly.db`     | SQLite database path            |
//! | `SYNC_API_SKEW_SECS`    | `300`            | Client timestamp skew tolerance |
//! | `SYNC_API_DEADLINE_SECS`| `30`             | Per-batch processing deadline   |

use std::env;

use chrono::Duration;
use orderly_sync::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Runtime configuration for the sync API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the HTTP listener binds to.
    pub bind_address: String,
    /// Port the HTTP listener binds to.
    pub port: u16,
    /// SQLite database file path.
    pub database_path: String,
    /// Engine tuning derived from the environment.
    pub engine: EngineConfig,
}

impl ApiConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            env::var("SYNC_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("SYNC_API_PORT", 8080)?;
        let database_path =
            env::var("SYNC_API_DATABASE").unwrap_or_else(|_| "orderly.db".to_string());

        let skew_secs: i64 = parse_var("SYNC_API_SKEW_SECS", 300)?;
        let deadline_secs: i64 = parse_var("SYNC_API_DEADLINE_SECS", 30)?;

        let engine = EngineConfig::default()
            .with_skew_tolerance(Duration::seconds(skew_secs))
            .with_batch_deadline(Duration::seconds(deadline_secs));

        Ok(Self {
            bind_address,
            port,
            database_path,
            engine,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_into_engine_durations() {
        let config = ApiConfig::load().unwrap();
        assert_eq!(config.engine.skew_tolerance, Duration::seconds(300));
        assert_eq!(config.engine.batch_deadline, Duration::seconds(30));
        assert_eq!(config.port, 8080);
    }
}
