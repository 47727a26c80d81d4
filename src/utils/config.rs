// src/utils/config.rs
//! Service configuration
//!
//! Loaded once at startup from an optional file layered under environment
//! variables (`ROBOT_POOL__SECTION__KEY`). The core never reloads it.

use crate::utils::errors::{PoolError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ROBOT_POOL";

/// Config file looked up in the current directory when no path is given
pub const DEFAULT_CONFIG_NAME: &str = "robot-pool";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub pool: PoolSettings,
    pub robot: RobotSettings,
    pub observability: ObservabilityConfig,
}

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of concurrently allocated workers
    pub max_executors: usize,

    /// Root directory robot names are resolved against
    pub work_directory: PathBuf,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_executors: 4,
            work_directory: PathBuf::from("."),
        }
    }
}

/// Robot execution tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSettings {
    /// How long `stop` waits for a run to wind down (None = don't wait)
    pub stop_timeout_ms: Option<u64>,

    /// Grace period between SIGTERM and SIGKILL for script robots
    pub kill_grace_ms: u64,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            stop_timeout_ms: Some(300_000),
            kill_grace_ms: 2_000,
        }
    }
}

impl RobotSettings {
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_ms.map(Duration::from_millis)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    pub log_filter: String,

    pub log_format: LogFormat,

    /// Prometheus scrape listener; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_addr: None,
        }
    }
}

impl ServiceConfig {
    /// Load from `robot-pool.{toml,yaml,json,..}` if present, then the environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(DEFAULT_CONFIG_NAME).required(false))
    }

    /// Load from an explicit file, then the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(File::from(path).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServiceConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_executors == 0 {
            return Err(PoolError::Config(
                "pool.max_executors must be at least 1".to_string(),
            ));
        }
        if self.pool.work_directory.as_os_str().is_empty() {
            return Err(PoolError::Config(
                "pool.work_directory cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.pool.max_executors, 4);
        assert_eq!(config.pool.work_directory, PathBuf::from("."));
        assert_eq!(config.robot.stop_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.robot.kill_grace(), Duration::from_secs(2));
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_executors_rejected() {
        let mut config = ServiceConfig::default();
        config.pool.max_executors = 0;
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[pool]
max_executors = 8
work_directory = "/srv/robots"

[robot]
kill_grace_ms = 500

[observability]
log_format = "json"
"#
        )
        .unwrap();

        let config = ServiceConfig::load_from(file.path()).unwrap();
        assert_eq!(config.pool.max_executors, 8);
        assert_eq!(config.pool.work_directory, PathBuf::from("/srv/robots"));
        assert_eq!(config.robot.kill_grace_ms, 500);
        assert_eq!(config.robot.stop_timeout_ms, Some(300_000));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = ServiceConfig::load_from(Path::new("/nonexistent/robot-pool.toml"));
        assert!(matches!(result, Err(PoolError::Config(_))));
    }
}
