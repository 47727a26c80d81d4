// src/utils/mod.rs
//! Shared utilities: the crate error type and service configuration.

pub mod config;
pub mod errors;

pub use self::config::{LogFormat, ObservabilityConfig, PoolSettings, RobotSettings, ServiceConfig};
pub use self::errors::{ErrorKind, PoolError, Result};
