// src/lib.rs
//! Robot Pool Library
//!
//! This library provides a bounded, concurrent pool of workers, each owning
//! one loaded robot script that can be run, stopped and released by id.
//!
//! # Architecture
//!
//! The service is structured into several key modules:
//!
//! - **runtime**: Robot compilation and execution, interpreter processes
//! - **pool**: Workers, registry, admission control, pool manager
//! - **service**: Entry point transports call into
//! - **observability**: Logging and metrics
//! - **utils**: Errors and configuration

// Public module exports
pub mod observability;
pub mod pool;
pub mod runtime;
pub mod service;
pub mod utils;

// Re-export commonly used types
pub use pool::{PoolManager, WorkerId, WorkerPool, WorkerPoolConfig, WorkerState};
pub use runtime::{Parameters, RobotOutput, ScriptCompiler};
pub use service::{ExecutionService, ServiceInfo};
pub use utils::config::ServiceConfig;
pub use utils::errors::{PoolError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
