// src/utils/errors.rs
//! Error type shared by every layer of the pool
//!
//! All failures surface as a single closed enum so the transport layer can
//! map them to status codes without downcasting.

use crate::pool::worker::{WorkerId, WorkerState};
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors returned by pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// No worker with this id is registered
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),

    /// The robot name did not resolve to a runnable unit
    #[error("robot '{0}' not found")]
    RobotNotFound(String),

    /// The operation is not legal in the worker's current state
    #[error("worker {id} is {actual}, operation requires {required}")]
    InvalidState {
        id: WorkerId,
        actual: WorkerState,
        required: WorkerState,
    },

    /// Admission control rejected the allocation
    #[error("worker pool is full ({capacity} workers allocated)")]
    CapacityExceeded { capacity: usize },

    /// The robot exists but failed to compile
    #[error("robot '{robot}' failed to compile: {reason}")]
    CompileFailure { robot: String, reason: String },

    /// The robot ran and raised an error
    #[error("robot '{robot}' failed: {reason}")]
    ExecutionFailure { robot: String, reason: String },

    /// The run was cut short by a stop request
    #[error("worker {0} was stopped before the robot finished")]
    Interrupted(WorkerId),

    /// Lower-level failure while stopping, closing or releasing
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging or metrics could not be installed
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// Coarse classification of a [`PoolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    CapacityExceeded,
    CompileFailure,
    ExecutionFailure,
    Interrupted,
    OperationFailed,
    Startup,
}

impl PoolError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::WorkerNotFound(_) | PoolError::RobotNotFound(_) => ErrorKind::NotFound,
            PoolError::InvalidState { .. } => ErrorKind::InvalidState,
            PoolError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            PoolError::CompileFailure { .. } => ErrorKind::CompileFailure,
            PoolError::ExecutionFailure { .. } => ErrorKind::ExecutionFailure,
            PoolError::Interrupted(_) => ErrorKind::Interrupted,
            PoolError::OperationFailed(_) => ErrorKind::OperationFailed,
            PoolError::Config(_) | PoolError::Telemetry(_) => ErrorKind::Startup,
        }
    }

    /// HTTP status a transport should answer with
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::CapacityExceeded => 406,
            ErrorKind::InvalidState | ErrorKind::CompileFailure | ErrorKind::Interrupted => 409,
            ErrorKind::ExecutionFailure | ErrorKind::OperationFailed | ErrorKind::Startup => 500,
        }
    }

    /// Whether a caller may reasonably retry later (backpressure only)
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::CapacityExceeded
    }
}

impl From<config::ConfigError> for PoolError {
    fn from(err: config::ConfigError) -> Self {
        PoolError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        let id = WorkerId::new();
        assert_eq!(PoolError::WorkerNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            PoolError::RobotNotFound("a.b".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(PoolError::WorkerNotFound(id).status_code(), 404);
    }

    #[test]
    fn test_capacity_is_distinguishable() {
        let err = PoolError::CapacityExceeded { capacity: 3 };
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(err.status_code(), 406);
        assert!(err.is_retryable());
        assert!(!PoolError::WorkerNotFound(WorkerId::new()).is_retryable());
    }

    #[test]
    fn test_conflict_statuses() {
        let invalid = PoolError::InvalidState {
            id: WorkerId::new(),
            actual: WorkerState::Running,
            required: WorkerState::Idle,
        };
        assert_eq!(invalid.status_code(), 409);
        assert!(invalid.to_string().contains("running"));

        let compile = PoolError::CompileFailure {
            robot: "x".into(),
            reason: "syntax".into(),
        };
        assert_eq!(compile.status_code(), 409);
        assert_eq!(PoolError::OperationFailed("io".into()).status_code(), 500);
    }
}
