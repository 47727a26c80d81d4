// src/runtime/robot.rs
//! Robot execution capability consumed by the pool
//!
//! A [`RobotCompiler`] turns a fully-qualified robot name into a [`Robot`],
//! an executable unit owned by exactly one worker. The pool only ever talks
//! to these traits, so the interpreter behind them is interchangeable.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Named arguments passed to a robot run
pub type Parameters = serde_json::Map<String, Value>;

/// Value produced by a robot run
#[derive(Debug, Clone, PartialEq)]
pub enum RobotOutput {
    /// The robot returned nothing
    Void,

    /// A scalar or structured result
    Value(Value),

    /// Raw bytes the robot streamed back
    Stream(Bytes),
}

impl RobotOutput {
    pub fn is_void(&self) -> bool {
        matches!(self, RobotOutput::Void)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RobotOutput::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Failures raised by compilers and robots
#[derive(Debug, Error)]
pub enum RobotError {
    #[error("robot '{0}' does not resolve to a script")]
    NotFound(String),

    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Execution(String),

    #[error("execution was interrupted")]
    Interrupted,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A compiled robot ready to run
#[async_trait]
pub trait Robot: Send + Sync {
    /// Run to completion. Implementations must watch `cancel` and return
    /// [`RobotError::Interrupted`] (or a result) once it fires.
    async fn execute(
        &self,
        parameters: &Parameters,
        cancel: CancellationToken,
    ) -> Result<RobotOutput, RobotError>;

    /// Release interpreter resources. Idempotent.
    async fn close(&self) -> Result<(), RobotError>;
}

/// Resolves and compiles robots for a work directory
#[async_trait]
pub trait RobotCompiler: Send + Sync {
    async fn compile(
        &self,
        work_directory: &Path,
        robot_name: &str,
    ) -> Result<Box<dyn Robot>, RobotError>;
}

/// Map `a.b.c` to `<work_directory>/a/b/c.<extension>`
///
/// Returns `None` for names that could escape the work directory or have
/// empty segments.
pub fn resolve_robot_path(work_directory: &Path, robot_name: &str, extension: &str) -> Option<PathBuf> {
    let mut path = work_directory.to_path_buf();
    let segments: Vec<&str> = robot_name.split('.').collect();

    for segment in &segments {
        let valid = !segment.is_empty()
            && !segment.contains(['/', '\\'])
            && *segment != ".."
            && !segment.contains('\0');
        if !valid {
            return None;
        }
    }

    let (last, parents) = segments.split_last()?;
    for segment in parents {
        path.push(segment);
    }
    path.push(format!("{}.{}", last, extension));
    Some(path)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic in-memory robots for pool tests.

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Robot names understood by [`FakeCompiler`]:
    ///
    /// - `echo`: returns its parameters
    /// - `void`: returns nothing
    /// - `fail`: execution error
    /// - `block`: runs until cancelled
    /// - `slow_stop`: on cancel, lingers before returning
    /// - `gated`: runs until [`FakeCompiler::open_gate`] or cancelled
    /// - `leaky`: close fails
    /// - `slow_close`: close takes seconds
    /// - `broken`: compile error
    /// - anything else: not found
    #[derive(Default)]
    pub(crate) struct FakeCompiler {
        pub compiled: AtomicUsize,
        pub closed: Arc<AtomicUsize>,
        pub gate: Arc<Notify>,
        pub execute_returned: Arc<AtomicBool>,
    }

    impl FakeCompiler {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn open_gate(&self) {
            self.gate.notify_one();
        }
    }

    #[async_trait]
    impl RobotCompiler for FakeCompiler {
        async fn compile(
            &self,
            _work_directory: &Path,
            robot_name: &str,
        ) -> Result<Box<dyn Robot>, RobotError> {
            let kind = match robot_name {
                "echo" | "void" | "fail" | "block" | "slow_stop" | "gated" | "leaky" | "slow_close" => {
                    robot_name.to_string()
                }
                "broken" => return Err(RobotError::Compile("unexpected token".into())),
                other => return Err(RobotError::NotFound(other.to_string())),
            };
            self.compiled.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeRobot {
                kind,
                closed: Arc::clone(&self.closed),
                gate: Arc::clone(&self.gate),
                execute_returned: Arc::clone(&self.execute_returned),
            }))
        }
    }

    struct FakeRobot {
        kind: String,
        closed: Arc<AtomicUsize>,
        gate: Arc<Notify>,
        execute_returned: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Robot for FakeRobot {
        async fn execute(
            &self,
            parameters: &Parameters,
            cancel: CancellationToken,
        ) -> Result<RobotOutput, RobotError> {
            let result = match self.kind.as_str() {
                "echo" => Ok(RobotOutput::Value(Value::Object(parameters.clone()))),
                "fail" => Err(RobotError::Execution("robot raised an error".into())),
                "block" => {
                    cancel.cancelled().await;
                    Err(RobotError::Interrupted)
                }
                "slow_stop" => {
                    cancel.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(RobotError::Interrupted)
                }
                "gated" => tokio::select! {
                    _ = self.gate.notified() => Ok(RobotOutput::Value(Value::from("opened"))),
                    _ = cancel.cancelled() => Err(RobotError::Interrupted),
                },
                _ => Ok(RobotOutput::Void),
            };
            self.execute_returned.store(true, Ordering::SeqCst);
            result
        }

        async fn close(&self) -> Result<(), RobotError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.kind == "slow_close" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.kind == "leaky" {
                return Err(RobotError::Io(std::io::Error::other("handle already closed")));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_nested_name() {
        let path = resolve_robot_path(Path::new("/work"), "reports.daily.export", "py").unwrap();
        assert_eq!(path, PathBuf::from("/work/reports/daily/export.py"));
    }

    #[test]
    fn test_resolve_single_segment() {
        let path = resolve_robot_path(Path::new("/work"), "hello", "sh").unwrap();
        assert_eq!(path, PathBuf::from("/work/hello.sh"));
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        assert!(resolve_robot_path(Path::new("/work"), "", "py").is_none());
        assert!(resolve_robot_path(Path::new("/work"), "a..b", "py").is_none());
        assert!(resolve_robot_path(Path::new("/work"), "a/../../etc.passwd", "py").is_none());
        assert!(resolve_robot_path(Path::new("/work"), "trailing.", "py").is_none());
    }

    #[test]
    fn test_output_accessors() {
        assert!(RobotOutput::Void.is_void());
        let value = RobotOutput::Value(Value::from(3));
        assert_eq!(value.as_value(), Some(&Value::from(3)));
        assert!(RobotOutput::Stream(Bytes::from_static(b"x")).as_value().is_none());
    }
}
