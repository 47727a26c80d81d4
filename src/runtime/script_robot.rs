// src/runtime/script_robot.rs
//! Script-backed robots
//!
//! A robot name resolves to a script file under the work directory; the
//! file's extension picks the interpreter. Each run spawns a fresh
//! interpreter process:
//!
//! ```text
//! parameters ──JSON──▶ stdin ─┐
//!                             ├─ interpreter (own process group, cwd = work dir)
//! RobotOutput ◀── stdout ◀────┘
//!   empty  → Void
//!   JSON   → Value
//!   other  → Stream
//! ```
//!
//! Cancellation terminates the whole process group, and whatever is left
//! of the group when a run ends or is abandoned is killed.

use crate::runtime::process_manager::{Interpreter, ProcessGroup, ProcessManager};
use crate::runtime::robot::{resolve_robot_path, Parameters, Robot, RobotCompiler, RobotError, RobotOutput};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Compiles robots into [`ScriptRobot`]s
pub struct ScriptCompiler {
    manager: Arc<ProcessManager>,
    interpreters: Vec<Interpreter>,
    kill_grace: Duration,
}

impl ScriptCompiler {
    /// Create a compiler that accepts every supported interpreter
    pub fn new(kill_grace: Duration) -> Self {
        Self::with_interpreters(Interpreter::ALL.to_vec(), kill_grace)
    }

    /// Create a compiler restricted to `interpreters`, searched in order
    pub fn with_interpreters(interpreters: Vec<Interpreter>, kill_grace: Duration) -> Self {
        Self {
            manager: Arc::new(ProcessManager::new()),
            interpreters,
            kill_grace,
        }
    }

    /// Locate the script for a robot name
    fn locate(&self, work_directory: &Path, robot_name: &str) -> Option<(Interpreter, PathBuf)> {
        self.interpreters.iter().find_map(|interpreter| {
            resolve_robot_path(work_directory, robot_name, interpreter.extension())
                .filter(|path| path.is_file())
                .map(|path| (*interpreter, path))
        })
    }
}

#[async_trait]
impl RobotCompiler for ScriptCompiler {
    async fn compile(&self, work_directory: &Path, robot_name: &str) -> Result<Box<dyn Robot>, RobotError> {
        let (interpreter, script) = self
            .locate(work_directory, robot_name)
            .ok_or_else(|| RobotError::NotFound(robot_name.to_string()))?;

        debug!("Compiling robot {} from {:?}", robot_name, script);
        self.manager.check(interpreter, &script, work_directory).await?;

        Ok(Box::new(ScriptRobot {
            manager: Arc::clone(&self.manager),
            interpreter,
            script,
            work_directory: work_directory.to_path_buf(),
            kill_grace: self.kill_grace,
            closed: AtomicBool::new(false),
        }))
    }
}

/// A compiled script robot
pub struct ScriptRobot {
    manager: Arc<ProcessManager>,
    interpreter: Interpreter,
    script: PathBuf,
    work_directory: PathBuf,
    kill_grace: Duration,
    closed: AtomicBool,
}

impl ScriptRobot {
    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn interpreter(&self) -> Interpreter {
        self.interpreter
    }
}

#[async_trait]
impl Robot for ScriptRobot {
    async fn execute(&self, parameters: &Parameters, cancel: CancellationToken) -> Result<RobotOutput, RobotError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RobotError::Execution("robot has been closed".into()));
        }

        let started = Instant::now();
        let payload = serde_json::to_vec(parameters)
            .map_err(|e| RobotError::Execution(format!("Failed to encode parameters: {}", e)))?;

        let mut child = self.manager.spawn(self.interpreter, &self.script, &self.work_directory)?;
        let group = ProcessGroup::of(&child);

        // The script may never read stdin, so feed it off to the side
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        debug!("Failed to write parameters to robot: {}", e);
                    }
                }
            });
        }

        let mut stdout = tokio::spawn(drain(child.stdout.take()));
        let mut stderr = tokio::spawn(drain(child.stderr.take()));

        // Descendants may hold the pipes past the interpreter's exit, so
        // collecting output stays interruptible too
        let finished = tokio::select! {
            collected = collect(&mut child, &mut stdout, &mut stderr) => Some(collected),
            _ = cancel.cancelled() => None,
        };

        let (status, stdout, stderr) = match finished {
            Some(collected) => collected?,
            None => {
                debug!("Interrupting {:?} after {:?}", self.script, started.elapsed());
                self.manager.terminate(&mut child, &group, self.kill_grace).await;
                stdout.abort();
                stderr.abort();
                return Err(RobotError::Interrupted);
            }
        };

        debug!(
            "Robot {:?} exited with {} after {:?}",
            self.script,
            status,
            started.elapsed()
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("robot exited with {}", status)
            } else {
                stderr
            };
            return Err(RobotError::Execution(reason));
        }

        Ok(parse_output(stdout))
    }

    async fn close(&self) -> Result<(), RobotError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closed robot {:?}", self.script);
        }
        Ok(())
    }
}

/// Classify whatever the robot wrote to stdout
fn parse_output(stdout: Vec<u8>) -> RobotOutput {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return RobotOutput::Void;
    }
    match serde_json::from_slice(&stdout) {
        Ok(value) => RobotOutput::Value(value),
        Err(_) => RobotOutput::Stream(Bytes::from(stdout)),
    }
}

async fn drain<R>(reader: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

type OutputTask = JoinHandle<std::io::Result<Vec<u8>>>;

/// Wait for the interpreter to exit and both pipes to close
async fn collect(
    child: &mut Child,
    stdout: &mut OutputTask,
    stderr: &mut OutputTask,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), RobotError> {
    let status = child.wait().await?;
    let stdout = join_output(stdout).await?;
    let stderr = join_output(stderr).await?;
    Ok((status, stdout, stderr))
}

async fn join_output(handle: &mut OutputTask) -> Result<Vec<u8>, RobotError> {
    match handle.await {
        Ok(result) => Ok(result?),
        Err(e) => {
            warn!("Output reader task failed: {}", e);
            Err(RobotError::Execution(format!("Failed to collect robot output: {}", e)))
        }
    }
}
