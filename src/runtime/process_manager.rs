// src/runtime/process_manager.rs
//! Process manager for spawning and terminating robot interpreters
//!
//! Supports multiple interpreters, chosen by the robot script's extension:
//! - Python (python3)
//! - Node.js (node)
//! - Shell (sh)

use crate::runtime::robot::RobotError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Supported interpreters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpreter {
    Python,
    NodeJs,
    Shell,
}

impl Interpreter {
    /// Resolution order when several scripts share a robot name
    pub const ALL: [Interpreter; 3] = [Interpreter::Python, Interpreter::NodeJs, Interpreter::Shell];

    /// Get the command name for this interpreter
    pub fn command(&self) -> &'static str {
        match self {
            Interpreter::Python => "python3",
            Interpreter::NodeJs => "node",
            Interpreter::Shell => "sh",
        }
    }

    /// Arguments that syntax-check a script without running it
    pub fn check_args(&self) -> &'static [&'static str] {
        match self {
            Interpreter::Python => &["-m", "py_compile"],
            Interpreter::NodeJs => &["--check"],
            Interpreter::Shell => &["-n"],
        }
    }

    /// Arguments placed before the script path when running it
    pub fn run_args(&self) -> &'static [&'static str] {
        match self {
            Interpreter::Python => &["-u"], // Unbuffered
            Interpreter::NodeJs | Interpreter::Shell => &[],
        }
    }

    /// Get the file extension for this interpreter
    pub fn extension(&self) -> &'static str {
        match self {
            Interpreter::Python => "py",
            Interpreter::NodeJs => "js",
            Interpreter::Shell => "sh",
        }
    }
}

/// Process manager for robot interpreters
#[derive(Default)]
pub struct ProcessManager {
    /// Paths to executables (cached)
    executable_paths: Mutex<HashMap<Interpreter, PathBuf>>,
}

impl ProcessManager {
    /// Create a new process manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Find executable for an interpreter
    pub fn find_executable(&self, interpreter: Interpreter) -> Result<PathBuf, RobotError> {
        if let Some(path) = self.executable_paths.lock().get(&interpreter) {
            return Ok(path.clone());
        }

        let command = interpreter.command();
        match which::which(command) {
            Ok(path) => {
                info!("Found {} at {:?}", command, path);
                self.executable_paths.lock().insert(interpreter, path.clone());
                Ok(path)
            }
            Err(e) => Err(RobotError::Compile(format!(
                "Executable '{}' not found in PATH: {}",
                command, e
            ))),
        }
    }

    /// Syntax-check a script, returning the interpreter's complaint on failure
    pub async fn check(&self, interpreter: Interpreter, script: &Path, work_dir: &Path) -> Result<(), RobotError> {
        let executable = self.find_executable(interpreter)?;

        let output = Command::new(executable)
            .args(interpreter.check_args())
            .arg(script)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("{} exited with {}", interpreter.command(), output.status)
        } else {
            stderr
        };
        Err(RobotError::Compile(reason))
    }

    /// Spawn an interpreter running `script` in its own process group
    pub fn spawn(&self, interpreter: Interpreter, script: &Path, work_dir: &Path) -> Result<Child, RobotError> {
        let executable = self.find_executable(interpreter)?;

        debug!("Spawning {:?} process: {:?} {:?}", interpreter, executable, script);

        let mut command = Command::new(executable);
        command
            .args(interpreter.run_args())
            .arg(script)
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            RobotError::Execution(format!("Failed to spawn {}: {}", interpreter.command(), e))
        })?;

        debug!("Process spawned with PID: {:?}", child.id());
        Ok(child)
    }

    /// Terminate a child and everything it started: SIGTERM, then SIGKILL after `grace`
    ///
    /// Signals go to the whole group, so descendants are reached even when
    /// the interpreter itself has already exited.
    pub async fn terminate(&self, child: &mut Child, group: &ProcessGroup, grace: Duration) {
        debug!("Sending SIGTERM to process group {:?}", group.id());
        group.signal_terminate();

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Process exited with status: {}", status);
            }
            Ok(Err(e)) => {
                warn!("Error waiting for process: {}", e);
            }
            Err(_) => {
                warn!("Process did not exit within {:?}, sending SIGKILL", grace);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill process: {}", e);
                }
            }
        }

        group.signal_kill();
    }
}

/// Process group of a spawned interpreter
///
/// Dropping it SIGKILLs whatever is left in the group, so a run that is
/// abandoned or finishes early never leaves descendants behind.
#[derive(Debug)]
pub struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    /// Group led by `child`; must be taken before the child is reaped
    pub fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    pub fn id(&self) -> Option<u32> {
        self.pgid
    }

    pub fn signal_terminate(&self) {
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGTERM);
    }

    pub fn signal_kill(&self) {
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGKILL);
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        if let Some(pgid) = self.pgid {
            // ESRCH just means the group is already empty
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
                if e != nix::errno::Errno::ESRCH {
                    debug!("{} to process group {} failed: {}", signal, pgid, e);
                }
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.signal_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_command() {
        assert_eq!(Interpreter::Python.command(), "python3");
        assert_eq!(Interpreter::NodeJs.command(), "node");
        assert_eq!(Interpreter::Shell.command(), "sh");
    }

    #[test]
    fn test_interpreter_extension() {
        assert_eq!(Interpreter::Python.extension(), "py");
        assert_eq!(Interpreter::NodeJs.extension(), "js");
        assert_eq!(Interpreter::Shell.extension(), "sh");
    }

    #[test]
    fn test_find_executable_is_cached() {
        let manager = ProcessManager::new();
        let first = manager.find_executable(Interpreter::Shell).unwrap();
        let second = manager.find_executable(Interpreter::Shell).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.executable_paths.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_check_rejects_bad_shell() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("bad.sh");
        std::fs::write(&script, "if then fi\n").unwrap();

        let manager = ProcessManager::new();
        let result = manager.check(Interpreter::Shell, &script, dir.path()).await;
        assert!(matches!(result, Err(RobotError::Compile(_))));
    }

    #[tokio::test]
    async fn test_terminate_kills_group() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleepy.sh");
        std::fs::write(&script, "sleep 30\n").unwrap();

        let manager = ProcessManager::new();
        let mut child = manager.spawn(Interpreter::Shell, &script, dir.path()).unwrap();

        let group = ProcessGroup::of(&child);
        manager.terminate(&mut child, &group, Duration::from_secs(2)).await;
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_group_kills_leftover_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fork.sh");
        std::fs::write(&script, "sleep 30 &\necho $! > bg.pid\n").unwrap();

        let manager = ProcessManager::new();
        let mut child = manager.spawn(Interpreter::Shell, &script, dir.path()).unwrap();
        let group = ProcessGroup::of(&child);
        assert!(child.wait().await.unwrap().success());

        let pid: i32 = std::fs::read_to_string(dir.path().join("bg.pid")).unwrap().trim().parse().unwrap();
        assert!(!testing::wait_until_gone(pid, Duration::from_millis(100)).await);

        drop(group);
        assert!(testing::wait_until_gone(pid, Duration::from_secs(2)).await);
    }
}
