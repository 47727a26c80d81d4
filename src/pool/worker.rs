// src/pool/worker.rs
//! Worker: the runtime handle for one allocated robot
//!
//! # Lifecycle
//!
//! ```text
//! ALLOCATING ──compile ok──▶ IDLE ◀──────────────┐
//!                             │ │                 │ execute returns
//!                             │ └──run──▶ RUNNING ┘ (result, error or stop)
//!                             │
//!                             └──release──▶ RELEASED (terminal)
//! ```
//!
//! The state lives in an atomic so it can be read without locking, but every
//! transition is a compare-and-swap made while holding the worker's
//! transition lock. The lock also guards the cancellation token of the
//! in-flight run, so `stop` can never cancel a run other than the one it
//! observed as RUNNING.

use crate::runtime::robot::{Parameters, Robot, RobotCompiler, RobotError, RobotOutput};
use crate::utils::errors::{PoolError, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use ulid::Ulid;

/// Opaque, globally unique worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Ulid);

impl WorkerId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    /// Slot reserved, robot compiling
    Allocating = 0,
    /// Ready to run
    Idle = 1,
    /// Executing the robot
    Running = 2,
    /// Torn down; terminal
    Released = 3,
}

impl WorkerState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Allocating,
            1 => Self::Idle,
            2 => Self::Running,
            _ => Self::Released,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocating => "allocating",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub robot_name: String,
    pub state: WorkerState,
    pub allocated_at: DateTime<Utc>,
    pub run_count: u64,
}

/// Cancellation token of the run currently in flight, if any
type RunSlot = Option<CancellationToken>;

/// One allocated robot
pub struct Worker {
    id: WorkerId,
    robot_name: String,
    allocated_at: DateTime<Utc>,
    state: AtomicU8,
    transition: Mutex<RunSlot>,
    robot: OnceCell<Box<dyn Robot>>,
    closed: AtomicBool,
    run_count: AtomicU64,
    became_idle: Notify,
}

impl Worker {
    /// Create a worker in the ALLOCATING state
    pub(crate) fn new(id: WorkerId, robot_name: impl Into<String>) -> Self {
        Self {
            id,
            robot_name: robot_name.into(),
            allocated_at: Utc::now(),
            state: AtomicU8::new(WorkerState::Allocating as u8),
            transition: Mutex::new(None),
            robot: OnceCell::new(),
            closed: AtomicBool::new(false),
            run_count: AtomicU64::new(0),
            became_idle: Notify::new(),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn robot_name(&self) -> &str {
        &self.robot_name
    }

    /// Current state (lock-free read)
    #[inline]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            robot_name: self.robot_name.clone(),
            state: self.state(),
            allocated_at: self.allocated_at,
            run_count: self.run_count.load(Ordering::Relaxed),
        }
    }

    /// Swap `from` for `to`; the guard proves the transition lock is held
    fn transition(
        &self,
        _guard: &MutexGuard<'_, RunSlot>,
        from: WorkerState,
        to: WorkerState,
    ) -> std::result::Result<(), WorkerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(WorkerState::from_u8)
    }

    fn invalid_state(&self, actual: WorkerState, required: WorkerState) -> PoolError {
        PoolError::InvalidState {
            id: self.id,
            actual,
            required,
        }
    }

    /// Compile the robot and move ALLOCATING → IDLE
    ///
    /// On failure the worker never reaches IDLE and should be discarded.
    pub(crate) async fn compile(&self, compiler: &dyn RobotCompiler, work_directory: &Path) -> Result<()> {
        let robot = compiler
            .compile(work_directory, &self.robot_name)
            .await
            .map_err(|e| match e {
                RobotError::NotFound(name) => PoolError::RobotNotFound(name),
                other => PoolError::CompileFailure {
                    robot: self.robot_name.clone(),
                    reason: other.to_string(),
                },
            })?;

        if self.robot.set(robot).is_err() {
            return Err(self.invalid_state(self.state(), WorkerState::Allocating));
        }

        let guard = self.transition.lock();
        self.transition(&guard, WorkerState::Allocating, WorkerState::Idle)
            .map_err(|actual| self.invalid_state(actual, WorkerState::Allocating))
    }

    /// Run the robot: IDLE → RUNNING → IDLE
    ///
    /// Exactly one of several concurrent callers wins the IDLE → RUNNING
    /// swap; the others get `InvalidState`. The worker is back in IDLE
    /// before this returns, whatever the outcome, and also if the returned
    /// future is dropped mid-run.
    pub(crate) async fn run(&self, parameters: &Parameters) -> Result<RobotOutput> {
        let cancel = self.begin_run()?;
        let guard = RunGuard { worker: self };

        let robot = match self.robot.get() {
            Some(robot) => robot,
            None => {
                return Err(PoolError::OperationFailed(format!(
                    "worker {} has no compiled robot",
                    self.id
                )))
            }
        };

        let result = robot.execute(parameters, cancel).await;
        drop(guard);

        result.map_err(|e| match e {
            RobotError::Interrupted => PoolError::Interrupted(self.id),
            other => PoolError::ExecutionFailure {
                robot: self.robot_name.clone(),
                reason: other.to_string(),
            },
        })
    }

    fn begin_run(&self) -> Result<CancellationToken> {
        let mut slot = self.transition.lock();
        self.transition(&slot, WorkerState::Idle, WorkerState::Running)
            .map_err(|actual| self.invalid_state(actual, WorkerState::Idle))?;

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        self.run_count.fetch_add(1, Ordering::Relaxed);
        debug!(worker_id = %self.id, robot = %self.robot_name, "Worker running");
        Ok(token)
    }

    /// RUNNING → IDLE; only ever called by the task that won `begin_run`
    fn finish_run(&self) {
        {
            let mut slot = self.transition.lock();
            slot.take();
            if let Err(actual) = self.transition(&slot, WorkerState::Running, WorkerState::Idle) {
                error!(worker_id = %self.id, state = %actual, "Run finished outside RUNNING state");
            }
        }
        self.became_idle.notify_waiters();
        debug!(worker_id = %self.id, "Worker idle");
    }

    /// Request cooperative cancellation of the in-flight run
    ///
    /// Fails with `InvalidState` unless the worker is RUNNING. With
    /// `wait = Some(limit)`, also waits for the run to hand the worker back
    /// to IDLE; the state change itself is always left to the running task.
    pub(crate) async fn interrupt(&self, wait: Option<Duration>) -> Result<()> {
        let became_idle = self.became_idle.notified();
        tokio::pin!(became_idle);
        became_idle.as_mut().enable();

        {
            let slot = self.transition.lock();
            let state = self.state();
            if state != WorkerState::Running {
                return Err(self.invalid_state(state, WorkerState::Running));
            }
            if let Some(token) = slot.as_ref() {
                token.cancel();
            }
        }
        debug!(worker_id = %self.id, "Interrupt requested");

        if let Some(limit) = wait {
            if tokio::time::timeout(limit, became_idle).await.is_err() {
                warn!(worker_id = %self.id, ?limit, "Robot did not stop in time");
                return Err(PoolError::OperationFailed(format!(
                    "worker {} did not stop within {:?}",
                    self.id, limit
                )));
            }
        }
        Ok(())
    }

    /// IDLE → RELEASED; the winner of this swap owns the teardown
    pub(crate) fn begin_release(&self) -> Result<()> {
        let slot = self.transition.lock();
        match self.transition(&slot, WorkerState::Idle, WorkerState::Released) {
            Ok(()) => Ok(()),
            Err(WorkerState::Released) => Err(PoolError::WorkerNotFound(self.id)),
            Err(actual) => Err(self.invalid_state(actual, WorkerState::Idle)),
        }
    }

    /// Release the robot's resources. Idempotent.
    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.robot.get() {
            Some(robot) => robot
                .close()
                .await
                .map_err(|e| PoolError::OperationFailed(format!("closing worker {}: {}", self.id, e))),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("robot_name", &self.robot_name)
            .field("state", &self.state())
            .field("allocated_at", &self.allocated_at)
            .finish()
    }
}

/// Returns the worker to IDLE when the run ends or its future is dropped
struct RunGuard<'a> {
    worker: &'a Worker,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.worker.finish_run();
    }
}
