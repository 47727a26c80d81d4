// src/pool/worker_pool.rs
//! Bounded pool of robot workers
//!
//! Admission control is accept-or-reject: `allocate` either reserves one of
//! `max_executors` slots or fails fast with `CapacityExceeded`. Nothing is
//! queued.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//! ├─ SlotBudget      CAS counter, reserved before compiling
//! ├─ WorkerRegistry  DashMap<WorkerId, Arc<Worker>>
//! └─ RobotCompiler   turns robot names into executables
//! ```
//!
//! Operations on different workers never serialize against each other; the
//! only pool-wide structures are the budget and the sharded registry, and
//! neither is locked across an `.await`.

use crate::pool::capacity::SlotBudget;
use crate::pool::registry::WorkerRegistry;
use crate::pool::worker::{Worker, WorkerId, WorkerInfo, WorkerState};
use crate::runtime::robot::{Parameters, RobotCompiler, RobotOutput};
use crate::utils::errors::{PoolError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for a worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of allocated workers (default: 4)
    pub max_executors: usize,

    /// Project root robots are resolved against
    pub work_directory: PathBuf,

    /// How long `stop` waits for the run to wind down (default: 300s)
    pub stop_timeout: Option<Duration>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_executors: 4,
            work_directory: PathBuf::from("."),
            stop_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    /// Slots held, including allocations still compiling
    pub reserved: usize,
    pub allocated: usize,
    pub idle: usize,
    pub running: usize,
}

/// Outcome of [`WorkerPool::release_all`]
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub released: Vec<WorkerId>,
    /// Left alone because a run was in flight
    pub skipped: Vec<WorkerId>,
    pub failed: Vec<(WorkerId, PoolError)>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Worker pool for one work directory
pub struct WorkerPool {
    config: WorkerPoolConfig,
    slots: SlotBudget,
    registry: WorkerRegistry,
    compiler: Arc<dyn RobotCompiler>,
}

impl WorkerPool {
    /// Create a pool with default settings and the given capacity
    pub fn new(max_executors: usize, work_directory: impl Into<PathBuf>, compiler: Arc<dyn RobotCompiler>) -> Result<Self> {
        let config = WorkerPoolConfig {
            max_executors,
            work_directory: work_directory.into(),
            ..Default::default()
        };

        Self::with_config(config, compiler)
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: WorkerPoolConfig, compiler: Arc<dyn RobotCompiler>) -> Result<Self> {
        if config.max_executors == 0 {
            return Err(PoolError::Config("max_executors must be at least 1".to_string()));
        }

        info!(
            max_executors = config.max_executors,
            work_directory = %config.work_directory.display(),
            "Initializing worker pool"
        );

        Ok(Self {
            slots: SlotBudget::new(config.max_executors),
            registry: WorkerRegistry::new(),
            compiler,
            config,
        })
    }

    pub fn work_directory(&self) -> &Path {
        &self.config.work_directory
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Allocate a worker for `robot_name`
    ///
    /// A slot is reserved before compiling; a failed compile hands it back.
    pub async fn allocate(&self, robot_name: &str) -> Result<WorkerId> {
        let reservation = match self.slots.try_reserve() {
            Some(reservation) => reservation,
            None => {
                metrics::counter!("robot_pool_allocations_total", "outcome" => "rejected").increment(1);
                warn!(robot = %robot_name, capacity = self.capacity(), "Worker pool is full");
                return Err(PoolError::CapacityExceeded {
                    capacity: self.capacity(),
                });
            }
        };

        let worker = Arc::new(Worker::new(WorkerId::new(), robot_name));
        debug!(worker_id = %worker.id(), robot = %robot_name, "Compiling robot");

        if let Err(e) = worker.compile(self.compiler.as_ref(), &self.config.work_directory).await {
            metrics::counter!("robot_pool_allocations_total", "outcome" => "compile_failed").increment(1);
            warn!(robot = %robot_name, error = %e, "Robot failed to load");
            return Err(e);
        }

        let id = worker.id();
        if let Err(duplicate) = self.registry.insert(worker) {
            // Fresh ULIDs never collide; treat it as a broken invariant
            error!(worker_id = %id, "Worker id already registered");
            if let Err(e) = duplicate.close().await {
                warn!(worker_id = %id, error = %e, "Failed to close unregistered worker");
            }
            return Err(PoolError::OperationFailed(format!("worker id {} already registered", id)));
        }
        reservation.commit();

        metrics::counter!("robot_pool_allocations_total", "outcome" => "allocated").increment(1);
        self.record_allocated();
        info!(worker_id = %id, robot = %robot_name, "Worker allocated");

        Ok(id)
    }

    /// Run the worker's robot and wait for its result
    pub async fn run(&self, id: WorkerId, parameters: &Parameters) -> Result<RobotOutput> {
        let worker = self.find(id)?;
        let started = Instant::now();

        let result = worker.run(parameters).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(PoolError::Interrupted(_)) => "interrupted",
            Err(PoolError::InvalidState { .. }) => "rejected",
            Err(_) => "failed",
        };
        metrics::counter!("robot_pool_runs_total", "outcome" => outcome).increment(1);
        if outcome != "rejected" {
            metrics::histogram!("robot_pool_run_duration_seconds").record(started.elapsed().as_secs_f64());
        }

        match &result {
            Ok(_) => debug!(worker_id = %id, elapsed = ?started.elapsed(), "Run completed"),
            Err(e) => debug!(worker_id = %id, error = %e, "Run did not complete"),
        }
        result
    }

    /// Ask a running worker to stop
    ///
    /// Cancellation is cooperative. The worker returns to IDLE when its run
    /// does, never through this call.
    pub async fn stop(&self, id: WorkerId) -> Result<()> {
        let worker = self.find(id)?;
        worker.interrupt(self.config.stop_timeout).await?;
        info!(worker_id = %id, "Worker stopped");
        Ok(())
    }

    /// Tear down an idle worker and free its slot
    ///
    /// The worker leaves the registry and gives up its slot before its robot
    /// is closed, so an abandoned release cannot strand either. A worker
    /// whose robot fails to close is still gone; the failure is reported.
    pub async fn release(&self, id: WorkerId) -> Result<()> {
        let worker = self.find(id)?;
        worker.begin_release()?;

        if self.registry.remove(&id).is_some() {
            self.slots.release();
        }
        self.record_allocated();

        match worker.close().await {
            Ok(()) => {
                info!(worker_id = %id, "Worker released");
                Ok(())
            }
            Err(e) => {
                error!(worker_id = %id, error = %e, "Worker released but cleanup failed");
                Err(e)
            }
        }
    }

    /// Release every idle worker; running workers are left alone
    pub async fn release_all(&self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        for id in self.registry.ids() {
            match self.release(id).await {
                Ok(()) => report.released.push(id),
                Err(PoolError::InvalidState {
                    actual: WorkerState::Running,
                    ..
                }) => report.skipped.push(id),
                // Released concurrently by someone else
                Err(PoolError::WorkerNotFound(_)) => {}
                Err(e) => report.failed.push((id, e)),
            }
        }

        info!(
            released = report.released.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Released all idle workers"
        );
        report
    }

    pub fn worker_state(&self, id: WorkerId) -> Result<WorkerState> {
        Ok(self.find(id)?.state())
    }

    pub fn worker_info(&self, id: WorkerId) -> Result<WorkerInfo> {
        Ok(self.find(id)?.info())
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.registry.infos()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.slots.capacity(),
            reserved: self.slots.in_use(),
            allocated: self.registry.len(),
            idle: self.registry.count_in(WorkerState::Idle),
            running: self.registry.count_in(WorkerState::Running),
        }
    }

    fn find(&self, id: WorkerId) -> Result<Arc<Worker>> {
        self.registry.get(&id).ok_or(PoolError::WorkerNotFound(id))
    }

    fn record_allocated(&self) {
        metrics::gauge!("robot_pool_workers_allocated").set(self.registry.len() as f64);
    }
}
