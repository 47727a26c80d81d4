// src/pool/mod.rs
//! Worker pool
//!
//! This module tracks robot workers through their lifecycle:
//!
//! - **Worker**: one loaded robot and its `ALLOCATING → IDLE ⇄ RUNNING → RELEASED` state
//! - **Registry**: identity-indexed storage of live workers
//! - **Capacity**: lock-free admission budget
//! - **Worker Pool**: allocate, run, stop and release
//! - **Manager**: process-wide owner of the default pool

pub mod capacity;
pub mod manager;
pub mod registry;
pub mod worker;
pub mod worker_pool;

// Re-export commonly used types
pub use capacity::{SlotBudget, SlotReservation};
pub use manager::PoolManager;
pub use registry::WorkerRegistry;
pub use worker::{Worker, WorkerId, WorkerInfo, WorkerState};
pub use worker_pool::{PoolStats, ReleaseReport, WorkerPool, WorkerPoolConfig};
