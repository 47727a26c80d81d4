// src/runtime/mod.rs
//! Robot execution runtime
//!
//! This module provides the capability the pool drives, including:
//!
//! - **Robot**: the compile/execute/close contract a worker owns
//! - **Process Manager**: interpreter lookup, spawning and termination
//! - **Script Robot**: robots backed by Python, Node.js or shell scripts
//!
//! # Architecture
//!
//! ```text
//!   WorkerPool::allocate ──▶ RobotCompiler::compile(work_dir, "a.b.c")
//!                                   │
//!                                   ▼
//!                          <work_dir>/a/b/c.{py,js,sh}
//!                                   │ syntax check
//!                                   ▼
//!   WorkerPool::run ───────▶ Robot::execute(params, cancel)
//!                                   │ one interpreter process per run
//!                                   ▼
//!                               RobotOutput
//! ```

pub mod process_manager;
pub mod robot;
pub mod script_robot;

// Re-export commonly used types
pub use process_manager::{Interpreter, ProcessGroup, ProcessManager};
pub use robot::{Parameters, Robot, RobotCompiler, RobotError, RobotOutput};
pub use script_robot::{ScriptCompiler, ScriptRobot};
