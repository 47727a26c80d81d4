// src/service.rs
//! Execution service
//!
//! Entry point for transports. Every call resolves the default pool and
//! forwards to the matching pool operation; failures come back untouched so
//! the transport can map them with [`PoolError::status_code`].
//!
//! [`PoolError::status_code`]: crate::utils::errors::PoolError::status_code

use crate::pool::manager::PoolManager;
use crate::pool::worker::{WorkerId, WorkerInfo};
use crate::pool::worker_pool::{PoolStats, ReleaseReport};
use crate::runtime::robot::{Parameters, RobotOutput};
use crate::utils::errors::Result;
use serde::Serialize;
use std::sync::Arc;

/// Reply to a ping
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub pool: PoolStats,
}

#[derive(Clone)]
pub struct ExecutionService {
    manager: Arc<PoolManager>,
}

impl ExecutionService {
    pub fn new(manager: Arc<PoolManager>) -> Self {
        Self { manager }
    }

    pub async fn allocate_worker(&self, robot_name: &str) -> Result<WorkerId> {
        self.manager.default_pool().allocate(robot_name).await
    }

    pub async fn release_worker(&self, id: WorkerId) -> Result<()> {
        self.manager.default_pool().release(id).await
    }

    pub async fn run_worker(&self, id: WorkerId, parameters: &Parameters) -> Result<RobotOutput> {
        self.manager.default_pool().run(id, parameters).await
    }

    pub async fn stop_worker(&self, id: WorkerId) -> Result<()> {
        self.manager.default_pool().stop(id).await
    }

    pub async fn release_all_workers(&self) -> ReleaseReport {
        self.manager.default_pool().release_all().await
    }

    pub fn worker_info(&self, id: WorkerId) -> Result<WorkerInfo> {
        self.manager.default_pool().worker_info(id)
    }

    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            name: env!("CARGO_PKG_NAME"),
            version: crate::VERSION,
            pool: self.manager.default_pool().stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::worker::WorkerState;
    use crate::runtime::robot::testing::FakeCompiler;
    use crate::utils::config::ServiceConfig;
    use crate::utils::errors::PoolError;
    use serde_json::json;

    fn service(max_executors: usize) -> ExecutionService {
        let mut config = ServiceConfig::default();
        config.pool.max_executors = max_executors;
        let manager = PoolManager::new(&config, FakeCompiler::new()).unwrap();
        ExecutionService::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let service = service(2);
        let id = service.allocate_worker("echo").await.unwrap();
        assert_eq!(service.worker_info(id).unwrap().state, WorkerState::Idle);

        let mut parameters = Parameters::new();
        parameters.insert("name".into(), json!("robot"));
        let output = service.run_worker(id, &parameters).await.unwrap();
        assert_eq!(output.as_value(), Some(&json!({"name": "robot"})));

        service.release_worker(id).await.unwrap();
        let err = service.worker_info(id).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_failures_pass_through() {
        let service = service(1);

        let err = service.allocate_worker("missing.robot").await.unwrap_err();
        assert!(matches!(err, PoolError::RobotNotFound(_)));
        assert_eq!(err.status_code(), 404);

        let id = service.allocate_worker("echo").await.unwrap();
        let err = service.allocate_worker("echo").await.unwrap_err();
        assert_eq!(err.status_code(), 406);

        let err = service.stop_worker(id).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_service_info_reports_pool() {
        let service = service(3);
        service.allocate_worker("void").await.unwrap();

        let info = service.service_info();
        assert_eq!(info.name, "robot-pool");
        assert_eq!(info.pool.capacity, 3);
        assert_eq!(info.pool.allocated, 1);
        assert_eq!(info.pool.idle, 1);

        let report = service.release_all_workers().await;
        assert_eq!(report.released.len(), 1);
        assert_eq!(service.service_info().pool.allocated, 0);
    }
}
