// src/pool/manager.rs
//! Process-wide owner of worker pools
//!
//! Pools are keyed by the work directory they resolve robots against. Only
//! the default pool, built from the service configuration, is registered
//! today; the map leaves room for per-project pools.

use crate::pool::worker_pool::{ReleaseReport, WorkerPool, WorkerPoolConfig};
use crate::runtime::robot::RobotCompiler;
use crate::utils::config::ServiceConfig;
use crate::utils::errors::Result;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Owns the default pool for the lifetime of the service
pub struct PoolManager {
    default_pool: Arc<WorkerPool>,
    pools: DashMap<PathBuf, Arc<WorkerPool>>,
}

impl PoolManager {
    pub fn new(config: &ServiceConfig, compiler: Arc<dyn RobotCompiler>) -> Result<Self> {
        config.validate()?;

        let pool_config = WorkerPoolConfig {
            max_executors: config.pool.max_executors,
            work_directory: config.pool.work_directory.clone(),
            stop_timeout: config.robot.stop_timeout(),
        };
        let default_pool = Arc::new(WorkerPool::with_config(pool_config, compiler)?);

        let pools = DashMap::new();
        pools.insert(default_pool.work_directory().to_path_buf(), Arc::clone(&default_pool));

        Ok(Self { default_pool, pools })
    }

    /// The single pool every request is served from
    pub fn default_pool(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.default_pool)
    }

    /// Pool serving `work_directory`, if one exists
    pub fn pool_for(&self, work_directory: &Path) -> Option<Arc<WorkerPool>> {
        self.pools.get(work_directory).map(|entry| Arc::clone(entry.value()))
    }

    /// Release idle workers in every pool
    pub async fn shutdown(&self) -> ReleaseReport {
        let pools: Vec<_> = self.pools.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut report = ReleaseReport::default();

        for pool in pools {
            let partial = pool.release_all().await;
            report.released.extend(partial.released);
            report.skipped.extend(partial.skipped);
            report.failed.extend(partial.failed);
        }

        info!(
            released = report.released.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Pool manager shut down"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::robot::testing::FakeCompiler;
    use crate::utils::errors::PoolError;

    fn config(max_executors: usize) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.pool.max_executors = max_executors;
        config
    }

    #[test]
    fn test_default_pool_is_shared() {
        let manager = PoolManager::new(&config(2), FakeCompiler::new()).unwrap();
        let a = manager.default_pool();
        let b = manager.default_pool();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.capacity(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PoolManager::new(&config(0), FakeCompiler::new());
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[test]
    fn test_pool_for_work_directory() {
        let manager = PoolManager::new(&config(1), FakeCompiler::new()).unwrap();
        let pool = manager.pool_for(Path::new(".")).unwrap();

        assert!(Arc::ptr_eq(&pool, &manager.default_pool()));
        assert!(manager.pool_for(Path::new("/nowhere")).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_idle_workers() {
        let manager = PoolManager::new(&config(3), FakeCompiler::new()).unwrap();
        let pool = manager.default_pool();
        pool.allocate("echo").await.unwrap();
        pool.allocate("void").await.unwrap();

        let report = manager.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(report.released.len(), 2);
        assert_eq!(pool.stats().allocated, 0);
    }
}
