// src/pool/registry.rs
//! Identity-indexed storage of live workers
//!
//! Backed by a sharded `DashMap`, so lookups and mutations on different
//! workers never contend on a pool-wide lock. Capacity accounting lives in
//! [`SlotBudget`](crate::pool::capacity::SlotBudget); the registry only
//! stores what has already been admitted.

use crate::pool::worker::{Worker, WorkerId, WorkerInfo, WorkerState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent map of live workers
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, Arc<Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a worker; hands it back if the id is already taken
    pub fn insert(&self, worker: Arc<Worker>) -> Result<(), Arc<Worker>> {
        match self.workers.entry(worker.id()) {
            Entry::Occupied(_) => Err(worker),
            Entry::Vacant(slot) => {
                slot.insert(worker);
                Ok(())
            }
        }
    }

    /// Look up a worker; the returned handle does not pin the map shard
    pub fn get(&self, id: &WorkerId) -> Option<Arc<Worker>> {
        self.workers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &WorkerId) -> Option<Arc<Worker>> {
        self.workers.remove(id).map(|(_, worker)| worker)
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Snapshot of registered ids
    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|entry| *entry.key()).collect()
    }

    /// Snapshot of every worker's info
    pub fn infos(&self) -> Vec<WorkerInfo> {
        self.workers.iter().map(|entry| entry.value().info()).collect()
    }

    /// Number of registered workers currently in `state`
    pub fn count_in(&self, state: WorkerState) -> usize {
        self.workers
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Arc<Worker> {
        Arc::new(Worker::new(WorkerId::new(), "test.robot"))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = WorkerRegistry::new();
        let w = worker();
        let id = w.id();

        registry.insert(Arc::clone(&w)).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));
        assert_eq!(registry.get(&id).unwrap().id(), id);

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(registry.is_empty());
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = WorkerRegistry::new();
        let w = worker();
        registry.insert(Arc::clone(&w)).unwrap();

        let duplicate = Arc::new(Worker::new(w.id(), "other.robot"));
        let rejected = registry.insert(duplicate).unwrap_err();
        assert_eq!(rejected.robot_name(), "other.robot");
        assert_eq!(registry.get(&w.id()).unwrap().robot_name(), "test.robot");
    }

    #[test]
    fn test_snapshots() {
        let registry = WorkerRegistry::new();
        for _ in 0..3 {
            registry.insert(worker()).unwrap();
        }
        assert_eq!(registry.ids().len(), 3);
        assert_eq!(registry.infos().len(), 3);
        assert_eq!(registry.count_in(WorkerState::Allocating), 3);
        assert_eq!(registry.count_in(WorkerState::Idle), 0);
    }

    #[test]
    fn test_concurrent_inserts() {
        let registry = Arc::new(WorkerRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.insert(worker()).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }
}
