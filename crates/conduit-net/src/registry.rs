//! Path-keyed registry of in-flight transport tasks.
//!
//! The registry maps a request path to every task currently dispatched for
//! it. More than one task may share a path when the same path is in flight
//! concurrently. A path key exists only while at least one task is listed
//! under it.
//!
//! All mutation goes through one mutex. Cancelling variants drain the
//! matching entries under the lock and call
//! [`TransportTask::cancel`](crate::transport::TransportTask::cancel) after
//! releasing it, so a transport that completes synchronously from `cancel()`
//! can re-enter the registry without deadlocking.

use std::collections::HashMap;

use conduit_core::logging::targets;
use parking_lot::Mutex;

use crate::transport::{TaskHandle, TaskId};

/// Concurrency-safe `path -> tasks` map.
#[derive(Default)]
pub struct TaskRegistry {
    entries: Mutex<HashMap<String, Vec<TaskHandle>>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `path`.
    ///
    /// A task that already finished is dropped silently and `false` is
    /// returned.
    pub fn add(&self, task: TaskHandle, path: &str) -> bool {
        let mut entries = self.entries.lock();
        if !task.is_in_progress() {
            tracing::trace!(target: targets::REGISTRY, task = %task.id(), path, "task finished before registration");
            return false;
        }
        tracing::trace!(target: targets::REGISTRY, task = %task.id(), path, "task registered");
        entries.entry(path.to_string()).or_default().push(task);
        true
    }

    /// Remove the task with `id` from `path`, pruning the key when its list
    /// becomes empty. Returns the removed handle.
    pub fn remove(&self, id: TaskId, path: &str) -> Option<TaskHandle> {
        let mut entries = self.entries.lock();
        let tasks = entries.get_mut(path)?;
        let index = tasks.iter().position(|task| task.id() == id)?;
        let removed = tasks.remove(index);
        if tasks.is_empty() {
            entries.remove(path);
        }
        Some(removed)
    }

    /// Cancel the task with `id` and remove it from `path`.
    pub fn cancel_and_remove(&self, id: TaskId, path: &str) -> bool {
        match self.remove(id, path) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove every task registered under exactly `path`.
    pub fn remove_all_for_path(&self, path: &str) -> Vec<TaskHandle> {
        self.entries.lock().remove(path).unwrap_or_default()
    }

    /// Cancel and remove every task registered under exactly `path`.
    ///
    /// Returns the number of tasks cancelled.
    pub fn cancel_all_for_path(&self, path: &str) -> usize {
        let drained = self.remove_all_for_path(path);
        tracing::debug!(target: targets::REGISTRY, path, count = drained.len(), "cancelling tasks for path");
        cancel_each(drained)
    }

    /// Remove every task whose path contains `prefix`.
    pub fn remove_all_with_prefix(&self, prefix: &str) -> Vec<TaskHandle> {
        let mut entries = self.entries.lock();
        let keys: Vec<String> = entries
            .keys()
            .filter(|key| key.contains(prefix))
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| entries.remove(key))
            .flatten()
            .collect()
    }

    /// Cancel and remove every task whose path contains `prefix`.
    ///
    /// Returns the number of tasks cancelled.
    pub fn cancel_all_with_prefix(&self, prefix: &str) -> usize {
        let drained = self.remove_all_with_prefix(prefix);
        tracing::debug!(target: targets::REGISTRY, prefix, count = drained.len(), "cancelling tasks relative to path");
        cancel_each(drained)
    }

    /// Remove every task.
    pub fn remove_all(&self) -> Vec<TaskHandle> {
        self.entries
            .lock()
            .drain()
            .flat_map(|(_, tasks)| tasks)
            .collect()
    }

    /// Cancel and remove every task.
    ///
    /// Returns the number of tasks cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained = self.remove_all();
        tracing::debug!(target: targets::REGISTRY, count = drained.len(), "cancelling all tasks");
        cancel_each(drained)
    }

    /// Snapshot of the tasks registered under `path`.
    pub fn tasks_for_path(&self, path: &str) -> Vec<TaskHandle> {
        self.entries.lock().get(path).cloned().unwrap_or_default()
    }

    /// Whether any task is registered under `path`.
    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    /// Number of distinct paths with at least one task.
    pub fn path_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Total number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        let mut map = f.debug_map();
        for (path, tasks) in entries.iter() {
            map.entry(path, &tasks.iter().map(|t| t.id()).collect::<Vec<_>>());
        }
        map.finish()
    }
}

fn cancel_each(tasks: Vec<TaskHandle>) -> usize {
    let count = tasks.len();
    for task in tasks {
        task.cancel();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportTask;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeTask {
        id: TaskId,
        running: AtomicBool,
        cancels: AtomicUsize,
    }

    impl FakeTask {
        fn running() -> Arc<Self> {
            Arc::new(Self {
                id: TaskId::next(),
                running: AtomicBool::new(true),
                cancels: AtomicUsize::new(0),
            })
        }
    }

    impl TransportTask for FakeTask {
        fn id(&self) -> TaskId {
            self.id
        }

        fn is_in_progress(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_then_remove_prunes_key() {
        let registry = TaskRegistry::new();
        let task = FakeTask::running();
        assert!(registry.add(task.clone(), "/users"));
        assert!(registry.contains_path("/users"));

        assert!(registry.remove(task.id, "/users").is_some());
        assert!(!registry.contains_path("/users"));
        assert_eq!(registry.path_count(), 0);
    }

    #[test]
    fn test_finished_task_is_not_registered() {
        let registry = TaskRegistry::new();
        let task = FakeTask::running();
        task.running.store(false, Ordering::SeqCst);
        assert!(!registry.add(task, "/users"));
        assert_eq!(registry.task_count(), 0);
    }

    #[test]
    fn test_same_path_keeps_a_list() {
        let registry = TaskRegistry::new();
        let first = FakeTask::running();
        let second = FakeTask::running();
        registry.add(first.clone(), "/repos");
        registry.add(second.clone(), "/repos");
        assert_eq!(registry.tasks_for_path("/repos").len(), 2);

        registry.remove(first.id, "/repos");
        assert_eq!(registry.tasks_for_path("/repos").len(), 1);
        assert!(registry.contains_path("/repos"));
    }

    #[test]
    fn test_cancel_all_for_path() {
        let registry = TaskRegistry::new();
        let first = FakeTask::running();
        let second = FakeTask::running();
        let other = FakeTask::running();
        registry.add(first.clone(), "/repos");
        registry.add(second.clone(), "/repos");
        registry.add(other.clone(), "/users");

        assert_eq!(registry.cancel_all_for_path("/repos"), 2);
        assert_eq!(first.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(second.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(other.cancels.load(Ordering::SeqCst), 0);
        assert!(!registry.contains_path("/repos"));
        assert!(registry.contains_path("/users"));
    }

    #[test]
    fn test_cancel_unknown_path_is_noop() {
        let registry = TaskRegistry::new();
        let task = FakeTask::running();
        registry.add(task.clone(), "/users");
        assert_eq!(registry.cancel_all_for_path("/nothing"), 0);
        assert!(!registry.cancel_and_remove(TaskId::next(), "/users"));
        assert_eq!(registry.task_count(), 1);
    }

    #[test]
    fn test_prefix_matches_substring() {
        let registry = TaskRegistry::new();
        let a = FakeTask::running();
        let b = FakeTask::running();
        let c = FakeTask::running();
        registry.add(a.clone(), "/repos/1");
        registry.add(b.clone(), "/users/1/repos");
        registry.add(c.clone(), "/users/2");

        assert_eq!(registry.cancel_all_with_prefix("/repos"), 2);
        assert_eq!(c.cancels.load(Ordering::SeqCst), 0);
        assert_eq!(registry.path_count(), 1);
    }

    #[test]
    fn test_cancel_all() {
        let registry = TaskRegistry::new();
        let a = FakeTask::running();
        let b = FakeTask::running();
        registry.add(a.clone(), "/a");
        registry.add(b.clone(), "/b");
        assert_eq!(registry.cancel_all(), 2);
        assert_eq!(registry.task_count(), 0);
        assert_eq!(a.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_add_remove() {
        let registry = Arc::new(TaskRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let task = FakeTask::running();
                        registry.add(task.clone(), "/shared");
                        registry.remove(task.id, "/shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert!(!registry.contains_path("/shared"));
        assert_eq!(registry.task_count(), 0);
    }
}
