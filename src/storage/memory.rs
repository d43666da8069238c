//! In-memory storage, used when SQLite is unavailable and in tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use super::{Storage, StorageError, StorageResult, TaskPatch};
use crate::task::{Task, TaskId, TaskResult};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    tasks: RwLock<HashMap<TaskId, Task>>,
    /// Results in insertion order; re-saving keeps the original slot.
    results: RwLock<Vec<TaskResult>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save_task(&self, task: &Task) -> StorageResult<()> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::Poisoned)?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> StorageResult<Option<Task>> {
        let tasks = self.tasks.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tasks.get(id).cloned())
    }

    fn update_task(&self, id: &TaskId, patch: TaskPatch) -> StorageResult<()> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::Poisoned)?;
        if let Some(task) = tasks.get_mut(id) {
            if let Some(status) = patch.status {
                task.status = status;
            }
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    fn list_tasks(&self, limit: usize, offset: usize) -> StorageResult<Vec<Task>> {
        let tasks = self.tasks.read().map_err(|_| StorageError::Poisoned)?;
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    fn save_task_result(&self, result: &TaskResult) -> StorageResult<()> {
        let mut results = self.results.write().map_err(|_| StorageError::Poisoned)?;
        match results.iter_mut().find(|r| r.task_id == result.task_id) {
            Some(existing) => *existing = result.clone(),
            None => results.push(result.clone()),
        }
        Ok(())
    }

    fn get_task_result(&self, task_id: &TaskId) -> StorageResult<Option<TaskResult>> {
        let results = self.results.read().map_err(|_| StorageError::Poisoned)?;
        Ok(results.iter().find(|r| &r.task_id == task_id).cloned())
    }

    fn list_task_results(&self, limit: usize, offset: usize) -> StorageResult<Vec<TaskResult>> {
        let results = self.results.read().map_err(|_| StorageError::Poisoned)?;
        Ok(results.iter().skip(offset).take(limit).cloned().collect())
    }
}
