//! Task and result persistence.
//!
//! Storage is consumed through the [`Storage`] trait. Calls are synchronous and
//! short; a value is durable once the call returns `Ok`.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use thiserror::Error;

use crate::task::{Task, TaskId, TaskResult, TaskStatus};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Corrupt row for task {task_id}: {reason}")]
    Corrupt { task_id: String, reason: String },

    #[error("Storage lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Partial update applied by [`Storage::update_task`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
        }
    }
}

/// Persistence collaborator for tasks and their results.
pub trait Storage: Send + Sync {
    fn save_task(&self, task: &Task) -> StorageResult<()>;

    fn get_task(&self, id: &TaskId) -> StorageResult<Option<Task>>;

    /// Apply `patch` and stamp `updated_at`. Unknown ids are ignored.
    fn update_task(&self, id: &TaskId, patch: TaskPatch) -> StorageResult<()>;

    /// Tasks ordered newest first by creation time.
    fn list_tasks(&self, limit: usize, offset: usize) -> StorageResult<Vec<Task>>;

    /// Insert or overwrite the result keyed by its task id.
    fn save_task_result(&self, result: &TaskResult) -> StorageResult<()>;

    fn get_task_result(&self, task_id: &TaskId) -> StorageResult<Option<TaskResult>>;

    /// Results in storage iteration order.
    fn list_task_results(&self, limit: usize, offset: usize) -> StorageResult<Vec<TaskResult>>;
}
