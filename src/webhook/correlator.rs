//! Map a deploy event back to the task that caused it.

use crate::notify::DeployNotification;
use crate::storage::{Storage, StorageResult};
use crate::task::{Task, TaskStatus};

use super::DeployEvent;

const RESULT_SCAN: usize = 50;
const RECENT_SCAN: usize = 10;

/// Find the task behind `event`.
///
/// First match by commit hash over the stored results (storage order, first
/// hit wins), then fall back to the newest task that is completed or running.
pub fn correlate(event: &DeployEvent, storage: &dyn Storage) -> StorageResult<Option<Task>> {
    if let Some(commit) = event.commit_hash.as_deref() {
        for result in storage.list_task_results(RESULT_SCAN, 0)? {
            if result.commit_hash.as_deref() != Some(commit) {
                continue;
            }
            if let Some(task) = storage.get_task(&result.task_id)? {
                tracing::info!(task_id = %task.id, commit, "Correlated deploy by commit");
                return Ok(Some(task));
            }
        }
    }

    let recent = storage
        .list_tasks(RECENT_SCAN, 0)?
        .into_iter()
        .find(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Running));

    match &recent {
        Some(task) => tracing::info!(task_id = %task.id, "Correlated deploy to most recent task"),
        None => tracing::warn!(deploy_id = %event.deploy_id, "Deploy event matches no task"),
    }
    Ok(recent)
}

impl DeployEvent {
    /// The notification sent to the task's conversation.
    pub fn notification_for(&self, task: &Task) -> DeployNotification {
        DeployNotification {
            task_origin_ref: task.origin_chat_ref.clone(),
            task_id: task.id.clone(),
            status: self.status,
            url: self.url.clone(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::DeployStatus;
    use crate::storage::MemoryStorage;
    use crate::task::TaskResult;
    use chrono::{Duration, Utc};

    fn event(commit: Option<&str>) -> DeployEvent {
        DeployEvent {
            platform: "custom".to_string(),
            deploy_id: "d-1".to_string(),
            status: DeployStatus::Success,
            url: Some("https://example.app".to_string()),
            error: None,
            commit_hash: commit.map(str::to_string),
        }
    }

    fn stored_task(storage: &MemoryStorage, id: &str, status: TaskStatus, age_secs: i64) -> Task {
        let created = Utc::now() - Duration::seconds(age_secs);
        let task = Task {
            status,
            created_at: created,
            updated_at: created,
            ..Task::with_id(id.into(), "change", format!("chat-{}", id), "msg")
        };
        storage.save_task(&task).unwrap();
        task
    }

    #[test]
    fn test_commit_match_beats_recency() {
        let storage = MemoryStorage::new();
        stored_task(&storage, "t-1", TaskStatus::Completed, 60);
        stored_task(&storage, "t-2", TaskStatus::Completed, 1);
        let result = TaskResult {
            commit_hash: Some("abc123".to_string()),
            success: true,
            error: None,
            ..TaskResult::failed("t-1".into(), "")
        };
        storage.save_task_result(&result).unwrap();

        let task = correlate(&event(Some("abc123")), &storage).unwrap().unwrap();
        assert_eq!(task.id.as_str(), "t-1");

        let note = event(Some("abc123")).notification_for(&task);
        assert_eq!(note.task_origin_ref, "chat-t-1");
        assert_eq!(note.url.as_deref(), Some("https://example.app"));
    }

    #[test]
    fn test_falls_back_to_newest_active_task() {
        let storage = MemoryStorage::new();
        stored_task(&storage, "old", TaskStatus::Completed, 60);
        stored_task(&storage, "running", TaskStatus::Running, 30);
        stored_task(&storage, "queued", TaskStatus::Queued, 1);

        let task = correlate(&event(Some("unknown")), &storage).unwrap().unwrap();
        assert_eq!(task.id.as_str(), "running");
    }

    #[test]
    fn test_no_candidates_maps_to_nothing() {
        let storage = MemoryStorage::new();
        assert_eq!(correlate(&event(Some("abc123")), &storage).unwrap(), None);

        stored_task(&storage, "f", TaskStatus::Failed, 5);
        stored_task(&storage, "q", TaskStatus::Queued, 1);
        assert_eq!(correlate(&event(None), &storage).unwrap(), None);
    }
}
