//! Task entity and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque, globally unique task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> target` is a legal transition.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Parse the lowercase wire/storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Invalid transition: {from} → {to} for task {task_id}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// One user change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_message: String,
    pub status: TaskStatus,
    /// Conversation the request came from (chat id, channel, ...).
    pub origin_chat_ref: String,
    /// Message within that conversation.
    pub origin_message_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a queued task with a freshly generated id.
    pub fn new(
        user_message: impl Into<String>,
        origin_chat_ref: impl Into<String>,
        origin_message_ref: impl Into<String>,
    ) -> Self {
        Self::with_id(TaskId::new(), user_message, origin_chat_ref, origin_message_ref)
    }

    /// Create a queued task with a caller-chosen id.
    pub fn with_id(
        id: TaskId,
        user_message: impl Into<String>,
        origin_chat_ref: impl Into<String>,
        origin_message_ref: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_message: user_message.into(),
            status: TaskStatus::Queued,
            origin_chat_ref: origin_chat_ref.into(),
            origin_message_ref: origin_message_ref.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Return a copy of this task moved to `target`, stamping `updated_at`.
    ///
    /// `self` is never modified; on an illegal pair the error names the
    /// attempted source/target and the task id.
    pub fn transition(&self, target: TaskStatus) -> Result<Task, TaskError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }

        Ok(Task {
            status: target,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 4] = [
        TaskStatus::Queued,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    fn task_in(status: TaskStatus) -> Task {
        Task {
            status,
            ..Task::with_id("t-1".into(), "change the header", "chat-1", "msg-1")
        }
    }

    #[test]
    fn test_new_task_is_queued() {
        let task = Task::new("make the button blue", "chat", "msg");
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.created_at, task.updated_at);
        assert!(!task.id.as_str().is_empty());
        assert_ne!(task.id, Task::new("other", "chat", "msg").id);
    }

    #[test]
    fn test_valid_transitions_keep_identity() {
        let legal = [
            (TaskStatus::Queued, TaskStatus::Running),
            (TaskStatus::Queued, TaskStatus::Failed),
            (TaskStatus::Running, TaskStatus::Completed),
            (TaskStatus::Running, TaskStatus::Failed),
        ];

        for (from, to) in legal {
            let task = task_in(from);
            let next = task.transition(to).unwrap();
            assert_eq!(next.status, to);
            assert_eq!(next.id, task.id);
            assert_eq!(next.created_at, task.created_at);
            assert!(next.updated_at >= task.updated_at);
        }
    }

    #[test]
    fn test_invalid_transitions_leave_input_untouched() {
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    continue;
                }
                let task = task_in(from);
                let before = task.clone();
                let err = task.transition(to).unwrap_err();
                assert_eq!(task, before);
                assert_eq!(
                    err,
                    TaskError::InvalidTransition {
                        task_id: "t-1".into(),
                        from,
                        to,
                    }
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for status in [TaskStatus::Completed, TaskStatus::Failed] {
            assert!(status.is_terminal());
            for to in ALL {
                assert!(task_in(status).transition(to).is_err());
            }
        }
    }

    #[test]
    fn test_error_message_names_pair_and_task() {
        let err = task_in(TaskStatus::Completed)
            .transition(TaskStatus::Running)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transition: completed → running for task t-1"
        );
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ALL {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("paused"), None);
    }
}
