//! Outcomes: what one agent execution produced and what gets persisted per task.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::TaskId;

/// Result of one end-to-end agent execution (or of a whole retry sequence).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub summary: String,
    /// Paths targeted by `write_file`/`edit_file`, relative to the working tree.
    pub files_changed: BTreeSet<String>,
    pub commit_hash: Option<String>,
    pub screenshot_path: Option<String>,
}

impl AgentResult {
    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
            ..Default::default()
        }
    }
}

/// Persisted outcome of a task that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub summary: String,
    pub files_changed: BTreeSet<String>,
    pub commit_hash: Option<String>,
    pub screenshot_path: Option<String>,
    pub error: Option<String>,
}

impl TaskResult {
    /// Successful result built from the agent's output.
    pub fn from_agent(task_id: TaskId, agent: AgentResult) -> Self {
        let error = if agent.success {
            None
        } else {
            Some(agent.summary.clone())
        };
        Self {
            task_id,
            success: agent.success,
            summary: agent.summary,
            files_changed: agent.files_changed,
            commit_hash: agent.commit_hash,
            screenshot_path: agent.screenshot_path,
            error,
        }
    }

    /// Failed result whose summary and error are both `message`.
    pub fn failed(task_id: TaskId, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            task_id,
            success: false,
            summary: message.clone(),
            files_changed: BTreeSet::new(),
            commit_hash: None,
            screenshot_path: None,
            error: Some(message),
        }
    }
}
