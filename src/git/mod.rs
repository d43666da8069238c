//! Version-control collaborator.
//!
//! The orchestrator and the `git_diff`/`git_commit` tools only see the
//! [`GitOps`] capability trait; [`GitManager`] implements it on top of the
//! `git` CLI.

mod manager;

pub use manager::{GitAuthor, GitManager};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to execute git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Failed to create branch {branch}: {reason}")]
    Branch { branch: String, reason: String },

    #[error("No commits to rollback")]
    NothingToRollback,

    #[error("Repository setup failed: {0}")]
    Setup(String),
}

pub type GitResult<T> = Result<T, GitError>;

/// Where a task's work is committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchStrategy {
    /// Stay on the currently checked-out branch.
    #[default]
    Direct,
    /// Create `task/<task id>` for each task.
    FeatureBranch,
}

impl BranchStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(Self::Direct),
            "feature-branch" => Some(Self::FeatureBranch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::FeatureBranch => "feature-branch",
        }
    }
}

/// Branch name used for `task_id` under the feature-branch strategy.
pub fn task_branch_name(task_id: &TaskId) -> String {
    format!("task/{}", task_id)
}

/// Git capability interface for one working tree.
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Fetch and fast-forward the current branch.
    async fn pull(&self) -> GitResult<()>;

    /// Check out the branch the task should work on and return its name.
    async fn prepare_branch(&self, task_id: &TaskId) -> GitResult<String>;

    /// Stage everything and commit. `None` when there was nothing to commit.
    async fn commit_all(&self, message: &str) -> GitResult<Option<String>>;

    async fn push(&self, branch: &str) -> GitResult<()>;

    /// Revert the last commit, returning the hash of the revert commit.
    async fn rollback(&self) -> GitResult<String>;

    /// Discard uncommitted changes and untracked files.
    async fn clean(&self) -> GitResult<()>;

    /// Uncommitted changes as a unified diff.
    async fn diff(&self) -> GitResult<String>;
}
