//! Per-task sequencing of git side effects around the agent.
//!
//! pull → prepare branch → agent (with retries) → push → persist + notify.
//! Any failure cleans the working tree before the failed result is recorded;
//! a cleanup failure is only logged so it never hides the original error.
//! Runs the queue drops on timeout or cancellation get the same treatment
//! through [`TaskHandler::on_abandoned`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::agent::{run_with_retry, AgentRunner};
use crate::git::GitOps;
use crate::notify::{format_error, format_task_result, Notifier, ProgressReporter};
use crate::queue::{TaskContext, TaskHandler};
use crate::storage::{Storage, TaskPatch};
use crate::task::{Task, TaskId, TaskResult, TaskStatus};
use crate::tools::ToolContext;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    git: Arc<dyn GitOps>,
    agent: Arc<dyn AgentRunner>,
    notifier: Arc<dyn Notifier>,
    repo_path: PathBuf,
    max_retries: u32,
    span: tracing::Span,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        git: Arc<dyn GitOps>,
        agent: Arc<dyn AgentRunner>,
        notifier: Arc<dyn Notifier>,
        repo_path: impl Into<PathBuf>,
    ) -> Self {
        let repo_path = repo_path.into();
        let span = tracing::info_span!("orchestrator", repo = %repo_path.display());
        Self {
            storage,
            git,
            agent,
            notifier,
            repo_path,
            max_retries: DEFAULT_MAX_RETRIES,
            span,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run `task` to a terminal result. Never fails: errors become a failed
    /// [`TaskResult`] that is persisted and reported like any other outcome.
    pub async fn process(&self, task: &Task) -> TaskResult {
        let span = tracing::info_span!(parent: &self.span, "process_task", task_id = %task.id);
        async {
            let progress = ProgressReporter::new(
                self.notifier.clone(),
                task.origin_chat_ref.clone(),
                task.id.clone(),
            );

            match self.run_steps(task, &progress).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Task failed: {:#}", e);
                    progress.report("Error occurred, cleaning up...").await;
                    self.clean_up().await;
                    self.finish(task, TaskResult::failed(task.id.clone(), e.to_string()))
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, task: &Task, progress: &ProgressReporter) -> anyhow::Result<TaskResult> {
        self.storage
            .update_task(&task.id, TaskPatch::status(TaskStatus::Running))?;

        progress.report("Pulling latest changes...").await;
        self.git.pull().await?;

        progress.report("Preparing branch...").await;
        let branch = self.git.prepare_branch(&task.id).await?;
        tracing::info!(branch = %branch, "Branch ready");

        progress.report("Working on changes...").await;
        let tool_ctx = ToolContext::new(self.repo_path.clone(), self.git.clone(), progress.clone());
        let agent = self.agent.as_ref();
        let tool_ctx = &tool_ctx;
        let agent_result = run_with_retry(
            &task.user_message,
            self.max_retries,
            progress,
            move |attempt| async move { agent.run(&attempt, tool_ctx).await },
        )
        .await;

        if !agent_result.success {
            progress.report("Changes failed, cleaning up...").await;
            self.clean_up().await;
            let result = TaskResult {
                commit_hash: None,
                ..TaskResult::from_agent(task.id.clone(), agent_result)
            };
            return Ok(self.finish(task, result).await);
        }

        if agent_result.commit_hash.is_some() {
            progress.report("Pushing changes...").await;
            self.git.push(&branch).await?;
        }

        let result = TaskResult::from_agent(task.id.clone(), agent_result);
        Ok(self.finish(task, result).await)
    }

    async fn clean_up(&self) {
        if let Err(e) = self.git.clean().await {
            tracing::warn!("Cleanup failed: {}", e);
        }
    }

    /// Persist `result`, move the stored task to its terminal state and tell
    /// the originating conversation.
    async fn finish(&self, task: &Task, result: TaskResult) -> TaskResult {
        if let Err(e) = self.storage.save_task_result(&result) {
            tracing::warn!("Failed to save task result: {}", e);
        }

        let status = if result.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.set_status(&task.id, status);

        let message = if result.success {
            format_task_result(&result)
        } else {
            format_error(result.error.as_deref().unwrap_or(&result.summary))
        };
        self.notifier.notify(&task.origin_chat_ref, &message).await;

        tracing::info!(success = result.success, files = result.files_changed.len(), "Task done");
        result
    }

    fn set_status(&self, id: &TaskId, status: TaskStatus) {
        if let Err(e) = self.storage.update_task(id, TaskPatch::status(status)) {
            tracing::warn!(status = %status, "Failed to update task status: {}", e);
        }
    }
}

#[async_trait]
impl TaskHandler for Orchestrator {
    async fn handle(&self, ctx: TaskContext) -> anyhow::Result<TaskResult> {
        Ok(self.process(&ctx.task).await)
    }

    async fn on_abandoned(&self, task: &Task, reason: &str) {
        let span = tracing::info_span!(parent: &self.span, "abandon_task", task_id = %task.id);
        async {
            tracing::warn!(reason, "Run abandoned");
            ProgressReporter::new(
                self.notifier.clone(),
                task.origin_chat_ref.clone(),
                task.id.clone(),
            )
            .report("Error occurred, cleaning up...")
            .await;
            self.clean_up().await;
            self.finish(task, TaskResult::failed(task.id.clone(), reason))
                .await;
        }
        .instrument(span)
        .await
    }
}
