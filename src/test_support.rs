//! Shared fakes for unit tests.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::git::{GitError, GitOps, GitResult};
use crate::llm::{ChatMessage, ChatResponse, LlmClient, ToolCall, ToolDefinition};
use crate::notify::{DeployNotification, Notifier, ProgressReporter};
use crate::task::TaskId;
use crate::tools::ToolContext;

/// Notifier that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    deploys: Mutex<Vec<DeployNotification>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|(_, text)| text).collect()
    }

    pub fn deploys(&self) -> Vec<DeployNotification> {
        self.deploys.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, chat_ref: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((chat_ref.to_string(), message.to_string()));
    }

    async fn deploy_event(&self, event: &DeployNotification) {
        self.deploys.lock().unwrap().push(event.clone());
    }
}

/// In-memory git double that records calls.
#[derive(Default)]
pub struct FakeGit {
    calls: Mutex<Vec<String>>,
    commit_messages: Mutex<Vec<String>>,
    next_commit: Mutex<Option<String>>,
    diff: Mutex<String>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FakeGit {
    pub fn set_next_commit(&self, hash: Option<&str>) {
        *self.next_commit.lock().unwrap() = hash.map(str::to_string);
    }

    pub fn set_diff(&self, diff: &str) {
        *self.diff.lock().unwrap() = diff.to_string();
    }

    /// Make `op` ("pull", "push", "clean", ...) fail from now on.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.commit_messages.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str) -> GitResult<()> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.failing.lock().unwrap().contains(op) {
            return Err(GitError::Command {
                command: op.to_string(),
                stderr: format!("{} failed", op),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GitOps for FakeGit {
    async fn pull(&self) -> GitResult<()> {
        self.record("pull")
    }

    async fn prepare_branch(&self, _task_id: &TaskId) -> GitResult<String> {
        self.record("prepare_branch")?;
        Ok("main".to_string())
    }

    async fn commit_all(&self, message: &str) -> GitResult<Option<String>> {
        self.record("commit_all")?;
        self.commit_messages.lock().unwrap().push(message.to_string());
        Ok(self.next_commit.lock().unwrap().clone())
    }

    async fn push(&self, _branch: &str) -> GitResult<()> {
        self.record("push")
    }

    async fn rollback(&self) -> GitResult<String> {
        self.record("rollback")?;
        Ok("revert".to_string())
    }

    async fn clean(&self) -> GitResult<()> {
        self.record("clean")
    }

    async fn diff(&self) -> GitResult<String> {
        self.record("diff")?;
        Ok(self.diff.lock().unwrap().clone())
    }
}

/// LLM double that replays canned responses and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: Some(content.to_string()),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }
    }

    /// A response requesting `calls` as `(name, json arguments)`.
    pub fn tool_calls(calls: &[(&str, &str)]) -> ChatResponse {
        let tool_calls: Vec<ToolCall> = calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall::function(format!("call_{}", i), *name, *args))
            .collect();
        ChatResponse {
            tool_calls: Some(tool_calls),
            finish_reason: Some("tool_calls".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
    ) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}

pub fn tool_context_with_git(
    root: &Path,
    git: Arc<FakeGit>,
) -> (ToolContext, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let progress = ProgressReporter::new(notifier.clone(), "chat-1", "t-1".into());
    (ToolContext::new(root, git, progress), notifier)
}

pub fn tool_context(root: &Path) -> (ToolContext, Arc<RecordingNotifier>) {
    tool_context_with_git(root, Arc::new(FakeGit::default()))
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "git {:?} failed", args);
}

/// Initialise a repository with one committed `hello.txt`.
pub fn init_git_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("hello.txt"), "Hello World").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "Initial commit"]);
}
