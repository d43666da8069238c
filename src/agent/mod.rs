//! Turn-bounded tool-calling agent.
//!
//! One [`AgentLoop::execute`] call drives a conversation with the model until it
//! signals completion, asks for something unexpected, or runs out of turns.
//! Requested tool calls go through the [`ToolRegistry`] one at a time, in the
//! order received. Edits already applied are never undone here; cleaning the
//! working tree after a failure is the orchestrator's job.

pub mod context;
pub mod prompt_modules;
pub mod retry;

pub use retry::{run_with_retry, Attempt};

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::llm::{ChatMessage, ChatOptions, ChatResponse, LlmClient, ToolCall};
use crate::task::AgentResult;
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

pub const DEFAULT_MAX_TURNS: u32 = 50;
pub const MAX_TURNS_SUMMARY: &str = "Agent reached maximum turns without completing";
const DEFAULT_SUMMARY: &str = "Changes applied";

/// Tools whose `path` argument is recorded as a changed file.
const FILE_WRITING_TOOLS: &[&str] = &["write_file", "edit_file"];
const COMMIT_TOOL: &str = "git_commit";

/// Something that can carry out one attempt at a change request.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, attempt: &Attempt, ctx: &ToolContext) -> anyhow::Result<AgentResult>;
}

/// What the model asked for on one turn.
#[derive(Debug, PartialEq)]
enum TurnOutcome {
    Complete(String),
    ToolCalls(Vec<ToolCall>),
    Unexpected(Option<String>),
}

fn classify_response(response: &ChatResponse) -> TurnOutcome {
    if let Some(calls) = response.tool_calls.as_ref().filter(|c| !c.is_empty()) {
        return TurnOutcome::ToolCalls(calls.clone());
    }

    match response.finish_reason.as_deref() {
        None | Some("stop") | Some("end_turn") => {
            let summary = response
                .content
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SUMMARY);
            TurnOutcome::Complete(summary.to_string())
        }
        Some(other) => TurnOutcome::Unexpected(Some(other.to_string())),
    }
}

/// First user message of an attempt, annotated with the previous failure on retries.
pub fn initial_user_content(attempt: &Attempt) -> String {
    match &attempt.error_context {
        Some(error) if attempt.attempt > 1 => format!(
            "{}\n\n[Previous attempt failed with: {}]\nPlease fix the issue and try again.",
            attempt.user_message, error
        ),
        _ => attempt.user_message.clone(),
    }
}

/// Effects accumulated over the tool calls of one execution.
#[derive(Debug, Default)]
struct Effects {
    files_changed: BTreeSet<String>,
    commit_hash: Option<String>,
}

impl Effects {
    fn record(&mut self, name: &str, args: &Value, result: &ToolResult) {
        if FILE_WRITING_TOOLS.contains(&name) {
            if let Some(path) = args.get("path").and_then(Value::as_str) {
                self.files_changed.insert(path.to_string());
            }
        }

        if name == COMMIT_TOOL && !result.is_error {
            if let Some(hash) = result
                .content
                .strip_prefix(crate::tools::COMMITTED_PREFIX)
                .map(str::trim)
                .filter(|h| !h.is_empty())
            {
                self.commit_hash = Some(hash.to_string());
            }
        }
    }

    fn finish(self, success: bool, summary: String) -> AgentResult {
        AgentResult {
            success,
            summary,
            files_changed: self.files_changed,
            commit_hash: self.commit_hash,
            screenshot_path: None,
        }
    }
}

pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    model: String,
    max_turns: u32,
    max_tokens: Option<u64>,
}

impl AgentLoop {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            tools: ToolRegistry::standard(),
            model: model.into(),
            max_turns: DEFAULT_MAX_TURNS,
            max_tokens: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Drive one conversation to completion or turn-budget exhaustion.
    ///
    /// `Err` is returned only when the context cannot be built or the model
    /// call itself fails; tool failures are fed back to the model.
    pub async fn execute(&self, attempt: &Attempt, ctx: &ToolContext) -> anyhow::Result<AgentResult> {
        let span = tracing::info_span!(
            "agent_loop",
            task_id = %ctx.progress.task_id(),
            attempt = attempt.attempt
        );
        self.execute_inner(attempt, ctx).instrument(span).await
    }

    async fn execute_inner(&self, attempt: &Attempt, ctx: &ToolContext) -> anyhow::Result<AgentResult> {
        let system_prompt = context::system_prompt_for(&ctx.root, &attempt.user_message).await?;
        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(initial_user_content(attempt)),
        ];
        let definitions = self.tools.definitions();
        let options = ChatOptions {
            max_tokens: self.max_tokens,
            ..Default::default()
        };
        let mut effects = Effects::default();

        for turn in 0..self.max_turns {
            tracing::info!(turn, "Agent turn");

            let response = self
                .llm
                .chat_completion_with_options(&self.model, &messages, Some(&definitions), options.clone())
                .await?;

            match classify_response(&response) {
                TurnOutcome::Complete(summary) => {
                    tracing::info!(turn, files = effects.files_changed.len(), "Agent completed");
                    return Ok(effects.finish(true, summary));
                }
                TurnOutcome::ToolCalls(calls) => {
                    messages.push(ChatMessage::assistant_tool_calls(
                        response.content.clone(),
                        calls.clone(),
                    ));
                    for call in &calls {
                        let (args, result) = self.run_call(call, ctx).await;
                        effects.record(&call.function.name, &args, &result);
                        messages.push(ChatMessage::tool_result(&call.id, result.content));
                    }
                }
                TurnOutcome::Unexpected(reason) => {
                    tracing::warn!(turn, finish_reason = ?reason, "Unexpected finish reason");
                    break;
                }
            }
        }

        Ok(effects.finish(false, MAX_TURNS_SUMMARY.to_string()))
    }

    async fn run_call(&self, call: &ToolCall, ctx: &ToolContext) -> (Value, ToolResult) {
        let name = call.function.name.as_str();
        let raw = call.function.arguments.trim();
        let args = if raw.is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(tool = %name, "Invalid tool arguments: {}", e);
                    return (
                        Value::Null,
                        ToolResult::error(format!("Error: invalid JSON arguments: {}", e)),
                    );
                }
            }
        };

        tracing::info!(tool = %name, "Executing tool");
        let result = self.tools.dispatch(name, &args, ctx).await;
        (args, result)
    }
}

#[async_trait]
impl AgentRunner for AgentLoop {
    async fn run(&self, attempt: &Attempt, ctx: &ToolContext) -> anyhow::Result<AgentResult> {
        self.execute(attempt, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::test_support::{tool_context_with_git, FakeGit, ScriptedLlm};
    use tempfile::tempdir;

    fn first_attempt(message: &str) -> Attempt {
        Attempt {
            user_message: message.to_string(),
            error_context: None,
            attempt: 1,
        }
    }

    #[test]
    fn test_retry_annotation_only_after_first_attempt() {
        let mut attempt = first_attempt("make it blue");
        attempt.error_context = Some("ignored".to_string());
        assert_eq!(initial_user_content(&attempt), "make it blue");

        attempt.attempt = 2;
        attempt.error_context = Some("lint failed".to_string());
        assert_eq!(
            initial_user_content(&attempt),
            "make it blue\n\n[Previous attempt failed with: lint failed]\nPlease fix the issue and try again."
        );
    }

    #[test]
    fn test_classify_response() {
        assert_eq!(
            classify_response(&ScriptedLlm::text("  Done  ")),
            TurnOutcome::Complete("Done".to_string())
        );
        assert_eq!(
            classify_response(&ChatResponse::default()),
            TurnOutcome::Complete("Changes applied".to_string())
        );
        assert_eq!(
            classify_response(&ChatResponse {
                finish_reason: Some("length".to_string()),
                ..Default::default()
            }),
            TurnOutcome::Unexpected(Some("length".to_string()))
        );
        assert!(matches!(
            classify_response(&ScriptedLlm::tool_calls(&[("git_diff", "")])),
            TurnOutcome::ToolCalls(_)
        ));
    }

    #[tokio::test]
    async fn test_tool_turns_accumulate_effects() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("index.html"), "<h1>Old</h1>").unwrap();
        let git = Arc::new(FakeGit::default());
        git.set_next_commit(Some("abc123"));
        let (ctx, _) = tool_context_with_git(temp.path(), git.clone());

        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_calls(&[
                ("edit_file", r#"{"path":"index.html","old_string":"Old","new_string":"New"}"#),
                ("write_file", r#"{"path":"about.html","content":"<p>About</p>"}"#),
            ]),
            ScriptedLlm::tool_calls(&[("git_commit", r#"{"message":"Update pages"}"#)]),
            ScriptedLlm::text("Updated the heading and added an about page"),
        ]));
        let agent = AgentLoop::new(llm.clone(), "test-model");

        let result = agent.execute(&first_attempt("update the heading"), &ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.summary, "Updated the heading and added an about page");
        assert_eq!(
            result.files_changed.iter().cloned().collect::<Vec<_>>(),
            vec!["about.html", "index.html"]
        );
        assert_eq!(result.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("index.html")).unwrap(),
            "<h1>New</h1>"
        );

        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][1].content.as_deref(), Some("update the heading"));
        // system, user, assistant, two tool results
        let second = &requests[1];
        assert_eq!(second.len(), 5);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(second[3].content.as_deref(), Some("Edited index.html"));
        assert_eq!(second[4].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_turn_budget_exhaustion_keeps_partial_effects() {
        let temp = tempdir().unwrap();
        let (ctx, _) = tool_context_with_git(temp.path(), Arc::new(FakeGit::default()));
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_calls(&[("write_file", r#"{"path":"a.css","content":"a{}"}"#)]),
            ScriptedLlm::tool_calls(&[("git_diff", "")]),
        ]));
        let agent = AgentLoop::new(llm.clone(), "m").with_max_turns(2);

        let result = agent.execute(&first_attempt("style"), &ctx).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.summary, MAX_TURNS_SUMMARY);
        assert!(result.files_changed.contains("a.css"));
        assert!(temp.path().join("a.css").exists());
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_unexpected_stop_ends_loop_early() {
        let temp = tempdir().unwrap();
        let (ctx, _) = tool_context_with_git(temp.path(), Arc::new(FakeGit::default()));
        let llm = Arc::new(ScriptedLlm::new(vec![ChatResponse {
            finish_reason: Some("content_filter".to_string()),
            ..Default::default()
        }]));
        let agent = AgentLoop::new(llm.clone(), "m");

        let result = agent.execute(&first_attempt("x"), &ctx).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.summary, MAX_TURNS_SUMMARY);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_arguments_and_failed_commit_are_reported_to_model() {
        let temp = tempdir().unwrap();
        let git = Arc::new(FakeGit::default());
        git.fail_on("commit_all");
        let (ctx, _) = tool_context_with_git(temp.path(), git);
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::tool_calls(&[
                ("read_file", "{not json"),
                ("git_commit", r#"{"message":"m"}"#),
            ]),
            ScriptedLlm::text("gave up"),
        ]));
        let agent = AgentLoop::new(llm.clone(), "m");

        let result = agent.execute(&first_attempt("x"), &ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.commit_hash, None);
        let second = &llm.requests()[1];
        assert!(second[3]
            .content
            .as_deref()
            .unwrap()
            .starts_with("Error: invalid JSON arguments"));
        assert_eq!(
            second[4].content.as_deref(),
            Some("Error: git commit_all failed: commit_all failed")
        );
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let temp = tempdir().unwrap();
        let (ctx, _) = tool_context_with_git(temp.path(), Arc::new(FakeGit::default()));
        let agent = AgentLoop::new(Arc::new(ScriptedLlm::default()), "m");

        let err = agent.execute(&first_attempt("x"), &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "script exhausted");
    }
}
