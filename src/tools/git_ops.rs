//! Git tools backed by the task's [`GitOps`](crate::git::GitOps) handle.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{str_arg, Tool, ToolContext, ToolResult};

/// Prefix of a successful `git_commit` answer; the agent loop parses the hash after it.
pub const COMMITTED_PREFIX: &str = "Committed: ";

pub struct GitDiff;

#[async_trait]
impl Tool for GitDiff {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show uncommitted changes (git diff)"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let diff = ctx.git.diff().await?;
        if diff.is_empty() {
            return Ok(ToolResult::ok("No changes"));
        }
        Ok(ToolResult::ok(diff))
    }
}

pub struct GitCommit;

#[async_trait]
impl Tool for GitCommit {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Stage all changes and commit with the given message"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Commit message"}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let message = str_arg(args, "message")?;
        match ctx.git.commit_all(message).await? {
            Some(hash) => Ok(ToolResult::ok(format!("{}{}", COMMITTED_PREFIX, hash))),
            None => Ok(ToolResult::ok("Nothing to commit")),
        }
    }
}
