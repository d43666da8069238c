//! Tool dispatcher for the agent loop.
//!
//! Every capability the model can invoke implements [`Tool`]; the
//! [`ToolRegistry`] maps tool names to implementations and converts every
//! failure (error or panic) into an error [`ToolResult`] so a bad call never
//! aborts the conversation.
//!
//! All path-taking tools resolve their argument with [`resolve_in_root`],
//! which rejects anything that lands outside the task's working tree.

mod file_ops;
mod git_ops;
mod project;
mod search;
mod terminal;
pub(crate) mod walk;

pub use file_ops::{EditFile, ReadFile, WriteFile};
pub use git_ops::{GitCommit, GitDiff, COMMITTED_PREFIX};
pub use project::{DetectConventions, ProjectMap, ReportProgress};
pub use search::{GlobFiles, SearchFiles};
pub use terminal::RunBash;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::git::GitOps;
use crate::llm::{FunctionDefinition, ToolDefinition};
use crate::notify::ProgressReporter;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path traversal attempt blocked: {0}")]
    PathTraversal(String),

    #[error("Missing '{0}' argument")]
    MissingArgument(&'static str),

    #[error("Invalid '{name}' argument: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// Outcome of one tool call as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Everything a tool may touch while serving one task.
#[derive(Clone)]
pub struct ToolContext {
    /// Working tree root; no tool may resolve a path outside it.
    pub root: PathBuf,
    pub git: Arc<dyn GitOps>,
    pub progress: ProgressReporter,
}

impl ToolContext {
    pub fn new(root: impl Into<PathBuf>, git: Arc<dyn GitOps>, progress: ProgressReporter) -> Self {
        Self {
            root: root.into(),
            git,
            progress,
        }
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        resolve_in_root(&self.root, path)
    }
}

/// Trait for tools the model can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name exposed to the model.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `Err` is reported to the model as `Error: <message>`.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult>;
}

/// Name-indexed set of tools.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    /// The full set of tools available to the agent loop.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ReadFile));
        registry.register(Arc::new(WriteFile));
        registry.register(Arc::new(EditFile));
        registry.register(Arc::new(RunBash));
        registry.register(Arc::new(SearchFiles));
        registry.register(Arc::new(GlobFiles));
        registry.register(Arc::new(GitDiff));
        registry.register(Arc::new(GitCommit));
        registry.register(Arc::new(ProjectMap));
        registry.register(Arc::new(DetectConventions));
        registry.register(Arc::new(ReportProgress));
        registry
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Tool schemas in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    /// Execute `name` with `args`. Never fails: errors become error results.
    pub async fn dispatch(&self, name: &str, args: &Value, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = %name, "Unknown tool requested");
            return ToolResult::error(format!("Unknown tool: {}", name));
        };

        let outcome = std::panic::AssertUnwindSafe(tool.execute(args, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(tool = %name, is_error = result.is_error, "Tool finished");
                result
            }
            Ok(Err(e)) => {
                tracing::error!(tool = %name, "Tool execution failed: {}", e);
                ToolResult::error(format!("Error: {}", e))
            }
            Err(_) => {
                tracing::error!(tool = %name, "Tool panicked");
                ToolResult::error("Error: tool panicked")
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or(ToolError::MissingArgument(name))
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `raw` against `root`, rejecting any result outside `root`.
///
/// The check is lexical first, then repeated on the canonical form of the
/// deepest existing ancestor so symlinks inside the tree cannot point out of it.
/// Dangling links are followed hop by hop, since writing through one creates
/// its target.
pub fn resolve_in_root(root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let blocked = || ToolError::PathTraversal(raw.to_string());

    let root = normalize(root);
    let candidate = normalize(&root.join(raw));
    if !candidate.starts_with(&root) {
        return Err(blocked());
    }

    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());
    let mut cursor = candidate.clone();
    for _ in 0..MAX_LINK_HOPS {
        let Some(existing) = deepest_existing(&cursor) else {
            return Ok(candidate);
        };
        match existing.canonicalize() {
            Ok(canonical) if canonical.starts_with(&canonical_root) => return Ok(candidate),
            Ok(_) => return Err(blocked()),
            Err(_) => {
                let target = std::fs::read_link(existing).map_err(|_| blocked())?;
                let rest = cursor.strip_prefix(existing).map_err(|_| blocked())?;
                let base = existing.parent().unwrap_or_else(|| Path::new("/"));
                let mut next = normalize(&base.join(target));
                if !rest.as_os_str().is_empty() {
                    next.push(rest);
                }
                cursor = next;
            }
        }
    }

    Err(blocked())
}

const MAX_LINK_HOPS: usize = 40;

/// Deepest ancestor of `path` (itself included) that has a directory entry,
/// counting dangling symlinks as present.
fn deepest_existing(path: &Path) -> Option<&Path> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.symlink_metadata().is_ok())
}
