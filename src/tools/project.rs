//! Project overview tools and the progress channel.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::walk::project_files;
use super::{str_arg, Tool, ToolContext, ToolResult};

const MAP_LIMIT: usize = 200;
const CONFIG_PREVIEW_CHARS: usize = 2_000;

/// Config files inspected by `detect_conventions`, in output order.
pub const CONFIG_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    ".eslintrc.json",
    ".eslintrc.js",
    "eslint.config.js",
    ".prettierrc",
    "Cargo.toml",
    "rustfmt.toml",
];

pub struct ProjectMap;

#[async_trait]
impl Tool for ProjectMap {
    fn name(&self) -> &str {
        "project_map"
    }

    fn description(&self) -> &str {
        "Get the project file structure (up to 200 files, sorted)"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let root = ctx.root.clone();
        let files = tokio::task::spawn_blocking(move || project_files(&root)).await?;
        let listing: Vec<String> = files.into_iter().take(MAP_LIMIT).collect();
        Ok(ToolResult::ok(listing.join("\n")))
    }
}

pub struct DetectConventions;

#[async_trait]
impl Tool for DetectConventions {
    fn name(&self) -> &str {
        "detect_conventions"
    }

    fn description(&self) -> &str {
        "Read project config files (eslint, prettier, tsconfig, package.json, Cargo.toml) and return their contents"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let mut sections = Vec::new();
        for file in CONFIG_FILES {
            let Ok(content) = tokio::fs::read_to_string(ctx.root.join(file)).await else {
                continue;
            };
            let preview: String = content.chars().take(CONFIG_PREVIEW_CHARS).collect();
            sections.push(format!("--- {} ---\n{}", file, preview));
        }

        if sections.is_empty() {
            return Ok(ToolResult::ok("No config files found"));
        }
        Ok(ToolResult::ok(sections.join("\n\n")))
    }
}

pub struct ReportProgress;

#[async_trait]
impl Tool for ReportProgress {
    fn name(&self) -> &str {
        "report_progress"
    }

    fn description(&self) -> &str {
        "Send a short progress update to the user who requested the change"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Progress message to send"}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let message = str_arg(args, "message")?;
        ctx.progress.report(message).await;
        Ok(ToolResult::ok("Progress reported"))
    }
}
