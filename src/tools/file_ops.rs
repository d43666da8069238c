//! File operation tools: read, write and edit files inside the working tree.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{str_arg, Tool, ToolContext, ToolError, ToolResult};

/// Read the contents of a file.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path. Use this to inspect files before editing them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let path = str_arg(args, "path")?;
        let full_path = ctx.resolve(path)?;

        if !full_path.is_file() {
            anyhow::bail!("File not found: {}", path);
        }

        let content = tokio::fs::read_to_string(&full_path).await?;
        Ok(ToolResult::ok(content))
    }
}

/// Write content to a file (create or overwrite).
pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if it doesn't exist. Creates parent directories as needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "The full content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let path = str_arg(args, "path")?;
        let content = str_arg(args, "content")?;
        let full_path = ctx.resolve(path)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;

        tracing::debug!(path = %path, bytes = content.len(), "Wrote file");
        Ok(ToolResult::ok(format!("Written to {}", path)))
    }
}

/// Replace one unique exact substring in a file.
pub struct EditFile;

#[async_trait]
impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file with new content. The old_string must be unique in the file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement string"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let path = str_arg(args, "path")?;
        let old = str_arg(args, "old_string")?;
        let new = str_arg(args, "new_string")?;
        if old.is_empty() {
            return Err(ToolError::InvalidArgument {
                name: "old_string",
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let full_path = ctx.resolve(path)?;
        if !full_path.is_file() {
            anyhow::bail!("File not found: {}", path);
        }

        let content = tokio::fs::read_to_string(&full_path).await?;
        match content.matches(old).count() {
            0 => return Ok(ToolResult::error("old_string not found in file")),
            1 => {}
            n => {
                return Ok(ToolResult::error(format!(
                    "old_string found {} times, must be unique",
                    n
                )))
            }
        }

        tokio::fs::write(&full_path, content.replacen(old, new, 1)).await?;
        Ok(ToolResult::ok(format!("Edited {}", path)))
    }
}
