//! Regex search and glob listing over the working tree.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::walk::{project_files, FileGlob};
use super::{str_arg, Tool, ToolContext, ToolError, ToolResult};

const MAX_MATCHES: usize = 200;

/// Search file contents with a regex.
pub struct SearchFiles;

#[async_trait]
impl Tool for SearchFiles {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search for a regex pattern across files in the project. Returns path:line:text matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "glob": {
                    "type": "string",
                    "description": "Optional glob to filter files (e.g. '*.ts')"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let pattern = str_arg(args, "pattern")?;
        let regex = Regex::new(pattern).map_err(|e| ToolError::InvalidArgument {
            name: "pattern",
            reason: e.to_string(),
        })?;
        let filter = match args.get("glob").and_then(Value::as_str) {
            Some(glob) if !glob.is_empty() => Some(FileGlob::new(glob)?),
            _ => None,
        };

        let root = ctx.root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for rel in project_files(&root) {
                if filter.as_ref().is_some_and(|g| !g.is_match(&rel)) {
                    continue;
                }
                // Binary or unreadable files are skipped.
                let Ok(content) = std::fs::read_to_string(root.join(&rel)) else {
                    continue;
                };
                for (idx, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        out.push(format!("{}:{}:{}", rel, idx + 1, line));
                        if out.len() >= MAX_MATCHES {
                            return out;
                        }
                    }
                }
            }
            out
        })
        .await?;

        if matches.is_empty() {
            return Ok(ToolResult::ok("No matches found"));
        }
        Ok(ToolResult::ok(matches.join("\n")))
    }
}

/// List files matching a glob.
pub struct GlobFiles;

#[async_trait]
impl Tool for GlobFiles {
    fn name(&self) -> &str {
        "glob_files"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g. 'src/**/*.ts' or '*.css')"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let glob = FileGlob::new(str_arg(args, "pattern")?)?;
        let root = ctx.root.clone();

        let files: Vec<String> = tokio::task::spawn_blocking(move || {
            project_files(&root)
                .into_iter()
                .filter(|rel| glob.is_match(rel))
                .take(MAX_MATCHES)
                .collect()
        })
        .await?;

        if files.is_empty() {
            return Ok(ToolResult::ok("No files found"));
        }
        Ok(ToolResult::ok(files.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tool_context;
    use tempfile::tempdir;

    fn seed(root: &std::path::Path) {
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/app.ts"), "const title = 'Home';\nexport default title;\n").unwrap();
        std::fs::write(root.join("src/app.css"), ".title { color: red; }\n").unwrap();
        std::fs::write(root.join("README.md"), "# Home page\n").unwrap();
    }

    #[tokio::test]
    async fn test_search_with_and_without_glob() {
        let temp = tempdir().unwrap();
        seed(temp.path());
        let (ctx, _) = tool_context(temp.path());

        let all = SearchFiles
            .execute(&json!({"pattern": "title"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            all.content,
            "src/app.css:1:.title { color: red; }\nsrc/app.ts:1:const title = 'Home';\nsrc/app.ts:2:export default title;"
        );

        let ts_only = SearchFiles
            .execute(&json!({"pattern": "title", "glob": "*.ts"}), &ctx)
            .await
            .unwrap();
        assert_eq!(ts_only.content.lines().count(), 2);

        let none = SearchFiles
            .execute(&json!({"pattern": "footer"}), &ctx)
            .await
            .unwrap();
        assert_eq!(none, ToolResult::ok("No matches found"));
    }

    #[tokio::test]
    async fn test_invalid_regex_is_an_error() {
        let temp = tempdir().unwrap();
        let (ctx, _) = tool_context(temp.path());

        let err = SearchFiles
            .execute(&json!({"pattern": "("}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid 'pattern' argument"));
    }

    #[tokio::test]
    async fn test_glob_files() {
        let temp = tempdir().unwrap();
        seed(temp.path());
        let (ctx, _) = tool_context(temp.path());

        let css = GlobFiles
            .execute(&json!({"pattern": "*.css"}), &ctx)
            .await
            .unwrap();
        assert_eq!(css, ToolResult::ok("src/app.css"));

        let nested = GlobFiles
            .execute(&json!({"pattern": "src/**"}), &ctx)
            .await
            .unwrap();
        assert_eq!(nested.content, "src/app.css\nsrc/app.ts");

        let none = GlobFiles
            .execute(&json!({"pattern": "*.rs"}), &ctx)
            .await
            .unwrap();
        assert_eq!(none, ToolResult::ok("No files found"));
    }
}
