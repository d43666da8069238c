//! Shell command execution tool.
//!
//! Commands run through `/bin/sh -c` with the working tree as cwd. The child
//! is killed when the call is abandoned (timeout, or the task future dropped).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{str_arg, Tool, ToolContext, ToolResult};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_OUTPUT_CHARS: usize = 10_000;
const STDERR_SEPARATOR: &str = "\n---stderr---\n";

/// Patterns refused outright, checked at the start of the command and after
/// common wrappers.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("rm -rf /", "This would destroy the entire system"),
    ("rm -rf /*", "This would destroy the entire system"),
    ("rm -rf ~", "This would delete the home directory"),
    ("> /dev/", "Writing to device files is blocked"),
    ("dd if=/dev/", "Direct disk operations are blocked"),
    ("mkfs", "Formatting filesystems is blocked"),
    ("find / ", "Use a path inside the project instead of /"),
    ("grep -r /", "Use a path inside the project instead of /"),
];

const WRAPPERS: &[&str] = &["sudo ", "time ", "nice ", "nohup "];

fn validate_command(cmd: &str) -> Result<(), String> {
    let mut candidates = vec![cmd.trim()];
    for wrapper in WRAPPERS {
        if let Some(rest) = cmd.trim().strip_prefix(wrapper) {
            candidates.push(rest.trim_start());
        }
    }

    for (pattern, reason) in DANGEROUS_PATTERNS {
        if candidates.iter().any(|c| c.starts_with(pattern)) {
            return Err(format!(
                "Blocked dangerous command pattern '{}'. {}",
                pattern, reason
            ));
        }
    }
    Ok(())
}

/// Lossy UTF-8 with control characters other than whitespace removed.
fn sanitize_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || !c.is_control())
        .collect()
}

fn truncate(mut text: String) -> String {
    if let Some((idx, _)) = text.char_indices().nth(MAX_OUTPUT_CHARS) {
        text.truncate(idx);
        text.push_str("\n... [output truncated]");
    }
    text
}

fn combine(stdout: &str, stderr: &str) -> String {
    [stdout, stderr]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(STDERR_SEPARATOR)
}

/// Run a shell command in the project root.
pub struct RunBash;

#[async_trait]
impl Tool for RunBash {
    fn name(&self) -> &str {
        "run_bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the project root and return stdout/stderr. Use for build, test, lint, etc."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in milliseconds (default: 30000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> anyhow::Result<ToolResult> {
        let command = str_arg(args, "command")?;
        let timeout_ms = args
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|ms| *ms > 0.0)
            .map(|ms| ms as u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        if let Err(msg) = validate_command(command) {
            tracing::warn!(command = %command, "Blocked dangerous command");
            return Ok(ToolResult::error(msg));
        }

        tracing::info!(command = %command, timeout_ms, "Executing command");

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to execute command: {}", e))?;

        let output = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                return Ok(ToolResult::error(format!(
                    "Command timed out after {} ms",
                    timeout_ms
                )))
            }
        };

        let combined = truncate(combine(
            &sanitize_output(&output.stdout),
            &sanitize_output(&output.stderr),
        ));

        if output.status.success() {
            if combined.is_empty() {
                return Ok(ToolResult::ok("(no output)"));
            }
            return Ok(ToolResult::ok(combined));
        }

        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::debug!(command = %command, exit_code = %code, "Command failed");
        Ok(ToolResult::error(format!("Exit code {}\n{}", code, combined)))
    }
}
