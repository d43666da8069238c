//! Bounded retry around whole agent executions.

use std::future::Future;

use crate::notify::ProgressReporter;
use crate::task::AgentResult;

/// Inputs of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub user_message: String,
    /// Failure text of the previous attempt; `None` on the first.
    pub error_context: Option<String>,
    /// 1-based.
    pub attempt: u32,
}

/// Run `agent_fn` up to `max_retries + 1` times, stopping at the first success.
///
/// A returned failure and an `Err` both count as a failed attempt; the failure
/// text is passed to the next attempt as `error_context`. When every attempt
/// fails the result summary names the attempt count and the last error. The
/// synthetic failure keeps the union of files touched by all attempts and the
/// last commit seen.
pub async fn run_with_retry<F, Fut>(
    user_message: &str,
    max_retries: u32,
    progress: &ProgressReporter,
    mut agent_fn: F,
) -> AgentResult
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = anyhow::Result<AgentResult>>,
{
    let max_attempts = max_retries + 1;
    let mut last_error: Option<String> = None;
    let mut partial = AgentResult::default();

    for attempt in 1..=max_attempts {
        tracing::info!(attempt, max_attempts, "Agent attempt");

        if attempt > 1 {
            progress
                .report(&format!("Retry attempt {}/{}...", attempt - 1, max_retries))
                .await;
        }

        let outcome = agent_fn(Attempt {
            user_message: user_message.to_string(),
            error_context: last_error.clone(),
            attempt,
        })
        .await;

        match outcome {
            Ok(result) if result.success => return result,
            Ok(result) => {
                tracing::warn!(attempt, error = %result.summary, "Agent attempt failed");
                partial.files_changed.extend(result.files_changed);
                if result.commit_hash.is_some() {
                    partial.commit_hash = result.commit_hash;
                }
                last_error = Some(result.summary);
            }
            Err(e) => {
                tracing::error!(attempt, "Agent attempt errored: {:#}", e);
                last_error = Some(e.to_string());
            }
        }
    }

    AgentResult {
        success: false,
        summary: format!(
            "Failed after {} attempts. Last error: {}",
            max_attempts,
            last_error.as_deref().unwrap_or("unknown")
        ),
        ..partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingNotifier;
    use std::sync::{Arc, Mutex};

    fn reporter() -> (ProgressReporter, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (
            ProgressReporter::new(notifier.clone(), "chat-1", "t-1".into()),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_always_failing_runs_max_plus_one() {
        let (progress, notifier) = reporter();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let result = run_with_retry("make it blue", 2, &progress, |attempt| {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(attempt.clone());
                Ok(AgentResult::failure(format!("failure {}", attempt.attempt)))
            }
        })
        .await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].error_context, None);
        assert_eq!(calls[2].error_context.as_deref(), Some("failure 2"));
        assert!(!result.success);
        assert!(result.summary.contains("3 attempts"));
        assert_eq!(result.summary, "Failed after 3 attempts. Last error: failure 3");
        assert_eq!(
            notifier.texts(),
            vec!["Retry attempt 1/2...", "Retry attempt 2/2..."]
        );
    }

    #[tokio::test]
    async fn test_error_then_success_threads_context() {
        let (progress, _) = reporter();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let result = run_with_retry("fix footer", 3, &progress, |attempt| {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(attempt.clone());
                if attempt.attempt == 1 {
                    anyhow::bail!("build failed");
                }
                Ok(AgentResult {
                    success: true,
                    summary: "Fixed".to_string(),
                    ..Default::default()
                })
            }
        })
        .await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].error_context.as_deref(), Some("build failed"));
        assert_eq!(calls[1].user_message, "fix footer");
        assert!(result.success);
        assert_eq!(result.summary, "Fixed");
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let (progress, notifier) = reporter();
        let mut count = 0;

        let result = run_with_retry("x", 0, &progress, |_| {
            count += 1;
            async { Ok(AgentResult::failure("nope")) }
        })
        .await;

        assert_eq!(count, 1);
        assert_eq!(result.summary, "Failed after 1 attempts. Last error: nope");
        assert!(notifier.texts().is_empty());
    }

    #[tokio::test]
    async fn test_partial_progress_survives_failure() {
        let (progress, _) = reporter();

        let result = run_with_retry("x", 1, &progress, |attempt| async move {
            let mut failed = AgentResult::failure("max turns");
            failed
                .files_changed
                .insert(format!("file{}.css", attempt.attempt));
            Ok(failed)
        })
        .await;

        assert_eq!(result.files_changed.len(), 2);
        assert!(result.files_changed.contains("file1.css"));
    }
}
