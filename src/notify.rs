//! Progress and result notifications.
//!
//! The chat front end lives outside this crate; everything here talks to it
//! through the [`Notifier`] trait. Two implementations ship:
//! - [`LogNotifier`]: writes notifications to the tracing log
//! - [`HttpNotifier`]: POSTs them as JSON to a configured URL

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::task::{TaskId, TaskResult};

/// Deploy status as reported by the deploy platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Success,
    Failure,
    Building,
    Unknown,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Building => "building",
            Self::Unknown => "unknown",
        }
    }
}

/// A deploy event that was correlated back to the task that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployNotification {
    pub task_origin_ref: String,
    pub task_id: TaskId,
    pub status: DeployStatus,
    pub url: Option<String>,
    pub error: Option<String>,
}

/// Outbound notification channel.
///
/// Delivery is best-effort: implementations log failures instead of returning them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a free-form message to the conversation identified by `chat_ref`.
    async fn notify(&self, chat_ref: &str, message: &str);

    /// Report a correlated deploy event.
    async fn deploy_event(&self, event: &DeployNotification) {
        self.notify(&event.task_origin_ref, &format_deploy_event(event))
            .await;
    }
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, chat_ref: &str, message: &str) {
        tracing::info!(chat_ref = %chat_ref, "{}", message);
    }
}

/// Notifier that POSTs JSON payloads to a webhook endpoint.
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    async fn post(&self, body: serde_json::Value) {
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(url = %self.url, status = %resp.status(), "Notification rejected");
            }
            Err(e) => {
                tracing::warn!(url = %self.url, "Failed to send notification: {}", e);
            }
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, chat_ref: &str, message: &str) {
        self.post(json!({
            "type": "message",
            "chat_ref": chat_ref,
            "text": message,
        }))
        .await;
    }

    async fn deploy_event(&self, event: &DeployNotification) {
        self.post(json!({
            "type": "deploy",
            "chat_ref": event.task_origin_ref,
            "task_id": event.task_id,
            "status": event.status,
            "url": event.url,
            "error": event.error,
            "text": format_deploy_event(event),
        }))
        .await;
    }
}

/// Progress channel bound to one task's originating conversation.
#[derive(Clone)]
pub struct ProgressReporter {
    notifier: Arc<dyn Notifier>,
    chat_ref: String,
    task_id: TaskId,
}

impl ProgressReporter {
    pub fn new(notifier: Arc<dyn Notifier>, chat_ref: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            notifier,
            chat_ref: chat_ref.into(),
            task_id,
        }
    }

    pub async fn report(&self, message: &str) {
        tracing::info!(task_id = %self.task_id, progress = %message, "Task progress");
        self.notifier.notify(&self.chat_ref, message).await;
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

/// Render a terminal task result for the user.
pub fn format_task_result(result: &TaskResult) -> String {
    if !result.success {
        let error = result.error.as_deref().unwrap_or("Unknown error");
        return ["❌ Task failed", "", error].join("\n");
    }

    let mut lines = vec![
        "✅ Changes applied".to_string(),
        String::new(),
        result.summary.clone(),
    ];

    if !result.files_changed.is_empty() {
        lines.push(String::new());
        lines.push("Files changed:".to_string());
        for file in &result.files_changed {
            lines.push(format!("  • {}", file));
        }
    }

    if let Some(hash) = &result.commit_hash {
        let short: String = hash.chars().take(8).collect();
        lines.push(String::new());
        lines.push(format!("Commit: {}", short));
    }

    lines.join("\n")
}

pub fn format_error(message: &str) -> String {
    format!("❌ Error: {}", message)
}

pub fn format_deploy_event(event: &DeployNotification) -> String {
    match event.status {
        DeployStatus::Success => match &event.url {
            Some(url) => format!("Deploy succeeded!\n{}", url),
            None => "Deploy succeeded!".to_string(),
        },
        DeployStatus::Failure => format!(
            "Deploy failed: {}",
            event.error.as_deref().unwrap_or("Unknown error")
        ),
        DeployStatus::Building => "Deploy in progress...".to_string(),
        DeployStatus::Unknown => format!("Deploy status: {}", event.status.as_str()),
    }
}
