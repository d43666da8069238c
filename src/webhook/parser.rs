//! Deploy platform payloads normalised into [`DeployEvent`].

use serde::Serialize;
use serde_json::Value;

use crate::notify::DeployStatus;

const DEFAULT_FAILURE: &str = "Build failed";
const UNKNOWN_ID: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployEvent {
    pub platform: String,
    pub deploy_id: String,
    pub status: DeployStatus,
    pub url: Option<String>,
    /// Only set for failures.
    pub error: Option<String>,
    pub commit_hash: Option<String>,
}

/// Dispatch on the `platform` path segment. Unknown platforms yield an
/// event with status `unknown` and nothing else filled in.
pub fn parse_webhook(platform: &str, payload: &Value) -> DeployEvent {
    let event = match platform {
        "vercel" => parse_vercel(payload),
        "netlify" => parse_netlify(payload),
        "custom" => parse_custom(payload),
        other => DeployEvent {
            platform: other.to_string(),
            deploy_id: UNKNOWN_ID.to_string(),
            status: DeployStatus::Unknown,
            url: None,
            error: None,
            commit_hash: None,
        },
    };
    tracing::debug!(
        platform = %event.platform,
        status = event.status.as_str(),
        deploy_id = %event.deploy_id,
        "Parsed deploy webhook"
    );
    event
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn failure_text(status: DeployStatus, error: Option<&str>) -> Option<String> {
    (status == DeployStatus::Failure).then(|| error.unwrap_or(DEFAULT_FAILURE).to_string())
}

pub fn parse_vercel(payload: &Value) -> DeployEvent {
    let status = match payload.get("type").and_then(Value::as_str) {
        Some("deployment.succeeded" | "deployment-ready") => DeployStatus::Success,
        Some("deployment.error" | "deployment-error") => DeployStatus::Failure,
        Some("deployment.created" | "deployment") => DeployStatus::Building,
        _ => DeployStatus::Unknown,
    };
    let field = |key: &str| str_at(payload, &["payload", "deployment", key]);

    DeployEvent {
        platform: "vercel".to_string(),
        deploy_id: field("id").unwrap_or(UNKNOWN_ID).to_string(),
        status,
        url: field("url").map(|host| format!("https://{}", host)),
        error: failure_text(status, str_at(payload, &["payload", "error"])),
        commit_hash: owned(
            str_at(payload, &["payload", "deployment", "meta", "githubCommitSha"]).or_else(|| {
                str_at(payload, &["payload", "deployment", "meta", "gitlabCommitSha"])
            }),
        ),
    }
}

pub fn parse_netlify(payload: &Value) -> DeployEvent {
    let status = match payload.get("state").and_then(Value::as_str) {
        Some("ready") => DeployStatus::Success,
        Some("error") => DeployStatus::Failure,
        Some("building" | "enqueued") => DeployStatus::Building,
        _ => DeployStatus::Unknown,
    };

    DeployEvent {
        platform: "netlify".to_string(),
        deploy_id: str_at(payload, &["id"]).unwrap_or(UNKNOWN_ID).to_string(),
        status,
        url: owned(str_at(payload, &["ssl_url"]).or_else(|| str_at(payload, &["url"]))),
        error: failure_text(status, str_at(payload, &["error_message"])),
        commit_hash: owned(str_at(payload, &["commit_ref"])),
    }
}

pub fn parse_custom(payload: &Value) -> DeployEvent {
    let status = match payload.get("status").and_then(Value::as_str) {
        Some("success") => DeployStatus::Success,
        Some("failure") => DeployStatus::Failure,
        Some("building") => DeployStatus::Building,
        _ => DeployStatus::Unknown,
    };

    DeployEvent {
        platform: "custom".to_string(),
        deploy_id: str_at(payload, &["deploy_id"])
            .or_else(|| str_at(payload, &["id"]))
            .unwrap_or(UNKNOWN_ID)
            .to_string(),
        status,
        url: owned(str_at(payload, &["url"])),
        error: failure_text(status, str_at(payload, &["error"])),
        commit_hash: owned(str_at(payload, &["commit_hash"])),
    }
}
