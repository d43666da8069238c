//! Configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `LLM_API_KEY` | required |
//! | `LLM_MODEL` | `anthropic/claude-sonnet-4.5` |
//! | `LLM_BASE_URL` | OpenRouter chat completions |
//! | `LLM_MAX_TOKENS` | 8192 |
//! | `REPO_URL` | unset (no clone) |
//! | `REPO_LOCAL_PATH` | `./repos/default` |
//! | `REPO_BRANCH_STRATEGY` | `direct` |
//! | `GIT_AUTHOR_NAME` / `GIT_AUTHOR_EMAIL` / `GIT_SSH_KEY` | unset |
//! | `AGENT_MAX_RETRIES` | 3 |
//! | `AGENT_TASK_TIMEOUT` | 300000 (ms) |
//! | `AGENT_MAX_TURNS` | 50 |
//! | `DEPLOY_WEBHOOK_SECRET` | unset (signatures not checked) |
//! | `NOTIFY_URL` | unset (log only) |
//! | `DATABASE_PATH` | `data/tasks.sqlite` |
//! | `HOST` / `PORT` | `0.0.0.0` / 4000 |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::git::BranchStrategy;
use crate::llm::DEFAULT_API_URL;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub url: Option<String>,
    pub local_path: PathBuf,
    pub branch_strategy: BranchStrategy,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_retries: u32,
    pub task_timeout: Duration,
    pub max_turns: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub repo: RepoConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    /// Empty disables signature checks.
    pub webhook_secret: String,
    pub notify_url: Option<String>,
    pub database_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let branch_strategy = match env.get("REPO_BRANCH_STRATEGY") {
            None => BranchStrategy::Direct,
            Some(raw) => BranchStrategy::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "REPO_BRANCH_STRATEGY",
                value: raw,
                reason: "expected direct or feature-branch".to_string(),
            })?,
        };

        let timeout_ms: u64 = env.parse("AGENT_TASK_TIMEOUT", 300_000)?;

        Ok(Self {
            llm: LlmConfig {
                api_key: env.get("LLM_API_KEY").ok_or(ConfigError::Missing("LLM_API_KEY"))?,
                model: env.string("LLM_MODEL", "anthropic/claude-sonnet-4.5"),
                base_url: env.string("LLM_BASE_URL", DEFAULT_API_URL),
                max_tokens: env.parse("LLM_MAX_TOKENS", 8192)?,
            },
            repo: RepoConfig {
                url: env.get("REPO_URL"),
                local_path: PathBuf::from(env.string("REPO_LOCAL_PATH", "./repos/default")),
                branch_strategy,
                author_name: env.get("GIT_AUTHOR_NAME"),
                author_email: env.get("GIT_AUTHOR_EMAIL"),
                ssh_key: env.get("GIT_SSH_KEY"),
            },
            agent: AgentConfig {
                max_retries: env.parse("AGENT_MAX_RETRIES", 3)?,
                task_timeout: Duration::from_millis(timeout_ms),
                max_turns: env.parse("AGENT_MAX_TURNS", 50)?,
            },
            server: ServerConfig {
                host: env.string("HOST", "0.0.0.0"),
                port: env.parse("PORT", 4000)?,
            },
            webhook_secret: env.get("DEPLOY_WEBHOOK_SECRET").unwrap_or_default(),
            notify_url: env.get("NOTIFY_URL"),
            database_path: PathBuf::from(env.string("DATABASE_PATH", "data/tasks.sqlite")),
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name: key,
                reason: e.to_string(),
                value: raw,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("LLM_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.model, "anthropic/claude-sonnet-4.5");
        assert_eq!(config.llm.base_url, DEFAULT_API_URL);
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.repo.local_path, PathBuf::from("./repos/default"));
        assert_eq!(config.repo.branch_strategy, BranchStrategy::Direct);
        assert_eq!(config.repo.url, None);
        assert_eq!(config.agent.max_retries, 3);
        assert_eq!(config.agent.task_timeout, Duration::from_secs(300));
        assert_eq!(config.agent.max_turns, 50);
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.webhook_secret, "");
        assert_eq!(config.database_path, PathBuf::from("data/tasks.sqlite"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("LLM_API_KEY", "k"),
            ("REPO_BRANCH_STRATEGY", "feature-branch"),
            ("AGENT_TASK_TIMEOUT", "1500"),
            ("PORT", "8080"),
            ("GIT_SSH_KEY", "/keys/id_ed25519"),
            ("NOTIFY_URL", "  "),
        ])
        .unwrap();
        assert_eq!(config.repo.branch_strategy, BranchStrategy::FeatureBranch);
        assert_eq!(config.agent.task_timeout, Duration::from_millis(1500));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.repo.ssh_key.as_deref(), Some("/keys/id_ed25519"));
        assert_eq!(config.notify_url, None);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("LLM_API_KEY"));

        let err = load(&[("LLM_API_KEY", "k"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));

        let err = load(&[("LLM_API_KEY", "k"), ("REPO_BRANCH_STRATEGY", "trunk")]).unwrap_err();
        assert!(err.to_string().contains("REPO_BRANCH_STRATEGY"));
    }
}
