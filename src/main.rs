//! patchpilot server binary.
//!
//! Wires storage, git, the agent loop and the orchestrator behind the task
//! queue, then serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use patchpilot::agent::AgentLoop;
use patchpilot::api::{self, AppState};
use patchpilot::config::Config;
use patchpilot::git::{GitAuthor, GitManager};
use patchpilot::llm::HttpLlmClient;
use patchpilot::notify::{HttpNotifier, LogNotifier, Notifier};
use patchpilot::orchestrator::Orchestrator;
use patchpilot::queue::TaskQueue;
use patchpilot::storage::{MemoryStorage, SqliteStorage, Storage};

fn open_storage(config: &Config) -> Arc<dyn Storage> {
    if let Some(dir) = config.database_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Cannot create {}: {}", dir.display(), e);
        }
    }
    match SqliteStorage::open(&config.database_path) {
        Ok(storage) => {
            tracing::info!(path = %config.database_path.display(), "Using SQLite storage");
            Arc::new(storage)
        }
        Err(e) => {
            tracing::warn!("SQLite unavailable ({}), using in-memory storage", e);
            Arc::new(MemoryStorage::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("patchpilot=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        model = %config.llm.model,
        repo = %config.repo.local_path.display(),
        strategy = config.repo.branch_strategy.as_str(),
        "Starting patchpilot"
    );

    let storage = open_storage(&config);

    let git = GitManager::new(&config.repo.local_path, config.repo.branch_strategy)
        .with_author(GitAuthor::new(
            config.repo.author_name.clone(),
            config.repo.author_email.clone(),
        ))
        .with_ssh_key(config.repo.ssh_key.clone());
    match config.repo.url.as_deref() {
        Some(url) => {
            git.ensure_repo(url).await.context("Repository setup failed")?;
        }
        None if !config.repo.local_path.join(".git").exists() => {
            tracing::warn!("REPO_URL is not set and {} is not a git repository", config.repo.local_path.display());
        }
        None => {}
    }
    let git = Arc::new(git);

    let notifier: Arc<dyn Notifier> = match &config.notify_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let llm = Arc::new(HttpLlmClient::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
    ));
    let agent = AgentLoop::new(llm, config.llm.model.clone())
        .with_max_turns(config.agent.max_turns)
        .with_max_tokens(config.llm.max_tokens);

    let orchestrator = Orchestrator::new(
        storage.clone(),
        git,
        Arc::new(agent),
        notifier.clone(),
        config.repo.local_path.clone(),
    )
    .with_max_retries(config.agent.max_retries);

    let queue = TaskQueue::with_storage(config.agent.task_timeout, storage.clone());
    queue.on_task(Arc::new(orchestrator));
    queue.start();

    let state = Arc::new(AppState {
        storage,
        queue: queue.clone(),
        notifier,
        webhook_secret: config.webhook_secret.clone(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_queue = queue.clone();
    api::serve(state, &addr, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
        shutdown_queue.stop();
    })
    .await
}
