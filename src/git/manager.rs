//! `git` CLI implementation of [`GitOps`].

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::Instrument;

use super::{task_branch_name, BranchStrategy, GitError, GitOps, GitResult};
use crate::task::TaskId;

/// Commit author override. Both fields must be set to take effect.
#[derive(Debug, Clone, Default)]
pub struct GitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl GitAuthor {
    pub fn new(name: Option<String>, email: Option<String>) -> Self {
        Self { name, email }
    }
}

/// Git operations on one local working tree.
#[derive(Debug, Clone)]
pub struct GitManager {
    path: PathBuf,
    strategy: BranchStrategy,
    author: GitAuthor,
    ssh_key: Option<String>,
    span: tracing::Span,
}

impl GitManager {
    pub fn new(path: impl Into<PathBuf>, strategy: BranchStrategy) -> Self {
        let path = path.into();
        let span = tracing::info_span!("git", path = %path.display());
        Self {
            path,
            strategy,
            author: GitAuthor::default(),
            ssh_key: None,
            span,
        }
    }

    pub fn with_author(mut self, author: GitAuthor) -> Self {
        self.author = author;
        self
    }

    /// Use a specific private key for fetch/push (`GIT_SSH_COMMAND`).
    ///
    /// An empty key means plain `ssh` with the user's config ignored.
    pub fn with_ssh_key(mut self, key: Option<String>) -> Self {
        self.ssh_key = key;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone `remote` into the working tree path unless a repository is already there.
    ///
    /// Returns `true` when a clone happened.
    pub async fn ensure_repo(&self, remote: &str) -> GitResult<bool> {
        if self.path.join(".git").exists() {
            tracing::debug!(parent: &self.span, "Repository already present");
            return Ok(false);
        }

        tracing::info!(parent: &self.span, remote = %remote, "Cloning repository");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GitError::Setup(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let target = self.path.to_string_lossy().to_string();
        let mut cmd = Command::new("git");
        cmd.args(["clone", remote, &target]);
        self.apply_ssh_config(&mut cmd);
        let output = cmd.output().await.map_err(|source| GitError::Spawn {
            command: "clone".to_string(),
            source,
        })?;
        check("clone", output)?;
        Ok(true)
    }

    fn ssh_command(&self) -> Option<String> {
        match self.ssh_key.as_deref() {
            Some("") => Some("ssh -F /dev/null".to_string()),
            Some(key) => Some(format!("ssh -i {} -o IdentitiesOnly=yes", key)),
            None => None,
        }
    }

    fn apply_ssh_config(&self, cmd: &mut Command) {
        if let Some(ssh_cmd) = self.ssh_command() {
            cmd.env("GIT_SSH_COMMAND", ssh_cmd);
        }
    }

    async fn raw(&self, args: &[&str], remote: bool) -> GitResult<Output> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.path).args(args);
        if remote {
            self.apply_ssh_config(&mut cmd);
        }
        cmd.output().await.map_err(|source| GitError::Spawn {
            command: args.first().copied().unwrap_or_default().to_string(),
            source,
        })
    }

    /// Run a local git command and return trimmed stdout.
    async fn run(&self, args: &[&str]) -> GitResult<String> {
        let output = self.raw(args, false).await?;
        check(args.first().copied().unwrap_or_default(), output)
    }

    async fn run_remote(&self, args: &[&str]) -> GitResult<String> {
        let output = self.raw(args, true).await?;
        check(args.first().copied().unwrap_or_default(), output)
    }

    async fn current_branch(&self) -> GitResult<String> {
        self.run(&["symbolic-ref", "--short", "HEAD"]).await
    }

    async fn head(&self) -> GitResult<String> {
        self.run(&["rev-parse", "HEAD"]).await
    }
}

fn check(command: &str, output: Output) -> GitResult<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(GitError::Command {
            command: command.to_string(),
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[async_trait]
impl GitOps for GitManager {
    async fn pull(&self) -> GitResult<()> {
        async {
            tracing::info!("Pulling latest changes");
            self.run_remote(&["pull", "--ff-only"]).await.map(|_| ())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn prepare_branch(&self, task_id: &TaskId) -> GitResult<String> {
        async {
            match self.strategy {
                BranchStrategy::Direct => {
                    let branch = match self.current_branch().await {
                        Ok(branch) => branch,
                        Err(e) => {
                            tracing::warn!("Cannot resolve current branch, assuming main: {}", e);
                            "main".to_string()
                        }
                    };
                    tracing::info!(branch = %branch, "Using direct strategy on current branch");
                    Ok(branch)
                }
                BranchStrategy::FeatureBranch => {
                    let branch = task_branch_name(task_id);
                    tracing::info!(branch = %branch, "Creating feature branch");
                    self.run(&["checkout", "-b", &branch])
                        .await
                        .map_err(|e| GitError::Branch {
                            branch: branch.clone(),
                            reason: e.to_string(),
                        })?;
                    Ok(branch)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn commit_all(&self, message: &str) -> GitResult<Option<String>> {
        async {
            self.run(&["add", "-A"]).await?;

            let status = self.run(&["status", "--porcelain"]).await?;
            if status.is_empty() {
                tracing::info!("Nothing to commit");
                return Ok(None);
            }

            let mut args: Vec<String> = Vec::new();
            if let (Some(name), Some(email)) = (&self.author.name, &self.author.email) {
                args.extend([
                    "-c".to_string(),
                    format!("user.name={}", name),
                    "-c".to_string(),
                    format!("user.email={}", email),
                ]);
            }
            args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let output = self.raw(&args, false).await?;
            check("commit", output)?;

            let hash = self.head().await?;
            tracing::info!(hash = %hash, message = %message, "Committed changes");
            Ok(Some(hash))
        }
        .instrument(self.span.clone())
        .await
    }

    async fn push(&self, branch: &str) -> GitResult<()> {
        async {
            tracing::info!(branch = %branch, "Pushing branch to remote");
            self.run_remote(&["push", "origin", branch]).await.map(|_| ())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn rollback(&self) -> GitResult<String> {
        async {
            let last = self.head().await.map_err(|_| GitError::NothingToRollback)?;
            self.run(&["revert", "--no-edit", &last]).await?;
            let revert = self.head().await?;
            tracing::info!(reverted = %last, new_commit = %revert, "Rollback complete");
            Ok(revert)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn clean(&self) -> GitResult<()> {
        async {
            tracing::info!("Cleaning uncommitted changes");
            self.run(&["checkout", "--", "."]).await?;
            self.run(&["clean", "-fd"]).await?;
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn diff(&self) -> GitResult<String> {
        self.run(&["diff"]).await
    }
}
