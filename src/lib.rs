//! # patchpilot
//!
//! Turns chat change requests into commits on a git working tree.
//!
//! ```text
//!  HTTP / chat ──► TaskQueue ──► Orchestrator ──► AgentLoop ──► ToolRegistry
//!   (api)        (single-flight)  pull/branch/     (turns)       (file, shell,
//!                                 push/clean                      search, git)
//!
//!  deploy webhook ──► webhook::correlate ──► Notifier
//! ```
//!
//! ## Task flow
//! 1. A request becomes a queued [`task::Task`] and is enqueued
//! 2. The queue runs one task at a time, racing a timeout and cancellation
//! 3. The orchestrator pulls, prepares a branch and runs the agent with retries
//! 4. The agent edits the tree through tools until the model says it is done
//! 5. Commits are pushed; the result is persisted and reported
//! 6. Deploy webhooks are matched back to the task that produced the commit
//!
//! ## Modules
//! - `task`: task entity, lifecycle and results
//! - `queue`: the scheduler
//! - `agent`: turn loop, retry controller, prompt context
//! - `tools`: the tools offered to the model
//! - `llm`: chat-completions client
//! - `git`, `storage`, `notify`: collaborators
//! - `webhook`, `api`, `config`: edges

pub mod agent;
pub mod api;
pub mod config;
pub mod git;
pub mod llm;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod storage;
pub mod task;
pub mod tools;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use config::Config;
