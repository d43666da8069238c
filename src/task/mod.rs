//! Task module - the change request entity, its lifecycle and its outcome.
//!
//! Lifecycle transitions are pure functions of `(task, target)`:
//! - `queued -> running -> completed | failed`
//! - `queued -> failed` (cancelled before it started)
//!
//! Anything else is a [`TaskError`], which signals a programming error at the
//! call site rather than a runtime condition to recover from.

pub mod task;
mod result;

pub use result::{AgentResult, TaskResult};
pub use task::{Task, TaskError, TaskId, TaskStatus};
