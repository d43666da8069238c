//! HTTP API: task submission and inspection plus the deploy webhook endpoint.

mod routes;
mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
