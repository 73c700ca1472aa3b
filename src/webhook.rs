//! HTTP webhook front end
//!
//! Chat platforms (or a test client) post inbound messages; the reply is the
//! chat's outbox once rendering has gone quiet.

mod adapter;
mod handlers;
mod types;

pub use adapter::{decode_command, render_message, WebhookAdapter};
pub use handlers::{create_router, AppError, TOKEN_HEADER};
pub use types::*;

use crate::engine::Core;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core<WebhookAdapter>>,
    pub token: Arc<String>,
}

impl AppState {
    pub fn new(core: Arc<Core<WebhookAdapter>>, token: impl Into<String>) -> Self {
        Self {
            core,
            token: Arc::new(token.into()),
        }
    }
}
