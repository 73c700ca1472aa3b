//! Webhook request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pressable option attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    /// Sent back as the callback of the next inbound message
    pub callback: String,
}

/// What the chat sees: one message per inbound turn, edited in place while
/// later renders of that turn update it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message_id: String,
    pub chat_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
    /// Bumped on every edit
    pub revision: u32,
    pub edited: bool,
    pub sent_at: DateTime<Utc>,
}

/// Inbound message posted to the webhook
#[derive(Debug, Default, Deserialize)]
pub struct MessageRequest {
    pub text: Option<String>,
    pub callback: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub chat_id: String,
    pub messages: Vec<OutgoingMessage>,
    /// False when the wait for quiet was cut short
    pub settled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
