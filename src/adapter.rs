//! Messaging platform adapter contract
//!
//! An adapter decodes inbound chat events into route paths and turns a
//! committed virtual tree into the platform's outgoing message.

use crate::engine::{ConversationSession, CoreHandle};
use crate::route::Menu;
use crate::vdom::Node;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Adapter error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Decode, message)
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Delivery, message)
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Credentials, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Closed, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// Inbound payload could not be understood
    Decode,
    /// Platform rejected or timed out an outgoing write
    Delivery,
    /// Missing or rejected platform credentials
    Credentials,
    /// The inbound channel or the adapter has shut down
    Closed,
}

impl AdapterErrorKind {
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Decode | Self::Delivery)
    }
}

/// Who a session renders for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatIdentity {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// One inbound chat event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Unique per inbound turn
    #[serde(default = "new_event_id")]
    pub event_id: String,
    pub chat: ChatIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Payload of a pressed button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(chat: ChatIdentity, text: Option<String>, callback: Option<String>) -> Self {
        Self {
            event_id: new_event_id(),
            chat,
            text,
            callback,
            received_at: Utc::now(),
        }
    }

    pub fn text(chat: ChatIdentity, text: impl Into<String>) -> Self {
        Self::new(chat, Some(text.into()), None)
    }

    pub fn callback(chat: ChatIdentity, data: impl Into<String>) -> Self {
        Self::new(chat, None, Some(data.into()))
    }
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// What `decode_route` is asked to interpret
#[derive(Debug, Clone)]
pub enum RouteInput {
    Event(InboundEvent),
    /// A route already encoded by the application, e.g. from `redirect_to`
    Encoded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectOptions {
    pub should_render: bool,
    pub should_add_to_history: bool,
}

impl RedirectOptions {
    /// Record history and render: what inbound events use
    pub fn navigate() -> Self {
        Self {
            should_render: true,
            should_add_to_history: true,
        }
    }

    /// Change the stored route only
    pub fn silent() -> Self {
        Self {
            should_render: false,
            should_add_to_history: false,
        }
    }
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self::navigate()
    }
}

/// Where an adapter pushes inbound events once the core has subscribed
#[derive(Debug, Clone)]
pub struct InboundSink {
    tx: mpsc::Sender<InboundEvent>,
}

impl InboundSink {
    pub fn new(tx: mpsc::Sender<InboundEvent>) -> Self {
        Self { tx }
    }

    pub async fn deliver(&self, event: InboundEvent) -> Result<(), AdapterError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AdapterError::closed("inbound channel closed"))
    }
}

#[async_trait]
pub trait Adapter: Send + Sync + Sized + 'static {
    /// Platform-specific representation of an outgoing message
    type Element: Send + Sync + 'static;

    async fn init(&self, core: CoreHandle<Self>) -> Result<(), AdapterError>;

    async fn on_destroy(&self) -> Result<(), AdapterError>;

    /// Stable identity under which a session's route is stored
    fn route_key(&self, session: &ConversationSession) -> String;

    /// A path for the router, or `None` when the input is not a navigation
    async fn decode_route(&self, input: &RouteInput) -> Result<Option<String>, AdapterError>;

    async fn adapt(
        &self,
        session: &ConversationSession,
        tree: &Node,
        is_update: bool,
    ) -> Result<Self::Element, AdapterError>;

    async fn set_menus(&self, menus: &[Menu]) -> Result<(), AdapterError>;

    async fn component_on_mount(&self, session: &ConversationSession) -> Result<(), AdapterError>;

    /// Start delivering inbound events into `sink`
    fn subscribe_to_message_changed(&self, sink: InboundSink);

    /// Webhook-style delivery of one event
    async fn handle_message_update(&self, event: InboundEvent) -> Result<(), AdapterError>;
}
