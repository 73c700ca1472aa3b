//! HTTP webhook adapter
//!
//! Inbound messages arrive over HTTP; outgoing messages are kept in a
//! per-chat outbox that clients read back.

use super::types::{Button, OutgoingMessage};
use crate::adapter::{Adapter, AdapterError, InboundEvent, InboundSink, RouteInput};
use crate::engine::{ConversationSession, CoreHandle};
use crate::route::Menu;
use crate::vdom::Node;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Messages kept per chat
const MAX_OUTBOX: usize = 50;

/// Element kinds rendered on a line of their own
const BLOCK_KINDS: &[&str] = &[
    "page", "div", "p", "section", "h1", "h2", "h3", "li", "ul", "ol", "br",
];

#[derive(Default)]
pub struct WebhookAdapter {
    outboxes: Mutex<HashMap<String, Vec<OutgoingMessage>>>,
    menus: Mutex<Vec<Menu>>,
    sink: Mutex<Option<InboundSink>>,
    core: Mutex<Option<CoreHandle<WebhookAdapter>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WebhookAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self, chat_id: &str) -> Vec<OutgoingMessage> {
        locked(&self.outboxes)
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn menus(&self) -> Vec<Menu> {
        locked(&self.menus).clone()
    }

    pub fn core(&self) -> Option<CoreHandle<WebhookAdapter>> {
        locked(&self.core).clone()
    }

    /// Edit the message with the same id in place, or send a new one
    fn deliver(&self, message: OutgoingMessage) -> OutgoingMessage {
        let mut outboxes = locked(&self.outboxes);
        let outbox = outboxes.entry(message.chat_id.clone()).or_default();
        if let Some(existing) = outbox
            .iter_mut()
            .rev()
            .find(|m| m.message_id == message.message_id)
        {
            let edited = OutgoingMessage {
                revision: existing.revision + 1,
                edited: true,
                ..message
            };
            *existing = edited.clone();
            return edited;
        }

        let sent = OutgoingMessage {
            revision: 0,
            edited: false,
            ..message
        };
        outbox.push(sent.clone());
        if outbox.len() > MAX_OUTBOX {
            let excess = outbox.len() - MAX_OUTBOX;
            outbox.drain(..excess);
        }
        sent
    }
}

/// One message per inbound turn; renders before the first turn share the
/// session's message.
fn message_id(session: &ConversationSession) -> String {
    session
        .last_inbound()
        .map(|event| event.event_id.clone())
        .unwrap_or_else(|| session.session_id().to_string())
}

#[async_trait]
impl Adapter for WebhookAdapter {
    type Element = OutgoingMessage;

    async fn init(&self, core: CoreHandle<Self>) -> Result<(), AdapterError> {
        *locked(&self.core) = Some(core);
        tracing::info!("Webhook adapter attached");
        Ok(())
    }

    async fn on_destroy(&self) -> Result<(), AdapterError> {
        locked(&self.sink).take();
        locked(&self.core).take();
        tracing::info!("Webhook adapter released");
        Ok(())
    }

    fn route_key(&self, session: &ConversationSession) -> String {
        session.chat().chat_id.clone()
    }

    async fn decode_route(&self, input: &RouteInput) -> Result<Option<String>, AdapterError> {
        match input {
            RouteInput::Encoded(route) => decode_command(route),
            RouteInput::Event(event) => match (&event.callback, &event.text) {
                (Some(callback), _) => decode_command(callback),
                (None, Some(text)) => decode_command(text),
                (None, None) => Ok(None),
            },
        }
    }

    async fn adapt(
        &self,
        session: &ConversationSession,
        tree: &Node,
        is_update: bool,
    ) -> Result<OutgoingMessage, AdapterError> {
        let (text, buttons) = render_message(tree);
        if text.is_empty() && buttons.is_empty() {
            return Err(AdapterError::delivery("refusing to send an empty message"));
        }
        let message = self.deliver(OutgoingMessage {
            message_id: message_id(session),
            chat_id: session.chat().chat_id.clone(),
            text,
            buttons,
            revision: 0,
            edited: is_update,
            sent_at: Utc::now(),
        });
        tracing::debug!(
            chat_id = %message.chat_id,
            message_id = %message.message_id,
            is_update,
            revision = message.revision,
            edited = message.edited,
            "Message delivered"
        );
        Ok(message)
    }

    async fn set_menus(&self, menus: &[Menu]) -> Result<(), AdapterError> {
        *locked(&self.menus) = menus.to_vec();
        Ok(())
    }

    async fn component_on_mount(&self, session: &ConversationSession) -> Result<(), AdapterError> {
        tracing::trace!(chat_id = %session.chat().chat_id, "Mounted");
        Ok(())
    }

    fn subscribe_to_message_changed(&self, sink: InboundSink) {
        *locked(&self.sink) = Some(sink);
    }

    async fn handle_message_update(&self, event: InboundEvent) -> Result<(), AdapterError> {
        let sink = locked(&self.sink)
            .clone()
            .ok_or_else(|| AdapterError::closed("core is not subscribed"))?;
        sink.deliver(event).await
    }
}

/// Turn a chat command into a route path.
///
/// `/start` is the root, `/users_42` is `/users/42` and a query string is
/// kept. Anything not starting with `/` is not a navigation. Words after
/// the command are ignored.
pub fn decode_command(raw: &str) -> Result<Option<String>, AdapterError> {
    let Some(command) = raw.split_whitespace().next() else {
        return Ok(None);
    };
    let Some(body) = command.strip_prefix('/') else {
        return Ok(None);
    };
    let (name, query) = match body.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (body, None),
    };

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.' | '~' | '%')))
    {
        return Err(AdapterError::decode(format!(
            "unexpected {bad:?} in command {command:?}"
        )));
    }

    let path = if name == "start" || name.is_empty() {
        "/".to_string()
    } else if name.contains('/') {
        format!("/{name}")
    } else {
        format!("/{}", name.replace('_', "/"))
    };
    Ok(Some(match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path,
    }))
}

/// Flatten a tree into message text plus buttons.
///
/// Text leaves are concatenated; block elements end their line; `button`
/// elements become buttons labelled by their text, carrying their
/// `callback` prop.
pub fn render_message(tree: &Node) -> (String, Vec<Button>) {
    let mut text = String::new();
    let mut buttons = Vec::new();
    collect(tree, &mut text, &mut buttons);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    (lines.join("\n"), buttons)
}

fn collect(node: &Node, text: &mut String, buttons: &mut Vec<Button>) {
    if let Some(value) = node.text_value() {
        text.push_str(value);
        return;
    }
    if node.kind == "button" {
        let label = node.text_content();
        let callback = node.prop_str("callback").unwrap_or(&label).to_string();
        buttons.push(Button { label, callback });
        return;
    }
    let block = BLOCK_KINDS.contains(&node.kind.as_str());
    if block {
        text.push('\n');
    }
    for child in &node.children {
        collect(child, text, buttons);
    }
    if block {
        text.push('\n');
    }
}
