//! Per-conversation render session

use super::quiet::CommitClock;
use crate::adapter::{ChatIdentity, InboundEvent};
use crate::route::RenderedComponent;
use crate::state_machine::{RenderFacts, RenderState};
use crate::storage::{ChangeCallback, Subscription};
use crate::vdom::{Node, RootTree};
use chrono::{DateTime, Utc};

/// Callbacks scheduling a re-render, one per kind of observed change
#[derive(Clone)]
pub(crate) struct RerenderHooks {
    pub state: ChangeCallback,
    pub route: ChangeCallback,
}

/// One chat's view of the application.
///
/// Created on the first inbound event for a chat and owned by that chat's
/// session task from then on.
pub struct ConversationSession {
    pub(crate) session_id: String,
    pub(crate) chat: ChatIdentity,
    pub(crate) last_inbound: Option<InboundEvent>,
    pub(crate) root: Option<RootTree>,
    pub(crate) state: RenderState,
    pub(crate) pending: Option<RenderedComponent>,
    /// Route whose mount hook last ran
    pub(crate) mounted_route: Option<String>,
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) rerender: Option<RerenderHooks>,
    /// Touched by every commit of this session
    pub(crate) clock: CommitClock,
    detached: bool,
    created_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(chat: ChatIdentity) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            chat,
            last_inbound: None,
            root: None,
            state: RenderState::Empty,
            pending: None,
            mounted_route: None,
            subscriptions: Vec::new(),
            rerender: None,
            clock: CommitClock::new(),
            detached: false,
            created_at: Utc::now(),
        }
    }

    /// A session with no chat behind it. Renders into its own tree only:
    /// nothing is handed to the adapter and no hooks run.
    pub fn detached() -> Self {
        let mut session = Self::new(ChatIdentity::new(""));
        session.detached = true;
        session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn chat(&self) -> &ChatIdentity {
        &self.chat
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_inbound(&self) -> Option<&InboundEvent> {
        self.last_inbound.as_ref()
    }

    pub fn record_inbound(&mut self, event: InboundEvent) {
        self.last_inbound = Some(event);
    }

    /// Text of the buffered inbound message, falling back to its callback
    /// data, if it has not been consumed
    pub fn inbound_text(&self) -> Option<&str> {
        self.last_inbound
            .as_ref()
            .and_then(|e| e.text.as_deref().or(e.callback.as_deref()))
    }

    pub fn clear_inbound_text(&mut self) {
        if let Some(event) = self.last_inbound.as_mut() {
            event.text = None;
            event.callback = None;
        }
    }

    pub fn render_state(&self) -> RenderState {
        self.state
    }

    pub fn pending(&self) -> Option<&RenderedComponent> {
        self.pending.as_ref()
    }

    pub fn current_route(&self) -> Option<&str> {
        self.pending.as_ref().map(|r| r.current_route.as_str())
    }

    pub fn committed_tree(&self) -> Option<&Node> {
        self.root.as_ref().and_then(RootTree::current)
    }

    pub fn has_committed(&self) -> bool {
        self.committed_tree().is_some()
    }

    pub(crate) fn facts(&self) -> RenderFacts {
        RenderFacts {
            has_committed_tree: self.has_committed(),
        }
    }

    pub fn clock(&self) -> &CommitClock {
        &self.clock
    }

    pub(crate) fn set_rerender_hooks(&mut self, hooks: RerenderHooks) {
        self.rerender = Some(hooks);
    }

    pub(crate) fn replace_subscriptions(&mut self, next: Vec<Subscription>) {
        for old in std::mem::replace(&mut self.subscriptions, next) {
            old.unsubscribe();
        }
    }

    /// Drop every storage subscription
    pub fn release(&mut self) {
        self.replace_subscriptions(Vec::new());
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("session_id", &self.session_id)
            .field("chat", &self.chat)
            .field("state", &self.state)
            .field("current_route", &self.current_route())
            .field("subscriptions", &self.subscriptions.len())
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ListenerMap;
    use std::sync::Arc;

    #[test]
    fn test_inbound_text_is_consumable() {
        let chat = ChatIdentity::new("c1");
        let mut session = ConversationSession::new(chat.clone());
        assert_eq!(session.inbound_text(), None);

        session.record_inbound(InboundEvent::text(chat, "hello"));
        assert_eq!(session.inbound_text(), Some("hello"));

        session.clear_inbound_text();
        assert_eq!(session.inbound_text(), None);
        assert!(session.last_inbound().is_some());

        let chat = session.chat().clone();
        session.record_inbound(InboundEvent::callback(chat, "inc"));
        assert_eq!(session.inbound_text(), Some("inc"));
    }

    #[test]
    fn test_fresh_session() {
        let session = ConversationSession::new(ChatIdentity::new("c1"));
        assert_eq!(session.render_state(), RenderState::Empty);
        assert!(!session.has_committed());
        assert!(!session.is_detached());
        assert!(ConversationSession::detached().is_detached());
        assert_ne!(
            session.session_id(),
            ConversationSession::new(ChatIdentity::new("c1")).session_id()
        );
    }

    #[test]
    fn test_release_unsubscribes() {
        let listeners = ListenerMap::new();
        let mut session = ConversationSession::new(ChatIdentity::new("c1"));
        session.replace_subscriptions(vec![
            listeners.subscribe("a".into(), Arc::new(|| {})),
            listeners.subscribe("b".into(), Arc::new(|| {})),
        ]);
        assert_eq!(listeners.listener_count("a"), 1);

        session.replace_subscriptions(vec![listeners.subscribe("b".into(), Arc::new(|| {}))]);
        assert_eq!(listeners.listener_count("a"), 0);
        assert_eq!(listeners.listener_count("b"), 1);

        drop(session);
        assert_eq!(listeners.listener_count("b"), 0);
    }
}
