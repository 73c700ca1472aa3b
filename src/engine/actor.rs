//! Per-chat session task

use super::pipeline::Core;
use super::quiet::CommitClock;
use super::session::{ConversationSession, RerenderHooks};
use crate::adapter::{Adapter, ChatIdentity, InboundEvent, RedirectOptions, RouteInput};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeCause {
    State,
    Route,
}

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Inbound(InboundEvent),
    Back,
    /// Observed state or route changed
    Rerender(ChangeCause),
}

pub(crate) struct SessionHandle {
    pub tx: mpsc::Sender<SessionCommand>,
    pub clock: CommitClock,
    pub task: JoinHandle<()>,
}

pub(crate) fn spawn_session<A: Adapter>(core: Arc<Core<A>>, chat: ChatIdentity) -> SessionHandle {
    let (tx, rx) = mpsc::channel(core.config().session_buffer);
    let mut session = ConversationSession::new(chat);

    let hook = |cause: ChangeCause| {
        let weak = tx.downgrade();
        Arc::new(move || {
            if let Some(tx) = weak.upgrade() {
                // a full queue already holds work that will render fresh state
                let _ = tx.try_send(SessionCommand::Rerender(cause));
            }
        })
    };
    session.set_rerender_hooks(RerenderHooks {
        state: hook(ChangeCause::State),
        route: hook(ChangeCause::Route),
    });

    let clock = session.clock().clone();
    let task = tokio::spawn(run(core, session, rx));
    SessionHandle { tx, clock, task }
}

async fn run<A: Adapter>(
    core: Arc<Core<A>>,
    mut session: ConversationSession,
    mut rx: mpsc::Receiver<SessionCommand>,
) {
    let shutdown = core.shutdown_token();
    tracing::info!(
        session_id = %session.session_id(),
        chat_id = %session.chat().chat_id,
        "Session started"
    );

    let mut backlog = VecDeque::new();
    loop {
        let command = match backlog.pop_front() {
            Some(command) => command,
            None => tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            },
        };

        let result = match command {
            SessionCommand::Inbound(event) => core
                .redirect(
                    &mut session,
                    RouteInput::Event(event),
                    RedirectOptions::navigate(),
                )
                .await
                .map(|_| ()),
            SessionCommand::Back => core.go_back(&mut session).await.map(|_| ()),
            SessionCommand::Rerender(cause) => {
                let (collapsed, state_changed) = drain_rerenders(&mut rx, &mut backlog);
                let state_changed = state_changed || cause == ChangeCause::State;
                if !state_changed && core.shows_stored_route(&session).await {
                    // the session's own navigation, already rendered
                    tracing::trace!(session_id = %session.session_id(), "Route unchanged");
                    continue;
                }
                tracing::debug!(
                    session_id = %session.session_id(),
                    collapsed,
                    state_changed,
                    "Re-rendering after change"
                );
                // inbound text belongs to the render of its own event
                session.clear_inbound_text();
                core.rerender(&mut session).await
            }
        };

        if let Err(err) = result {
            core.report_failure(&mut session, err).await;
        }
    }

    session.release();
    tracing::info!(session_id = %session.session_id(), "Session stopped");
}

/// Pull everything already queued. Re-render requests are dropped, other
/// commands keep their order in `backlog`. Returns how many re-renders were
/// collapsed and whether any of them came from a state change.
fn drain_rerenders(
    rx: &mut mpsc::Receiver<SessionCommand>,
    backlog: &mut VecDeque<SessionCommand>,
) -> (usize, bool) {
    let mut collapsed = 0;
    let mut state_changed = false;
    while let Ok(next) = rx.try_recv() {
        match next {
            SessionCommand::Rerender(cause) => {
                collapsed += 1;
                state_changed |= cause == ChangeCause::State;
            }
            other => backlog.push_back(other),
        }
    }
    (collapsed, state_changed)
}
