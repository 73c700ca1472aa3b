//! Core: load, render, commit and hand off to the adapter

use super::actor::{spawn_session, SessionCommand, SessionHandle};
use super::quiet::{CommitClock, QuietOutcome};
use super::session::ConversationSession;
use crate::adapter::{Adapter, ChatIdentity, InboundEvent, InboundSink, RedirectOptions, RouteInput};
use crate::component::{PageProps, RenderContext};
use crate::config::CoreConfig;
use crate::error::{ErrorClass, RenderError};
use crate::route::{RenderedComponent, Router, StoredRoute, ROOT_ROUTE};
use crate::state_machine::{transition, RenderEffect, RenderEvent, TransitionError};
use crate::storage::{Storage, Subscription};
use crate::vdom::RootTree;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Called with every element the adapter produces for a session
pub type UpdateCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Route key of the detached session rendered by `init`
const BOOTSTRAP_KEY: &str = ROOT_ROUTE;

/// What a successful evaluation and commit leaves for the effects
struct RenderOutcome {
    rendered: RenderedComponent,
    ctx: RenderContext,
    props: PageProps,
    needs_mount: bool,
}

pub struct Core<A: Adapter> {
    adapter: Arc<A>,
    router: Arc<Router>,
    config: CoreConfig,
    /// `render_app` callbacks by session id
    listeners: Mutex<HashMap<String, UpdateCallback<A::Element>>>,
    /// Session tasks by chat id
    sessions: RwLock<HashMap<String, SessionHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    this: Weak<Self>,
}

impl<A: Adapter> Core<A> {
    pub fn new(adapter: Arc<A>, router: Arc<Router>, config: CoreConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            adapter,
            router,
            config,
            listeners: Mutex::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            this: this.clone(),
        })
    }

    /// The API handed to the adapter
    pub fn handle(&self) -> CoreHandle<A> {
        CoreHandle {
            core: self.this.clone(),
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.router.storage()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn route_key(&self, session: &ConversationSession) -> String {
        if session.is_detached() {
            BOOTSTRAP_KEY.to_string()
        } else {
            self.adapter.route_key(session)
        }
    }

    fn upgrade(&self) -> Result<Arc<Self>, RenderError> {
        self.this.upgrade().ok_or(RenderError::CoreReleased)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Hand the adapter its API, publish menus, render the root route once
    /// and then start taking inbound events.
    ///
    /// Any failure here is a startup failure and leaves no dispatcher behind.
    pub async fn init(&self) -> Result<(), RenderError> {
        self.adapter.init(self.handle()).await?;

        let menus = self.router.menus();
        self.adapter.set_menus(&menus).await?;

        let mut bootstrap = ConversationSession::detached();
        self.load_and_render_stored_route(&mut bootstrap, BOOTSTRAP_KEY)
            .await?;
        self.render(&mut bootstrap).await?;

        let (tx, rx) = mpsc::channel(self.config.inbound_buffer);
        self.adapter.subscribe_to_message_changed(InboundSink::new(tx));
        self.spawn_dispatcher(rx)?;

        tracing::info!(
            routes = self.router.registry().len(),
            menus = menus.len(),
            "Core initialized"
        );
        Ok(())
    }

    /// Stop every session, release the adapter and drop all update
    /// callbacks.
    pub async fn on_destroy(&self) -> Result<(), RenderError> {
        self.shutdown.cancel();

        let sessions: Vec<SessionHandle> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        let tasks: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let stopped = sessions.len();
        for task in sessions.into_iter().map(|h| h.task).chain(tasks) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Task ended abnormally during shutdown");
            }
        }

        self.adapter.on_destroy().await?;
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!(sessions = stopped, "Core destroyed");
        Ok(())
    }

    fn spawn_dispatcher(&self, mut rx: mpsc::Receiver<InboundEvent>) -> Result<(), RenderError> {
        let core = self.upgrade()?;
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => core.dispatch(event).await,
                        None => break,
                    },
                }
            }
            tracing::info!("Inbound dispatcher stopped");
        });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
        Ok(())
    }

    // ========================================================================
    // Session routing
    // ========================================================================

    async fn dispatch(&self, event: InboundEvent) {
        let chat = event.chat.clone();
        if let Err(e) = self.enqueue(&chat, SessionCommand::Inbound(event)).await {
            tracing::warn!(chat_id = %chat.chat_id, error = %e, "Dropping inbound event");
        }
    }

    pub(crate) async fn enqueue(
        &self,
        chat: &ChatIdentity,
        command: SessionCommand,
    ) -> Result<(), RenderError> {
        let (tx, _) = self.session_channel(chat).await?;
        tx.send(command)
            .await
            .map_err(|_| RenderError::CoreReleased)
    }

    /// Commit clock of the chat's session, starting the session if needed
    pub async fn session_clock(&self, chat: &ChatIdentity) -> Result<CommitClock, RenderError> {
        let (_, clock) = self.session_channel(chat).await?;
        Ok(clock)
    }

    async fn session_channel(
        &self,
        chat: &ChatIdentity,
    ) -> Result<(mpsc::Sender<SessionCommand>, CommitClock), RenderError> {
        if let Some(handle) = self.sessions.read().await.get(&chat.chat_id) {
            if !handle.tx.is_closed() {
                return Ok((handle.tx.clone(), handle.clock.clone()));
            }
        }
        if self.shutdown.is_cancelled() {
            return Err(RenderError::CoreReleased);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(&chat.chat_id) {
            if !handle.tx.is_closed() {
                return Ok((handle.tx.clone(), handle.clock.clone()));
            }
        }
        let handle = spawn_session(self.upgrade()?, chat.clone());
        let channel = (handle.tx.clone(), handle.clock.clone());
        sessions.insert(chat.chat_id.clone(), handle);
        Ok(channel)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ========================================================================
    // Render pipeline
    // ========================================================================

    /// Resolve the stored route of `key` and make it the session's pending
    /// component. Produces no output.
    pub async fn load_and_render_stored_route(
        &self,
        session: &mut ConversationSession,
        key: &str,
    ) -> Result<RenderedComponent, RenderError> {
        let rendered = self.router.render(key).await?;
        let loaded = transition(session.state, session.facts(), RenderEvent::ComponentLoaded)
            .map_err(lifecycle_error)?;
        session.state = loaded.new_state;
        session.pending = Some(rendered.clone());
        tracing::debug!(
            session_id = %session.session_id(),
            key = %key,
            route = %rendered.current_route,
            component = %rendered.component.name,
            "Component loaded"
        );
        Ok(rendered)
    }

    /// Render the pending component and commit it. A redirect signal from
    /// the page moves the session and renders again, up to the configured
    /// depth.
    pub async fn render(&self, session: &mut ConversationSession) -> Result<(), RenderError> {
        let mut hops = 0;
        loop {
            match self.render_once(session).await {
                Err(RenderError::Redirect { location }) => {
                    hops += 1;
                    if hops > self.config.max_redirect_depth {
                        return Err(RenderError::RedirectLoop {
                            location,
                            depth: self.config.max_redirect_depth,
                        });
                    }
                    tracing::debug!(
                        session_id = %session.session_id(),
                        location = %location,
                        hops,
                        "Page redirected"
                    );
                    let key = self.route_key(session);
                    self.router.navigate_to(&key, &location).await?;
                    session.clear_inbound_text();
                    self.load_and_render_stored_route(session, &key).await?;
                }
                result => return result,
            }
        }
    }

    async fn render_once(&self, session: &mut ConversationSession) -> Result<(), RenderError> {
        let started = transition(session.state, session.facts(), RenderEvent::RenderStarted)
            .map_err(lifecycle_error)?;
        session.state = started.new_state;

        let outcome = match self.evaluate_and_commit(session).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Ok(failed) =
                    transition(session.state, session.facts(), RenderEvent::RenderFailed)
                {
                    session.state = failed.new_state;
                }
                return Err(err);
            }
        };

        let done = transition(
            session.state,
            session.facts(),
            RenderEvent::CommitCompleted {
                tree_changed: outcome.needs_mount,
            },
        )
        .map_err(lifecycle_error)?;
        session.state = done.new_state;

        for effect in done.effects {
            self.apply_effect(session, effect, &outcome).await?;
        }
        Ok(())
    }

    async fn evaluate_and_commit(
        &self,
        session: &mut ConversationSession,
    ) -> Result<RenderOutcome, RenderError> {
        let rendered = session.pending.clone().ok_or(RenderError::NothingToRender)?;
        let ctx = RenderContext::new(
            self.route_key(session),
            session.chat().clone(),
            session.inbound_text().map(str::to_string),
            &rendered,
            Arc::clone(&self.router),
        );
        let props = PageProps::from_rendered(&rendered, ctx.text().map(str::to_string));

        let mut tree = rendered.component.value.render(&ctx, &props).await?;
        for layout in rendered.layouts.iter().rev() {
            tree = layout.value.render(&ctx, tree).await?;
        }

        let root = session.root.get_or_insert_with(RootTree::new);
        let previous = root.current().cloned();
        let is_update = previous.is_some();
        let summary = root.reconcile(tree, |path, node| {
            tracing::trace!(path = ?path, kind = %node.kind, "Node mounted");
        })?;

        if !session.is_detached() && !(is_update && summary.is_empty()) {
            if let Some(committed) = session.committed_tree().cloned() {
                match self.adapter.adapt(session, &committed, is_update).await {
                    Ok(element) => self.notify_update(session.session_id(), &element),
                    Err(err) => {
                        if let Some(root) = session.root.as_mut() {
                            root.reset(previous);
                        }
                        return Err(err.into());
                    }
                }
            }
        }

        let route_changed =
            session.mounted_route.as_deref() != Some(rendered.current_route.as_str());
        tracing::debug!(
            session_id = %session.session_id(),
            route = %rendered.current_route,
            inserted = summary.inserted,
            updated = summary.updated,
            removed = summary.removed,
            "Render committed"
        );
        Ok(RenderOutcome {
            needs_mount: !summary.is_empty() || route_changed,
            rendered,
            ctx,
            props,
        })
    }

    async fn apply_effect(
        &self,
        session: &mut ConversationSession,
        effect: RenderEffect,
        outcome: &RenderOutcome,
    ) -> Result<(), RenderError> {
        match effect {
            RenderEffect::TouchCommitClock => session.clock().touch(),
            RenderEffect::RefreshSubscriptions => self.refresh_subscriptions(session, outcome),
            RenderEffect::RunMountHooks => {
                if session.is_detached() {
                    return Ok(());
                }
                let route = &outcome.rendered.current_route;
                if session.mounted_route.as_ref() != Some(route) {
                    session.mounted_route = Some(route.clone());
                    outcome
                        .rendered
                        .component
                        .value
                        .mounted(&outcome.ctx, &outcome.props)
                        .await?;
                }
                self.adapter.component_on_mount(session).await?;
            }
        }
        Ok(())
    }

    /// Subscribe the session to the state its page read and to its own route
    fn refresh_subscriptions(&self, session: &mut ConversationSession, outcome: &RenderOutcome) {
        if session.is_detached() {
            return;
        }
        let Some(hooks) = session.rerender.clone() else {
            return;
        };
        let storage = self.storage();
        let state_route = outcome.rendered.path();
        let mut subscriptions: Vec<Subscription> = outcome
            .ctx
            .read_state_keys()
            .iter()
            .map(|key| {
                storage.subscribe_state_change(key, state_route, Arc::clone(&hooks.state))
            })
            .collect();
        subscriptions.push(storage.subscribe_route_change(outcome.ctx.route_key(), hooks.route));
        session.replace_subscriptions(subscriptions);
    }

    fn notify_update(&self, session_id: &str, element: &A::Element) {
        let callback = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned();
        if let Some(callback) = callback {
            callback(element);
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Decode `input` and move the session there.
    ///
    /// A decoded path becomes the stored route, the route being left is kept
    /// as the history entry when requested, and buffered inbound text is
    /// dropped. Input that decodes to no path leaves the route alone; with
    /// `should_render` the current page renders again with the new text.
    pub async fn redirect(
        &self,
        session: &mut ConversationSession,
        input: RouteInput,
        options: RedirectOptions,
    ) -> Result<Option<StoredRoute>, RenderError> {
        let key = self.route_key(session);
        let decoded = match self.adapter.decode_route(&input).await {
            Ok(path) => path,
            Err(e) if e.kind.is_recoverable() => {
                tracing::warn!(key = %key, error = %e, "Could not decode route; staying put");
                None
            }
            Err(e) => return Err(e.into()),
        };
        if let RouteInput::Event(event) = input {
            session.record_inbound(event);
        }

        let mut stored = None;
        if let Some(path) = decoded {
            if options.should_add_to_history {
                self.remember_current(&key, &path).await?;
            }
            stored = Some(self.router.navigate_to(&key, &path).await?);
            session.clear_inbound_text();
            tracing::info!(key = %key, route = %path, "Redirected");
        }

        if options.should_render {
            self.load_and_render_stored_route(session, &key).await?;
            self.render(session).await?;
        }
        Ok(stored)
    }

    /// Keep the route being left as the single history entry
    async fn remember_current(&self, key: &str, next: &str) -> Result<(), RenderError> {
        let current = self
            .storage()
            .restore_route(key)
            .await?
            .unwrap_or_else(StoredRoute::root);
        if current.route != next {
            self.storage().add_history(key, &current).await?;
        }
        Ok(())
    }

    /// Navigate to the history entry, consuming it. `None` when there is
    /// nothing to go back to.
    pub async fn go_back(
        &self,
        session: &mut ConversationSession,
    ) -> Result<Option<StoredRoute>, RenderError> {
        let key = self.route_key(session);
        let Some(entry) = self.storage().restore_history(&key).await? else {
            tracing::debug!(key = %key, "No history to go back to");
            return Ok(None);
        };
        self.storage().delete_history(&key).await?;
        let stored = self.router.navigate_to(&key, &entry.route).await?;
        session.clear_inbound_text();
        self.load_and_render_stored_route(session, &key).await?;
        self.render(session).await?;
        Ok(Some(stored))
    }

    /// Reload the stored route and render it
    pub async fn rerender(&self, session: &mut ConversationSession) -> Result<(), RenderError> {
        let key = self.route_key(session);
        self.load_and_render_stored_route(session, &key).await?;
        self.render(session).await
    }

    /// Whether the session already shows what its route key stores. A lookup
    /// failure counts as a difference.
    pub(crate) async fn shows_stored_route(&self, session: &ConversationSession) -> bool {
        if !session.has_committed() {
            return false;
        }
        let key = self.route_key(session);
        match self.router.route_from_key(&key).await {
            Ok(stored) => {
                session.current_route() == Some(stored.as_deref().unwrap_or(ROOT_ROUTE))
            }
            Err(_) => false,
        }
    }

    pub async fn render_app(
        &self,
        session: &mut ConversationSession,
        callback: UpdateCallback<A::Element>,
    ) -> Result<(), RenderError> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.session_id().to_string(), callback);
        if session.pending().is_none() {
            let key = self.route_key(session);
            self.load_and_render_stored_route(session, &key).await?;
        }
        self.render(session).await
    }

    pub async fn restore_route(&self, key: &str) -> Result<Option<String>, RenderError> {
        Ok(self.router.route_from_key(key).await?)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Hand `event` to the adapter, then wait until the chat's session has
    /// not committed for the quiet window. Other chats do not hold it up.
    pub async fn handle_message_update(
        &self,
        event: InboundEvent,
    ) -> Result<QuietOutcome, RenderError> {
        let chat = event.chat.clone();
        let clock = self.session_clock(&chat).await?;
        self.adapter.handle_message_update(event).await?;
        let outcome = self.settle(&clock).await;
        tracing::debug!(chat_id = %chat.chat_id, outcome = ?outcome, "Message update settled");
        Ok(outcome)
    }

    /// Restart the chat's quiet window now and wait for it to elapse
    pub async fn wait_quiet(&self, chat: &ChatIdentity) -> Result<QuietOutcome, RenderError> {
        let clock = self.session_clock(chat).await?;
        Ok(self.settle(&clock).await)
    }

    async fn settle(&self, clock: &CommitClock) -> QuietOutcome {
        clock.touch();
        clock
            .wait_quiet(
                self.config.quiet_window,
                self.config.max_quiet_wait,
                &self.shutdown,
            )
            .await
    }

    /// Top-level error boundary of a session task
    pub(crate) async fn report_failure(&self, session: &mut ConversationSession, err: RenderError) {
        let session_id = session.session_id().to_string();
        let chat_id = session.chat().chat_id.clone();
        match err.class() {
            ErrorClass::ControlFlow => {
                tracing::debug!(session_id = %session_id, signal = %err, "Unhandled control flow");
            }
            ErrorClass::Recoverable => {
                tracing::warn!(
                    session_id = %session_id,
                    chat_id = %chat_id,
                    error = %err,
                    "Render failed"
                );
                if !session.has_committed() {
                    self.render_error_page(session, &err).await;
                }
            }
            ErrorClass::Fatal => {
                tracing::error!(
                    session_id = %session_id,
                    chat_id = %chat_id,
                    error = %err,
                    "Fatal render error"
                );
            }
        }
    }

    /// Show the nearest error page to a session that has nothing on screen
    async fn render_error_page(&self, session: &mut ConversationSession, cause: &RenderError) {
        let route = session.current_route().unwrap_or(ROOT_ROUTE).to_string();
        let mut rendered = self.router.resolve_error(&route);
        rendered.props = Some(serde_json::json!({ "message": cause.to_string() }));

        let Ok(loaded) = transition(session.state, session.facts(), RenderEvent::ComponentLoaded)
        else {
            return;
        };
        session.state = loaded.new_state;
        session.pending = Some(rendered);
        if let Err(e) = self.render_once(session).await {
            tracing::error!(
                session_id = %session.session_id(),
                error = %e,
                "Error page failed to render"
            );
        }
    }
}

fn lifecycle_error(err: TransitionError) -> RenderError {
    match err {
        TransitionError::NothingToRender => RenderError::NothingToRender,
        other => RenderError::Transition(other),
    }
}

impl<A: Adapter> std::fmt::Debug for Core<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("router", &self.router)
            .field("config", &self.config)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Adapter-facing API
// ============================================================================

/// What adapters hold on to. Does not keep the core alive.
pub struct CoreHandle<A: Adapter> {
    core: Weak<Core<A>>,
}

impl<A: Adapter> Clone for CoreHandle<A> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<A: Adapter> std::fmt::Debug for CoreHandle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<A: Adapter> CoreHandle<A> {
    fn core(&self) -> Result<Arc<Core<A>>, RenderError> {
        self.core.upgrade().ok_or(RenderError::CoreReleased)
    }

    pub fn is_alive(&self) -> bool {
        self.core.strong_count() > 0
    }

    /// Register `callback` for the session's adapted output and render it
    pub async fn render_app(
        &self,
        session: &mut ConversationSession,
        callback: UpdateCallback<A::Element>,
    ) -> Result<(), RenderError> {
        self.core()?.render_app(session, callback).await
    }

    pub async fn redirect_to(
        &self,
        session: &mut ConversationSession,
        path: &str,
        options: RedirectOptions,
    ) -> Result<Option<StoredRoute>, RenderError> {
        self.core()?
            .redirect(session, RouteInput::Encoded(path.to_string()), options)
            .await
    }

    pub async fn restore_route(&self, key: &str) -> Result<Option<String>, RenderError> {
        self.core()?.restore_route(key).await
    }

    /// Queue a go-back for the chat's session
    pub async fn go_back(&self, chat: &ChatIdentity) -> Result<(), RenderError> {
        self.core()?.enqueue(chat, SessionCommand::Back).await
    }
}
