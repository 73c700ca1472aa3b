//! Mock adapter, pages and catalog shared by unit tests

use crate::adapter::{Adapter, AdapterError, InboundEvent, InboundSink, RouteInput};
use crate::component::{
    ApiError, ApiHandler, ApiRequest, ApiResponse, Component, ComponentCatalog, Layout,
    PageProps, RenderContext,
};
use crate::engine::{ConversationSession, CoreHandle};
use crate::error::RenderError;
use crate::route::Menu;
use crate::vdom::Node;
use async_trait::async_trait;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// Pages, layouts and handlers
// ============================================================================

/// Renders a fixed text
pub struct StaticPage {
    text: String,
}

impl StaticPage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Component for StaticPage {
    async fn render(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Ok(Node::element("page").with_child(Node::text(self.text.clone())))
    }
}

/// Renders its route, params and the inbound text
pub struct EchoPage;

#[async_trait]
impl Component for EchoPage {
    async fn render(&self, _ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        let mut page = Node::element("page").with_child(Node::text(props.current_route.clone()));
        for (name, value) in &props.params {
            page = page.with_child(Node::text(format!(" {name}={value}")));
        }
        if let Some(text) = &props.text {
            page = page.with_child(Node::text(format!(" text={text}")));
        }
        Ok(page)
    }
}

pub struct FailingPage;

#[async_trait]
impl Component for FailingPage {
    async fn render(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Err(RenderError::component("boom"))
    }
}

/// Always answers with the redirect signal
pub struct RedirectingPage {
    to: String,
}

impl RedirectingPage {
    pub fn new(to: impl Into<String>) -> Self {
        Self { to: to.into() }
    }
}

#[async_trait]
impl Component for RedirectingPage {
    async fn render(&self, ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Err(ctx.redirect(self.to.clone()))
    }
}

thread_local! {
    static STATEFUL_MOUNTS: Cell<usize> = const { Cell::new(0) };
}

/// Mount hooks run by [`StatefulPage`] on the current thread
pub fn stateful_mounts() -> usize {
    STATEFUL_MOUNTS.with(Cell::get)
}

/// Shows the `count` state slot; seeds it on mount
pub struct StatefulPage;

#[async_trait]
impl Component for StatefulPage {
    async fn render(&self, ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        let count: u32 = ctx.state_or("count", 0).await?;
        Ok(Node::element("page").with_child(Node::text(format!("count {count}"))))
    }

    async fn mounted(&self, ctx: &RenderContext, _props: &PageProps) -> Result<(), RenderError> {
        STATEFUL_MOUNTS.with(|n| n.set(n.get() + 1));
        if ctx.state::<u32>("count").await?.is_none() {
            ctx.set_state("count", &0u32).await?;
        }
        Ok(())
    }
}

/// Counts its own evaluations
pub struct CountingPage {
    renders: Arc<AtomicUsize>,
}

impl CountingPage {
    pub fn new(renders: Arc<AtomicUsize>) -> Self {
        Self { renders }
    }
}

#[async_trait]
impl Component for CountingPage {
    async fn render(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        let n = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Node::element("page").with_child(Node::text(format!("rendered {n}"))))
    }
}

/// Wraps children in an element of the given kind
pub struct TagLayout {
    tag: String,
}

impl TagLayout {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait]
impl Layout for TagLayout {
    async fn render(&self, _ctx: &RenderContext, children: Node) -> Result<Node, RenderError> {
        Ok(Node::element(self.tag.clone()).with_child(children))
    }
}

pub struct HealthHandler;

#[async_trait]
impl ApiHandler for HealthHandler {
    async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse::ok(serde_json::json!({
            "status": "ok",
            "path": request.path,
            "params": request.params,
        })))
    }
}

pub fn test_catalog() -> ComponentCatalog {
    ComponentCatalog::new()
        .with_page("home", StaticPage::new("home"))
        .with_page("static", StaticPage::new("static"))
        .with_page("missing", StaticPage::new("missing"))
        .with_page("oops", StaticPage::new("oops"))
        .with_page("echo", EchoPage)
        .with_page("failing", FailingPage)
        .with_page("redirect-home", RedirectingPage::new("/"))
        .with_page("loop", RedirectingPage::new("/loop"))
        .with_page("stateful", StatefulPage)
        .with_layout("outer", TagLayout::new("outer"))
        .with_layout("inner", TagLayout::new("inner"))
        .with_handler("health", HealthHandler)
}

// ============================================================================
// Adapter
// ============================================================================

#[derive(Debug, Clone)]
pub struct AdaptCall {
    pub chat_id: String,
    pub tree: Node,
    pub is_update: bool,
}

/// Records everything the core asks of it.
///
/// Text and callbacks starting with `/` decode to that path, anything else is
/// not a navigation. Route keys are chat ids.
#[derive(Default)]
pub struct MockAdapter {
    adapts: Mutex<Vec<AdaptCall>>,
    menus: Mutex<Vec<Vec<Menu>>>,
    mounts: Mutex<Vec<String>>,
    sink: Mutex<Option<InboundSink>>,
    handle: Mutex<Option<CoreHandle<MockAdapter>>>,
    fail_adapts: AtomicBool,
    destroyed: AtomicBool,
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockAdapter {
    /// Inbound text that fails to decode
    pub const UNDECODABLE: &'static str = "!undecodable";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapts(&self) -> Vec<AdaptCall> {
        locked(&self.adapts).clone()
    }

    pub fn last_tree(&self) -> Option<Node> {
        locked(&self.adapts).last().map(|call| call.tree.clone())
    }

    pub fn menus(&self) -> Vec<Vec<Menu>> {
        locked(&self.menus).clone()
    }

    pub fn mounts(&self) -> Vec<String> {
        locked(&self.mounts).clone()
    }

    pub fn sink(&self) -> Option<InboundSink> {
        locked(&self.sink).clone()
    }

    pub fn handle(&self) -> Option<CoreHandle<MockAdapter>> {
        locked(&self.handle).clone()
    }

    pub fn fail_adapts(&self, fail: bool) {
        self.fail_adapts.store(fail, Ordering::SeqCst);
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn decode(raw: Option<&str>) -> Result<Option<String>, AdapterError> {
        match raw {
            Some(Self::UNDECODABLE) => Err(AdapterError::decode("undecodable input")),
            Some(path) if path.starts_with('/') => Ok(Some(path.to_string())),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    type Element = Node;

    async fn init(&self, core: CoreHandle<Self>) -> Result<(), AdapterError> {
        *locked(&self.handle) = Some(core);
        Ok(())
    }

    async fn on_destroy(&self) -> Result<(), AdapterError> {
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn route_key(&self, session: &ConversationSession) -> String {
        session.chat().chat_id.clone()
    }

    async fn decode_route(&self, input: &RouteInput) -> Result<Option<String>, AdapterError> {
        match input {
            RouteInput::Encoded(path) => Ok(Some(path.clone())),
            RouteInput::Event(event) => {
                Self::decode(event.callback.as_deref().or(event.text.as_deref()))
            }
        }
    }

    async fn adapt(
        &self,
        session: &ConversationSession,
        tree: &Node,
        is_update: bool,
    ) -> Result<Node, AdapterError> {
        if self.fail_adapts.load(Ordering::SeqCst) {
            return Err(AdapterError::delivery("platform unavailable"));
        }
        locked(&self.adapts).push(AdaptCall {
            chat_id: session.chat().chat_id.clone(),
            tree: tree.clone(),
            is_update,
        });
        Ok(tree.clone())
    }

    async fn set_menus(&self, menus: &[Menu]) -> Result<(), AdapterError> {
        locked(&self.menus).push(menus.to_vec());
        Ok(())
    }

    async fn component_on_mount(&self, session: &ConversationSession) -> Result<(), AdapterError> {
        locked(&self.mounts).push(session.chat().chat_id.clone());
        Ok(())
    }

    fn subscribe_to_message_changed(&self, sink: InboundSink) {
        *locked(&self.sink) = Some(sink);
    }

    async fn handle_message_update(&self, event: InboundEvent) -> Result<(), AdapterError> {
        let sink = self
            .sink()
            .ok_or_else(|| AdapterError::closed("not subscribed"))?;
        sink.deliver(event).await
    }
}
