//! Demo application served by the `chatframe` binary
//!
//! `demo/routes.json` describes the same tree as [`route_file`]; pass it via
//! `CHATFRAME_ROUTES` to serve the demo from metadata on disk.

use crate::component::{
    ApiError, ApiHandler, ApiRequest, ApiResponse, Component, ComponentCatalog, Layout,
    PageProps, RenderContext,
};
use crate::error::RenderError;
use crate::route::{ApiMethod, RouteFile, RouteInfo, RouteMetadata};
use crate::vdom::Node;
use async_trait::async_trait;
use serde_json::json;

fn heading(text: impl Into<String>) -> Node {
    Node::element("h1").with_child(Node::text(text))
}

fn paragraph(text: impl Into<String>) -> Node {
    Node::element("p").with_child(Node::text(text))
}

fn button(label: &str, callback: &str) -> Node {
    Node::element("button")
        .with_key(callback)
        .with_prop("callback", callback)
        .with_child(Node::text(label))
}

// ============================================================================
// Layouts
// ============================================================================

/// Frame shared by every page: content, then the navigation footer
pub struct RootLayout;

#[async_trait]
impl Layout for RootLayout {
    async fn render(&self, _ctx: &RenderContext, children: Node) -> Result<Node, RenderError> {
        Ok(Node::element("section")
            .with_child(children)
            .with_child(paragraph("Menu: /start /counter /users")))
    }
}

pub struct UsersLayout;

#[async_trait]
impl Layout for UsersLayout {
    async fn render(&self, _ctx: &RenderContext, children: Node) -> Result<Node, RenderError> {
        Ok(Node::element("div")
            .with_child(Node::element("h2").with_child(Node::text("Users")))
            .with_child(children))
    }
}

// ============================================================================
// Pages
// ============================================================================

pub struct Home;

#[async_trait]
impl Component for Home {
    async fn render(&self, _ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        let mut page = Node::element("page")
            .with_child(heading("Welcome to chatframe"))
            .with_child(paragraph("Pick a page below or send a /command."));
        if let Some(text) = &props.text {
            page = page.with_child(paragraph(format!("You said: {text}")));
        }
        Ok(page
            .with_child(button("Counter", "/counter"))
            .with_child(button("Users", "/users"))
            .with_child(button("Nested", "/home_nested")))
    }
}

pub struct Nested;

#[async_trait]
impl Component for Nested {
    async fn render(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Ok(Node::element("page")
            .with_child(heading("Nested page"))
            .with_child(paragraph("Reached through a route with no page of its own."))
            .with_child(button("Back home", "/start")))
    }
}

/// Counts `+1` / `-1` messages; the mount hook counts visits
pub struct Counter;

#[async_trait]
impl Component for Counter {
    async fn render(&self, ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        let mut count: i64 = ctx.state_or("count", 0).await?;
        let visits: u64 = ctx.state_or("visits", 0).await?;

        let delta = match props.text.as_deref().map(str::trim) {
            Some("+1" | "inc") => 1,
            Some("-1" | "dec") => -1,
            _ => 0,
        };
        if delta != 0 {
            count += delta;
            ctx.set_state("count", &count).await?;
        }

        Ok(Node::element("page")
            .with_child(heading("Counter"))
            .with_child(paragraph(format!("Count: {count}")))
            .with_child(paragraph(format!("Visits: {visits}")))
            .with_child(button("+1", "inc"))
            .with_child(button("-1", "dec")))
    }

    async fn mounted(&self, ctx: &RenderContext, _props: &PageProps) -> Result<(), RenderError> {
        let visits: u64 = ctx.state_or("visits", 0).await?;
        ctx.set_state("visits", &(visits + 1)).await
    }
}

pub struct UserList;

#[async_trait]
impl Component for UserList {
    async fn render(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Ok(Node::element("page")
            .with_child(paragraph("Known users"))
            .with_child(button("Ada", "/users_1"))
            .with_child(button("Grace", "/users_2")))
    }
}

pub struct User;

#[async_trait]
impl Component for User {
    async fn render(&self, _ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        let id = props.param("id").unwrap_or_default();
        let mut page = Node::element("page").with_child(paragraph(format!("User {id}")));
        if let Some(tab) = props.query_str("tab") {
            page = page.with_child(paragraph(format!("Tab: {tab}")));
        }
        Ok(page.with_child(button("All users", "/users")))
    }
}

pub struct UsersNotFound;

#[async_trait]
impl Component for UsersNotFound {
    async fn render(&self, _ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError> {
        Ok(Node::element("page")
            .with_child(paragraph(format!("No user page at {}", props.current_route)))
            .with_child(button("All users", "/users")))
    }
}

/// Moved page: always sends the conversation home
pub struct MovedHome;

#[async_trait]
impl Component for MovedHome {
    async fn render(&self, ctx: &RenderContext, _props: &PageProps) -> Result<Node, RenderError> {
        Err(ctx.redirect("/"))
    }
}

// ============================================================================
// Api handlers
// ============================================================================

pub struct Health;

#[async_trait]
impl ApiHandler for Health {
    async fn handle(&self, _request: ApiRequest) -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse::ok(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })))
    }
}

/// Reads (GET) or resets (DELETE) a chat's counter. Resetting re-renders
/// the chat if it is showing the counter.
pub struct CounterApi;

#[async_trait]
impl ApiHandler for CounterApi {
    async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let chat = request
            .params
            .get("chat")
            .ok_or_else(|| ApiError::bad_request("missing chat"))?;
        let key = format!("{chat}:count");
        match request.method {
            ApiMethod::Delete => {
                request.storage.save_state(&key, "/counter", json!(0)).await?;
                Ok(ApiResponse::ok(json!({ "chat": chat, "count": 0 })))
            }
            _ => {
                let count = request
                    .storage
                    .restore_state(&key, "/counter")
                    .await?
                    .unwrap_or_else(|| json!(0));
                Ok(ApiResponse::ok(json!({ "chat": chat, "count": count })))
            }
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn catalog() -> ComponentCatalog {
    ComponentCatalog::new()
        .with_layout("root", RootLayout)
        .with_layout("users-frame", UsersLayout)
        .with_page("home", Home)
        .with_page("nested", Nested)
        .with_page("counter", Counter)
        .with_page("user-list", UserList)
        .with_page("user", User)
        .with_page("users-not-found", UsersNotFound)
        .with_page("redirect", MovedHome)
        .with_handler("health", Health)
        .with_handler("counter", CounterApi)
}

pub fn route_file() -> RouteFile {
    RouteFile {
        routes: vec![RouteInfo::new("/")
            .page("home")
            .layout("root")
            .metadata(RouteMetadata::menu_entry("Home").with_description("Start here"))
            .sub_route(
                RouteInfo::new("/home").sub_route(RouteInfo::new("/home/nested").page("nested")),
            )
            .sub_route(
                RouteInfo::new("/counter")
                    .page("counter")
                    .metadata(RouteMetadata::menu_entry("Counter")),
            )
            .sub_route(
                RouteInfo::new("/users")
                    .page("user-list")
                    .layout("users-frame")
                    .not_found("users-not-found")
                    .metadata(RouteMetadata::menu_entry("Users"))
                    .sub_route(RouteInfo::new("/users/[id]").page("user")),
            )
            .sub_route(RouteInfo::new("/redirect").page("redirect"))
            .sub_route(
                RouteInfo::new("/api")
                    .sub_route(RouteInfo::new("/api/health").api(ApiMethod::Get, "health"))
                    .sub_route(
                        RouteInfo::new("/api/counter/[chat]")
                            .api(ApiMethod::Get, "counter")
                            .api(ApiMethod::Delete, "counter"),
                    ),
            )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ChatIdentity, InboundEvent, RedirectOptions, RouteInput};
    use crate::config::CoreConfig;
    use crate::engine::{ConversationSession, Core};
    use crate::route::{RouteRegistry, Router};
    use crate::storage::MemoryStorage;
    use crate::testing::MockAdapter;
    use std::sync::Arc;

    fn core() -> Arc<Core<MockAdapter>> {
        let router =
            Router::init_from_routes(&route_file(), &catalog(), Arc::new(MemoryStorage::new()))
                .unwrap();
        Core::new(
            Arc::new(MockAdapter::new()),
            Arc::new(router),
            CoreConfig::default(),
        )
    }

    async fn send(
        core: &Core<MockAdapter>,
        session: &mut ConversationSession,
        text: &str,
    ) -> String {
        let event = InboundEvent::text(session.chat().clone(), text);
        core.redirect(session, RouteInput::Event(event), RedirectOptions::navigate())
            .await
            .unwrap();
        core.adapter().last_tree().unwrap().text_content()
    }

    #[test]
    fn test_demo_routes_file_matches() {
        let on_disk = RouteFile::from_json(include_str!("../demo/routes.json")).unwrap();
        assert_eq!(on_disk, route_file());
    }

    #[test]
    fn test_catalog_covers_routes() {
        let registry = RouteRegistry::build(&route_file(), &catalog()).unwrap();
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn test_counter_counts_messages() {
        let core = core();
        let mut session = ConversationSession::new(ChatIdentity::new("c1"));

        let text = send(&core, &mut session, "/counter").await;
        assert!(text.contains("Count: 0"));

        send(&core, &mut session, "+1").await;
        let text = send(&core, &mut session, "+1").await;
        assert!(text.contains("Count: 2"));
        assert!(text.contains("Visits: 1"));

        let text = send(&core, &mut session, "-1").await;
        assert!(text.contains("Count: 1"));
    }

    #[tokio::test]
    async fn test_layouts_wrap_user_pages() {
        let core = core();
        let mut session = ConversationSession::new(ChatIdentity::new("c1"));

        let text = send(&core, &mut session, "/users/2?tab=posts").await;
        assert!(text.contains("Users"));
        assert!(text.contains("User 2"));
        assert!(text.contains("Tab: posts"));
        assert!(text.contains("Menu:"));

        let text = send(&core, &mut session, "/users/2/extra").await;
        assert!(text.contains("No user page at /users/2/extra"));
    }

    #[tokio::test]
    async fn test_redirect_page_lands_home() {
        let core = core();
        let mut session = ConversationSession::new(ChatIdentity::new("c1"));
        let text = send(&core, &mut session, "/redirect").await;
        assert!(text.contains("Welcome to chatframe"));
        assert_eq!(session.current_route(), Some("/"));
    }

    #[tokio::test]
    async fn test_counter_api_reads_and_resets() {
        let core = core();
        let mut session = ConversationSession::new(ChatIdentity::new("c9"));
        send(&core, &mut session, "/counter").await;
        send(&core, &mut session, "+1").await;

        let found = core
            .router()
            .resolve_api("/api/counter/c9", ApiMethod::Get)
            .unwrap();
        let response = found
            .handler
            .value
            .handle(ApiRequest {
                method: ApiMethod::Get,
                path: "/api/counter/c9".into(),
                params: found.params,
                query: found.query,
                body: None,
                storage: Arc::clone(core.storage()),
            })
            .await
            .unwrap();
        assert_eq!(response.body["count"], json!(1));

        let found = core
            .router()
            .resolve_api("/api/counter/c9", ApiMethod::Delete)
            .unwrap();
        found
            .handler
            .value
            .handle(ApiRequest {
                method: ApiMethod::Delete,
                path: "/api/counter/c9".into(),
                params: found.params,
                query: found.query,
                body: None,
                storage: Arc::clone(core.storage()),
            })
            .await
            .unwrap();
        let stored = core
            .storage()
            .restore_state("c9:count", "/counter")
            .await
            .unwrap();
        assert_eq!(stored, Some(json!(0)));
    }
}
