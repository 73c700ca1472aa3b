//! Router: path resolution plus the per-key active route

use super::matching::{self, MatchKind, MatchedRoute};
use super::metadata::{ApiMethod, Menu, RouteFile};
use super::query::QueryMap;
use super::registry::{Named, RegistryError, RouteNode, RouteRegistry};
use super::{RouteKind, StoredRoute};
use crate::component::{ApiHandler, Component, ComponentCatalog, Layout};
use crate::storage::{Storage, StorageError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// A resolved page ready to be evaluated
#[derive(Debug, Clone)]
pub struct RenderedComponent {
    pub matched: MatchedRoute,
    pub component: Named<dyn Component>,
    /// Outermost first
    pub layouts: Vec<Named<dyn Layout>>,
    pub kind: RouteKind,
    pub props: Option<serde_json::Value>,
    /// The stored route string, query included
    pub current_route: String,
}

impl RenderedComponent {
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.matched.params
    }

    pub fn query(&self) -> &QueryMap {
        &self.matched.query
    }

    /// Path without the query string; component state is scoped to it
    pub fn path(&self) -> &str {
        &self.matched.path
    }
}

/// An api handler bound to the path it was resolved from
#[derive(Debug, Clone)]
pub struct ApiMatch {
    pub handler: Named<dyn ApiHandler>,
    pub node: Arc<RouteNode>,
    pub params: BTreeMap<String, String>,
    pub query: QueryMap,
}

pub struct Router {
    registry: Arc<RouteRegistry>,
    storage: Arc<dyn Storage>,
}

impl Router {
    /// Build from route metadata already in memory
    pub fn init_from_routes(
        routes: &RouteFile,
        catalog: &ComponentCatalog,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, RegistryError> {
        let registry = RouteRegistry::build(routes, catalog)?;
        tracing::info!(routes = registry.len(), "Route registry compiled");
        Ok(Self::with_registry(Arc::new(registry), storage))
    }

    /// Load route metadata from a JSON file
    pub fn init(
        metadata_path: impl AsRef<Path>,
        catalog: &ComponentCatalog,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, RegistryError> {
        let routes = RouteFile::load(metadata_path)?;
        Self::init_from_routes(&routes, catalog, storage)
    }

    pub fn with_registry(registry: Arc<RouteRegistry>, storage: Arc<dyn Storage>) -> Self {
        Self { registry, storage }
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Never fails: unmatched paths resolve to a 404 page.
    pub fn resolve(&self, path: &str) -> MatchedRoute {
        matching::resolve(&self.registry, path)
    }

    /// Every layout declared along the matched chain, outermost first
    pub fn compose_layouts(&self, matched: &MatchedRoute) -> Vec<Named<dyn Layout>> {
        matched
            .chain
            .iter()
            .flat_map(|node| node.layouts.iter().cloned())
            .collect()
    }

    /// Resolve `path` and make it the active route for `key`.
    pub async fn navigate_to(&self, key: &str, path: &str) -> Result<StoredRoute, StorageError> {
        let matched = self.resolve(path);
        let kind = match matched.kind {
            MatchKind::Page => RouteKind::Page,
            MatchKind::NotFound => RouteKind::NotFound,
        };
        let stored = StoredRoute::new(path, kind);
        self.storage.save_route(key, &stored).await?;
        tracing::debug!(key = %key, route = %path, kind = %kind, "Route stored");
        Ok(stored)
    }

    /// Restore the active route for `key` (the root when none is stored)
    /// and resolve it again.
    pub async fn render(&self, key: &str) -> Result<RenderedComponent, StorageError> {
        let stored = self
            .storage
            .restore_route(key)
            .await?
            .unwrap_or_else(StoredRoute::root);
        Ok(self.rendered_for(stored))
    }

    pub fn rendered_for(&self, stored: StoredRoute) -> RenderedComponent {
        if stored.kind == RouteKind::Error {
            let mut rendered = self.resolve_error(&stored.route);
            rendered.props = stored.props;
            return rendered;
        }
        let matched = self.resolve(&stored.route);
        let kind = match matched.kind {
            MatchKind::Page => RouteKind::Page,
            MatchKind::NotFound => RouteKind::NotFound,
        };
        RenderedComponent {
            layouts: self.compose_layouts(&matched),
            component: matched.component.clone(),
            matched,
            kind,
            props: stored.props,
            current_route: stored.route,
        }
    }

    pub async fn route_from_key(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.storage.restore_route(key).await?.map(|stored| stored.route))
    }

    /// Routes flagged `includeInMenu`, nested like the registry.
    /// Routes with dynamic segments are left out.
    pub fn menus(&self) -> Vec<Menu> {
        collect_menus(self.registry.routes())
    }

    pub fn resolve_api(&self, path: &str, method: ApiMethod) -> Option<ApiMatch> {
        let (node, params, query) = matching::resolve_api(&self.registry, path, method)?;
        let handler = node.api.get(&method)?.clone();
        Some(ApiMatch {
            handler,
            node,
            params,
            query,
        })
    }

    /// The error page closest to `path`, or the built-in one.
    pub fn resolve_error(&self, path: &str) -> RenderedComponent {
        let matched = self.resolve(path);
        let nearest = matched
            .chain
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, node)| node.error.clone().map(|page| (i, page)));
        let (component, layouts) = match nearest {
            Some((i, page)) => (
                page,
                matched.chain[..=i]
                    .iter()
                    .flat_map(|node| node.layouts.iter().cloned())
                    .collect(),
            ),
            None => (
                self.registry.default_error().clone(),
                self.compose_layouts(&matched),
            ),
        };
        RenderedComponent {
            component,
            layouts,
            kind: RouteKind::Error,
            props: None,
            current_route: path.to_string(),
            matched,
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.registry.len())
            .finish_non_exhaustive()
    }
}

fn collect_menus(nodes: &[Arc<RouteNode>]) -> Vec<Menu> {
    let mut menus = Vec::new();
    for node in nodes {
        let children = collect_menus(&node.sub_routes);
        let dynamic = node.segments().iter().any(|s| s.is_dynamic());
        if node.metadata.in_menu() && !dynamic {
            menus.push(Menu {
                name: node
                    .metadata
                    .title
                    .clone()
                    .unwrap_or_else(|| node.pattern.clone()),
                description: node.metadata.description.clone(),
                href: node.pattern.clone(),
                children,
            });
        } else {
            menus.extend(children);
        }
    }
    menus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{RouteInfo, RouteMetadata};
    use crate::storage::MemoryStorage;
    use crate::testing::test_catalog;
    use std::io::Write;

    fn router() -> Router {
        let routes = RouteFile {
            routes: vec![RouteInfo::new("/")
                .page("home")
                .layout("outer")
                .error("oops")
                .metadata(RouteMetadata::menu_entry("Home"))
                .sub_route(
                    RouteInfo::new("/users")
                        .page("static")
                        .layout("inner")
                        .not_found("missing")
                        .metadata(RouteMetadata::menu_entry("Users").with_description("All users"))
                        .sub_route(
                            RouteInfo::new("/users/[id]")
                                .page("echo")
                                .metadata(RouteMetadata::menu_entry("One user")),
                        ),
                )
                .sub_route(
                    RouteInfo::new("/settings")
                        .sub_route(
                            RouteInfo::new("/settings/profile")
                                .page("static")
                                .metadata(RouteMetadata::menu_entry("Profile")),
                        ),
                )],
        };
        Router::init_from_routes(&routes, &test_catalog(), Arc::new(MemoryStorage::new())).unwrap()
    }

    #[test]
    fn test_layouts_compose_outermost_first() {
        let router = router();
        let matched = router.resolve("/users/9");
        let names: Vec<_> = router
            .compose_layouts(&matched)
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_render_defaults_to_root() {
        let router = router();
        let rendered = router.render("chat-1").await.unwrap();
        assert_eq!(rendered.current_route, "/");
        assert_eq!(rendered.component.name, "home");
        assert_eq!(rendered.kind, RouteKind::Page);
    }

    #[tokio::test]
    async fn test_navigate_then_render_round_trip() {
        let router = router();
        router.navigate_to("chat-1", "/users/42?tab=posts").await.unwrap();

        let rendered = router.render("chat-1").await.unwrap();
        assert_eq!(rendered.current_route, "/users/42?tab=posts");
        assert_eq!(rendered.path(), "/users/42");
        assert_eq!(rendered.params()["id"], "42");
        assert!(rendered.query().contains_key("tab"));

        // other keys are untouched
        assert_eq!(router.render("chat-2").await.unwrap().current_route, "/");
    }

    #[tokio::test]
    async fn test_navigate_is_idempotent() {
        let router = router();
        let first = router.navigate_to("k", "/users").await.unwrap();
        let second = router.navigate_to("k", "/users").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            router.storage().restore_route("k").await.unwrap(),
            Some(second)
        );
    }

    #[tokio::test]
    async fn test_navigate_to_missing_stores_404() {
        let router = router();
        let stored = router.navigate_to("k", "/users/1/x").await.unwrap();
        assert_eq!(stored.kind, RouteKind::NotFound);

        let rendered = router.render("k").await.unwrap();
        assert_eq!(rendered.component.name, "missing");
        assert_eq!(rendered.kind, RouteKind::NotFound);
    }

    #[tokio::test]
    async fn test_route_from_key() {
        let router = router();
        assert_eq!(router.route_from_key("k").await.unwrap(), None);
        router.navigate_to("k", "/users").await.unwrap();
        assert_eq!(router.route_from_key("k").await.unwrap().as_deref(), Some("/users"));
    }

    #[test]
    fn test_menus_follow_registry_nesting() {
        let menus = router().menus();
        assert_eq!(menus.len(), 1);
        let home = &menus[0];
        assert_eq!(home.name, "Home");
        assert_eq!(home.href, "/");

        let hrefs: Vec<_> = home.children.iter().map(|m| m.href.as_str()).collect();
        // "/settings" is not a menu entry, its child is lifted; "/users/[id]" is dynamic
        assert_eq!(hrefs, vec!["/users", "/settings/profile"]);
        assert_eq!(home.children[0].description.as_deref(), Some("All users"));
        assert!(home.children[0].children.is_empty());
    }

    #[test]
    fn test_resolve_error_nearest_and_default() {
        let router = router();
        let rendered = router.resolve_error("/users/3");
        assert_eq!(rendered.component.name, "oops");
        assert_eq!(rendered.kind, RouteKind::Error);
        let names: Vec<_> = rendered.layouts.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["outer"]);

        let bare = Router::init_from_routes(
            &RouteFile {
                routes: vec![RouteInfo::new("/").page("home")],
            },
            &test_catalog(),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap();
        assert_eq!(bare.resolve_error("/").component.name, "default-error");
    }

    #[test]
    fn test_init_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"routes": [{{"route": "/", "page": "home"}}]}}"#).unwrap();
        let router = Router::init(file.path(), &test_catalog(), Arc::new(MemoryStorage::new()))
            .unwrap();
        assert_eq!(router.registry().len(), 1);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "{{\"routes\": [").unwrap();
        let err = Router::init(bad.path(), &test_catalog(), Arc::new(MemoryStorage::new()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Malformed(_)));

        let err = Router::init(
            "/nonexistent/routes.json",
            &test_catalog(),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::Unreadable { .. }));
    }

    #[test]
    fn test_resolve_api_binds_params() {
        let routes = RouteFile {
            routes: vec![RouteInfo::new("/api/items/[id]").api(ApiMethod::Get, "health")],
        };
        let router =
            Router::init_from_routes(&routes, &test_catalog(), Arc::new(MemoryStorage::new()))
                .unwrap();
        let found = router.resolve_api("/api/items/5?full", ApiMethod::Get).unwrap();
        assert_eq!(found.handler.name, "health");
        assert_eq!(found.params["id"], "5");
        assert!(found.query.contains_key("full"));
    }
}
