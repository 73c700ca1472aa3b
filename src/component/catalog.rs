//! Name to implementation lookup used when compiling route metadata

use super::defaults::{DefaultError, DefaultNotFound, DefaultPage, PassthroughLayout};
use super::{ApiHandler, Component, Layout};
use std::collections::HashMap;
use std::sync::Arc;

/// Built-in names, always registered
pub const DEFAULT_PAGE: &str = "default-page";
pub const DEFAULT_NOT_FOUND: &str = "default-404";
pub const DEFAULT_ERROR: &str = "default-error";
pub const PASSTHROUGH_LAYOUT: &str = "passthrough";

#[derive(Clone)]
pub struct ComponentCatalog {
    pages: HashMap<String, Arc<dyn Component>>,
    layouts: HashMap<String, Arc<dyn Layout>>,
    handlers: HashMap<String, Arc<dyn ApiHandler>>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        let mut catalog = Self {
            pages: HashMap::new(),
            layouts: HashMap::new(),
            handlers: HashMap::new(),
        };
        catalog.register_page(DEFAULT_PAGE, Arc::new(DefaultPage));
        catalog.register_page(DEFAULT_NOT_FOUND, Arc::new(DefaultNotFound));
        catalog.register_page(DEFAULT_ERROR, Arc::new(DefaultError));
        catalog.register_layout(PASSTHROUGH_LAYOUT, Arc::new(PassthroughLayout));
        catalog
    }

    #[must_use]
    pub fn with_page(mut self, name: impl Into<String>, page: impl Component + 'static) -> Self {
        self.register_page(name, Arc::new(page));
        self
    }

    #[must_use]
    pub fn with_layout(mut self, name: impl Into<String>, layout: impl Layout + 'static) -> Self {
        self.register_layout(name, Arc::new(layout));
        self
    }

    #[must_use]
    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: impl ApiHandler + 'static,
    ) -> Self {
        self.register_handler(name, Arc::new(handler));
        self
    }

    /// Pages, 404 pages and error pages share one namespace.
    pub fn register_page(&mut self, name: impl Into<String>, page: Arc<dyn Component>) {
        self.pages.insert(name.into(), page);
    }

    pub fn register_layout(&mut self, name: impl Into<String>, layout: Arc<dyn Layout>) {
        self.layouts.insert(name.into(), layout);
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn ApiHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.pages.get(name).cloned()
    }

    pub fn layout(&self, name: &str) -> Option<Arc<dyn Layout>> {
        self.layouts.get(name).cloned()
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ApiHandler>> {
        self.handlers.get(name).cloned()
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut pages: Vec<_> = self.pages.keys().collect();
        pages.sort();
        let mut layouts: Vec<_> = self.layouts.keys().collect();
        layouts.sort();
        f.debug_struct("ComponentCatalog")
            .field("pages", &pages)
            .field("layouts", &layouts)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{RouteFile, RouteInfo, RouteRegistry};

    #[test]
    fn test_builtins_are_addressable_from_metadata() {
        let routes = RouteFile {
            routes: vec![RouteInfo::new("/")
                .page(DEFAULT_PAGE)
                .layout(PASSTHROUGH_LAYOUT)
                .not_found(DEFAULT_NOT_FOUND)
                .error(DEFAULT_ERROR)],
        };
        let registry = RouteRegistry::build(&routes, &ComponentCatalog::new()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_misses() {
        let catalog = ComponentCatalog::new();
        assert!(catalog.component("nope").is_none());
        assert!(catalog.layout("nope").is_none());
        assert!(catalog.handler("nope").is_none());
    }
}
