//! Compiled, immutable route tree

use super::metadata::{ApiMethod, RouteFile, RouteInfo, RouteMetadata};
use crate::component::{
    defaults, ApiHandler, Component, ComponentCatalog, Layout, DEFAULT_ERROR, DEFAULT_NOT_FOUND,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Malformed route metadata: {0}")]
    Malformed(String),
    #[error("Cannot read route metadata {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("Invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Route {pattern} declares parameter [{name}] more than once")]
    DuplicateParam { pattern: String, name: String },
    #[error("Route {child} is nested under {parent} but does not extend its pattern")]
    NotNested { parent: String, child: String },
    #[error("Route {0} is declared twice at the same level")]
    DuplicateRoute(String),
    #[error("Route {pattern} references unknown {kind} {name:?}")]
    UnknownComponent {
        pattern: String,
        kind: &'static str,
        name: String,
    },
    #[error("Route {pattern} declares unsupported api method {method:?}")]
    UnknownMethod { pattern: String, method: String },
}

/// One compiled path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `[name]`
    Dynamic(String),
}

impl Segment {
    fn parse(pattern: &str, raw: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if let Some(name) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            if name.is_empty() {
                return Err(invalid("empty parameter name"));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(invalid("parameter names may only use [A-Za-z0-9_-]"));
            }
            return Ok(Self::Dynamic(name.to_string()));
        }
        if raw.contains(['[', ']', '?', '#']) {
            return Err(invalid("unexpected character in literal segment"));
        }
        Ok(Self::Literal(raw.to_string()))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Whether this segment accepts the given path segment
    pub fn accepts(&self, segment: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == segment,
            Self::Dynamic(_) => true,
        }
    }
}

/// A catalog entry together with the name it was registered under.
pub struct Named<T: ?Sized> {
    pub name: String,
    pub value: Arc<T>,
}

impl<T: ?Sized> Clone for Named<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Named<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Named({})", self.name)
    }
}

#[derive(Debug)]
pub struct RouteNode {
    pub pattern: String,
    segments: Vec<Segment>,
    /// Number of trailing segments this node adds to its parent's pattern
    local_len: usize,
    pub page: Option<Named<dyn Component>>,
    pub not_found: Option<Named<dyn Component>>,
    pub error: Option<Named<dyn Component>>,
    pub layouts: Vec<Named<dyn Layout>>,
    pub api: BTreeMap<ApiMethod, Named<dyn ApiHandler>>,
    pub metadata: RouteMetadata,
    pub sub_routes: Vec<Arc<RouteNode>>,
}

impl RouteNode {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments beyond the parent's pattern
    pub fn local_segments(&self) -> &[Segment] {
        let start = self.segments.len() - self.local_len;
        &self.segments[start..]
    }

    pub fn is_dynamic_segment(&self) -> Vec<bool> {
        self.segments.iter().map(Segment::is_dynamic).collect()
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Dynamic(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Adds no segments of its own (a route group or the `/` route).
    pub fn is_passthrough(&self) -> bool {
        self.local_len == 0
    }

    fn synthetic_root(sub_routes: Vec<Arc<RouteNode>>) -> Self {
        Self {
            pattern: String::new(),
            segments: Vec::new(),
            local_len: 0,
            page: None,
            not_found: None,
            error: None,
            layouts: Vec::new(),
            api: BTreeMap::new(),
            metadata: RouteMetadata::default(),
            sub_routes,
        }
    }
}

/// The compiled route tree plus the built-in fallback pages.
#[derive(Debug)]
pub struct RouteRegistry {
    root: Arc<RouteNode>,
    default_not_found: Named<dyn Component>,
    default_error: Named<dyn Component>,
    len: usize,
}

impl RouteRegistry {
    /// Compile route metadata against a component catalog. Any unknown
    /// reference or malformed pattern fails the whole build.
    pub fn build(file: &RouteFile, catalog: &ComponentCatalog) -> Result<Self, RegistryError> {
        let mut len = 0;
        let top = compile_children(&file.routes, &[], "/", catalog, &mut len)?;
        Ok(Self {
            root: Arc::new(RouteNode::synthetic_root(top)),
            default_not_found: Named {
                name: DEFAULT_NOT_FOUND.to_string(),
                value: catalog
                    .component(DEFAULT_NOT_FOUND)
                    .unwrap_or_else(|| Arc::new(defaults::DefaultNotFound)),
            },
            default_error: Named {
                name: DEFAULT_ERROR.to_string(),
                value: catalog
                    .component(DEFAULT_ERROR)
                    .unwrap_or_else(|| Arc::new(defaults::DefaultError)),
            },
            len,
        })
    }

    /// Synthetic root holding the top-level routes. It has no pattern and
    /// no pages of its own.
    pub fn root(&self) -> &Arc<RouteNode> {
        &self.root
    }

    pub fn routes(&self) -> &[Arc<RouteNode>] {
        &self.root.sub_routes
    }

    pub fn default_not_found(&self) -> &Named<dyn Component> {
        &self.default_not_found
    }

    pub fn default_error(&self) -> &Named<dyn Component> {
        &self.default_error
    }

    /// Number of declared routes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn compile_children(
    infos: &[RouteInfo],
    parent_segments: &[Segment],
    parent_pattern: &str,
    catalog: &ComponentCatalog,
    count: &mut usize,
) -> Result<Vec<Arc<RouteNode>>, RegistryError> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(infos.len());
    for info in infos {
        if !seen.insert(info.route.as_str()) {
            return Err(RegistryError::DuplicateRoute(info.route.clone()));
        }
        nodes.push(compile_node(info, parent_segments, parent_pattern, catalog, count)?);
    }
    Ok(nodes)
}

fn compile_node(
    info: &RouteInfo,
    parent_segments: &[Segment],
    parent_pattern: &str,
    catalog: &ComponentCatalog,
    count: &mut usize,
) -> Result<Arc<RouteNode>, RegistryError> {
    let pattern = info.route.as_str();
    if !pattern.starts_with('/') {
        return Err(RegistryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "must start with '/'".to_string(),
        });
    }

    let segments = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| Segment::parse(pattern, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut params = HashSet::new();
    for name in segments.iter().filter_map(|s| match s {
        Segment::Dynamic(name) => Some(name),
        Segment::Literal(_) => None,
    }) {
        if !params.insert(name) {
            return Err(RegistryError::DuplicateParam {
                pattern: pattern.to_string(),
                name: name.clone(),
            });
        }
    }

    if segments.len() < parent_segments.len() || segments[..parent_segments.len()] != *parent_segments
    {
        return Err(RegistryError::NotNested {
            parent: parent_pattern.to_string(),
            child: pattern.to_string(),
        });
    }

    let component = |kind: &'static str, name: &Option<String>| {
        name.as_ref()
            .map(|name| {
                catalog
                    .component(name)
                    .map(|value| Named {
                        name: name.clone(),
                        value,
                    })
                    .ok_or_else(|| RegistryError::UnknownComponent {
                        pattern: pattern.to_string(),
                        kind,
                        name: name.clone(),
                    })
            })
            .transpose()
    };
    let page = component("page", &info.page)?;
    let not_found = component("404 page", &info.not_found)?;
    let error = component("error page", &info.error)?;

    let layouts = info
        .layouts
        .iter()
        .map(|name| {
            catalog
                .layout(name)
                .map(|value| Named {
                    name: name.clone(),
                    value,
                })
                .ok_or_else(|| RegistryError::UnknownComponent {
                    pattern: pattern.to_string(),
                    kind: "layout",
                    name: name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut api = BTreeMap::new();
    for (method, name) in &info.api {
        let parsed = ApiMethod::parse(method).ok_or_else(|| RegistryError::UnknownMethod {
            pattern: pattern.to_string(),
            method: method.clone(),
        })?;
        let value = catalog
            .handler(name)
            .ok_or_else(|| RegistryError::UnknownComponent {
                pattern: pattern.to_string(),
                kind: "api handler",
                name: name.clone(),
            })?;
        api.insert(
            parsed,
            Named {
                name: name.clone(),
                value,
            },
        );
    }

    *count += 1;
    let sub_routes = compile_children(&info.sub_routes, &segments, pattern, catalog, count)?;

    Ok(Arc::new(RouteNode {
        pattern: pattern.to_string(),
        local_len: segments.len() - parent_segments.len(),
        segments,
        page,
        not_found,
        error,
        layouts,
        api,
        metadata: info.metadata.clone().unwrap_or_default(),
        sub_routes,
    }))
}
