//! Route registry, matching and per-conversation navigation
//!
//! Route metadata (JSON or built in code) is compiled once into an immutable
//! [`RouteRegistry`]. The [`Router`] resolves paths against it and keeps the
//! active [`StoredRoute`] for every conversation key in storage.

mod matching;
mod metadata;
mod query;
mod registry;
mod router;

pub use matching::{MatchKind, MatchedRoute};
pub use metadata::{ApiMethod, Menu, RouteFile, RouteInfo, RouteMetadata};
pub use query::{parse_query, path_segments, split_path, QueryMap, QueryValue};
pub use registry::{Named, RegistryError, RouteNode, RouteRegistry, Segment};
pub use router::{ApiMatch, RenderedComponent, Router};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Path rendered when a conversation has no stored route yet
pub const ROOT_ROUTE: &str = "/";

/// What a stored route points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Page,
    #[serde(rename = "404")]
    NotFound,
    Error,
    Layout,
    Api,
}

impl RouteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::NotFound => "404",
            Self::Error => "error",
            Self::Layout => "layout",
            Self::Api => "api",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "page" => Some(Self::Page),
            "404" => Some(Self::NotFound),
            "error" => Some(Self::Error),
            "layout" => Some(Self::Layout),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active route of one conversation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRoute {
    pub route: String,
    #[serde(rename = "type")]
    pub kind: RouteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,
}

impl StoredRoute {
    pub fn new(route: impl Into<String>, kind: RouteKind) -> Self {
        Self {
            route: route.into(),
            kind,
            props: None,
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_ROUTE, RouteKind::Page)
    }

    pub fn with_props(mut self, props: serde_json::Value) -> Self {
        self.props = Some(props);
        self
    }
}
