//! Component, layout and api handler contracts
//!
//! Pages and layouts are evaluated with an explicit [`RenderContext`] rather
//! than ambient state: everything a component may touch (storage, navigation,
//! the chat it renders for, the raw inbound text) hangs off the context.

mod catalog;
mod context;
pub mod defaults;

pub use catalog::{
    ComponentCatalog, DEFAULT_ERROR, DEFAULT_NOT_FOUND, DEFAULT_PAGE, PASSTHROUGH_LAYOUT,
};
pub use context::{PageProps, RenderContext};

use crate::error::RenderError;
use crate::route::{ApiMethod, QueryMap};
use crate::storage::Storage;
use crate::vdom::Node;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// A page: the leaf of a rendered route
#[async_trait]
pub trait Component: Send + Sync {
    async fn render(&self, ctx: &RenderContext, props: &PageProps) -> Result<Node, RenderError>;

    /// Runs after the page is committed for a route it was not showing
    /// before. State written here schedules a re-render.
    async fn mounted(&self, _ctx: &RenderContext, _props: &PageProps) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Wraps the tree produced by everything nested below it
#[async_trait]
pub trait Layout: Send + Sync {
    async fn render(&self, ctx: &RenderContext, children: Node) -> Result<Node, RenderError>;
}

#[async_trait]
pub trait ApiHandler: Send + Sync {
    async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

pub struct ApiRequest {
    pub method: ApiMethod,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub query: QueryMap,
    pub body: Option<Value>,
    pub storage: Arc<dyn Storage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
        }
    }
}

impl From<crate::storage::StorageError> for ApiError {
    fn from(e: crate::storage::StorageError) -> Self {
        Self::internal(e.to_string())
    }
}
