//! Explicit render context and page props

use crate::adapter::ChatIdentity;
use crate::error::RenderError;
use crate::route::{QueryMap, RenderedComponent, Router, StoredRoute};
use crate::storage::Storage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Inputs of one page evaluation
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageProps {
    pub params: BTreeMap<String, String>,
    pub query: QueryMap,
    /// Raw text (or callback data) of the inbound message that triggered
    /// this render, if any
    pub text: Option<String>,
    /// Props stored alongside the route
    pub props: Option<Value>,
    pub current_route: String,
}

impl PageProps {
    pub fn from_rendered(rendered: &RenderedComponent, text: Option<String>) -> Self {
        Self {
            params: rendered.params().clone(),
            query: rendered.query().clone(),
            text,
            props: rendered.props.clone(),
            current_route: rendered.current_route.clone(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_str(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(|v| v.as_str())
    }
}

/// Everything a component may reach while rendering one session.
///
/// State read through the context is recorded; after the render commits the
/// session subscribes to exactly those state slots.
pub struct RenderContext {
    route_key: String,
    chat: ChatIdentity,
    text: Option<String>,
    current_route: String,
    state_route: String,
    router: Arc<Router>,
    read_state: Mutex<BTreeSet<String>>,
}

impl RenderContext {
    pub fn new(
        route_key: impl Into<String>,
        chat: ChatIdentity,
        text: Option<String>,
        rendered: &RenderedComponent,
        router: Arc<Router>,
    ) -> Self {
        Self {
            route_key: route_key.into(),
            chat,
            text,
            current_route: rendered.current_route.clone(),
            state_route: rendered.path().to_string(),
            router,
            read_state: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    pub fn chat(&self) -> &ChatIdentity {
        &self.chat
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn current_route(&self) -> &str {
        &self.current_route
    }

    /// Route under which component state is stored (path without query)
    pub fn state_route(&self) -> &str {
        &self.state_route
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.router.storage()
    }

    /// Storage key of a named state slot, scoped to this conversation
    pub fn state_key(&self, name: &str) -> String {
        format!("{}:{name}", self.route_key)
    }

    fn record_read(&self, state_key: &str) {
        self.read_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state_key.to_string());
    }

    pub async fn state<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, RenderError> {
        let key = self.state_key(name);
        self.record_read(&key);
        let value = self.storage().restore_state(&key, &self.state_route).await?;
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    pub async fn state_or<T: DeserializeOwned>(
        &self,
        name: &str,
        default: T,
    ) -> Result<T, RenderError> {
        Ok(self.state(name).await?.unwrap_or(default))
    }

    pub async fn set_state<T: Serialize + Sync + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<(), RenderError> {
        let json = serde_json::to_value(value)?;
        self.storage()
            .save_state(&self.state_key(name), &self.state_route, json)
            .await?;
        Ok(())
    }

    pub async fn clear_state(&self, name: &str) -> Result<(), RenderError> {
        self.storage()
            .delete_state(&self.state_key(name), &self.state_route)
            .await?;
        Ok(())
    }

    /// Change this conversation's route without rendering it now. The
    /// session picks the change up on its next render.
    pub async fn navigate(&self, path: &str) -> Result<StoredRoute, RenderError> {
        Ok(self.router.navigate_to(&self.route_key, path).await?)
    }

    /// Build the redirect signal. Return it from `render` to move the
    /// conversation to `path` instead of committing this page.
    pub fn redirect(&self, path: impl Into<String>) -> RenderError {
        RenderError::redirect(path)
    }

    /// State keys read during this render
    pub fn read_state_keys(&self) -> Vec<String> {
        self.read_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
