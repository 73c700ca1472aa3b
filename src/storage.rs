//! Storage contract for route pointers, component state and history
//!
//! Three independent key spaces are kept per conversation key:
//! - the active [`StoredRoute`]
//! - component state, scoped by `(key, route)`
//! - a single history slot holding the most recently left route

mod listeners;
mod memory;
mod sqlite;

pub use listeners::{ChangeCallback, ListenerMap, Subscription};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::route::StoredRoute;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Store component state and notify subscribers of `(key, route)`
    async fn save_state(&self, key: &str, route: &str, value: Value) -> StorageResult<()>;

    async fn restore_state(&self, key: &str, route: &str) -> StorageResult<Option<Value>>;

    /// Remove component state and notify subscribers of `(key, route)`
    async fn delete_state(&self, key: &str, route: &str) -> StorageResult<()>;

    /// Overwrite the active route and notify route subscribers of `key`
    async fn save_route(&self, key: &str, route: &StoredRoute) -> StorageResult<()>;

    async fn restore_route(&self, key: &str) -> StorageResult<Option<StoredRoute>>;

    /// Replace the single history entry of `key`
    async fn add_history(&self, key: &str, route: &StoredRoute) -> StorageResult<()>;

    async fn restore_history(&self, key: &str) -> StorageResult<Option<StoredRoute>>;

    async fn delete_history(&self, key: &str) -> StorageResult<()>;

    fn subscribe_state_change(
        &self,
        key: &str,
        route: &str,
        callback: ChangeCallback,
    ) -> Subscription;

    fn subscribe_route_change(&self, key: &str, callback: ChangeCallback) -> Subscription;
}

pub(crate) fn state_topic(key: &str, route: &str) -> String {
    format!("state\u{1f}{key}\u{1f}{route}")
}

pub(crate) fn route_topic(key: &str) -> String {
    format!("route\u{1f}{key}")
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn save_state(&self, key: &str, route: &str, value: Value) -> StorageResult<()> {
        (**self).save_state(key, route, value).await
    }

    async fn restore_state(&self, key: &str, route: &str) -> StorageResult<Option<Value>> {
        (**self).restore_state(key, route).await
    }

    async fn delete_state(&self, key: &str, route: &str) -> StorageResult<()> {
        (**self).delete_state(key, route).await
    }

    async fn save_route(&self, key: &str, route: &StoredRoute) -> StorageResult<()> {
        (**self).save_route(key, route).await
    }

    async fn restore_route(&self, key: &str) -> StorageResult<Option<StoredRoute>> {
        (**self).restore_route(key).await
    }

    async fn add_history(&self, key: &str, route: &StoredRoute) -> StorageResult<()> {
        (**self).add_history(key, route).await
    }

    async fn restore_history(&self, key: &str) -> StorageResult<Option<StoredRoute>> {
        (**self).restore_history(key).await
    }

    async fn delete_history(&self, key: &str) -> StorageResult<()> {
        (**self).delete_history(key).await
    }

    fn subscribe_state_change(
        &self,
        key: &str,
        route: &str,
        callback: ChangeCallback,
    ) -> Subscription {
        (**self).subscribe_state_change(key, route, callback)
    }

    fn subscribe_route_change(&self, key: &str, callback: ChangeCallback) -> Subscription {
        (**self).subscribe_route_change(key, callback)
    }
}
