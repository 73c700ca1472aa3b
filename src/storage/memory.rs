//! In-process storage backend

use super::{route_topic, state_topic, ChangeCallback, ListenerMap, Storage, StorageResult, Subscription};
use crate::route::StoredRoute;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Maps behind mutexes. An optional delay is awaited before every
/// operation to imitate a remote store.
#[derive(Default)]
pub struct MemoryStorage {
    states: Mutex<HashMap<(String, String), Value>>,
    routes: Mutex<HashMap<String, StoredRoute>>,
    history: Mutex<HashMap<String, StoredRoute>>,
    listeners: ListenerMap,
    delay: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn listeners(&self) -> &ListenerMap {
        &self.listeners
    }
}

fn state_slot(key: &str, route: &str) -> (String, String) {
    (key.to_string(), route.to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_state(&self, key: &str, route: &str, value: Value) -> StorageResult<()> {
        self.simulate_latency().await;
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state_slot(key, route), value);
        self.listeners.notify(&state_topic(key, route));
        Ok(())
    }

    async fn restore_state(&self, key: &str, route: &str) -> StorageResult<Option<Value>> {
        self.simulate_latency().await;
        Ok(self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&state_slot(key, route))
            .cloned())
    }

    async fn delete_state(&self, key: &str, route: &str) -> StorageResult<()> {
        self.simulate_latency().await;
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&state_slot(key, route));
        self.listeners.notify(&state_topic(key, route));
        Ok(())
    }

    async fn save_route(&self, key: &str, route: &StoredRoute) -> StorageResult<()> {
        self.simulate_latency().await;
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), route.clone());
        self.listeners.notify(&route_topic(key));
        Ok(())
    }

    async fn restore_route(&self, key: &str) -> StorageResult<Option<StoredRoute>> {
        self.simulate_latency().await;
        Ok(self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn add_history(&self, key: &str, route: &StoredRoute) -> StorageResult<()> {
        self.simulate_latency().await;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), route.clone());
        Ok(())
    }

    async fn restore_history(&self, key: &str) -> StorageResult<Option<StoredRoute>> {
        self.simulate_latency().await;
        Ok(self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn delete_history(&self, key: &str) -> StorageResult<()> {
        self.simulate_latency().await;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn subscribe_state_change(
        &self,
        key: &str,
        route: &str,
        callback: ChangeCallback,
    ) -> Subscription {
        self.listeners.subscribe(state_topic(key, route), callback)
    }

    fn subscribe_route_change(&self, key: &str, callback: ChangeCallback) -> Subscription {
        self.listeners.subscribe(route_topic(key), callback)
    }
}
