//! SQLite storage backend

use super::{
    route_topic, state_topic, ChangeCallback, ListenerMap, Storage, StorageError, StorageResult,
    Subscription,
};
use crate::route::{RouteKind, StoredRoute};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS component_state (
    state_key TEXT NOT NULL,
    route TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (state_key, route)
);

CREATE TABLE IF NOT EXISTS active_routes (
    route_key TEXT PRIMARY KEY,
    route TEXT NOT NULL,
    kind TEXT NOT NULL,
    props TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS route_history (
    route_key TEXT PRIMARY KEY,
    route TEXT NOT NULL,
    kind TEXT NOT NULL,
    props TEXT,
    updated_at TEXT NOT NULL
);
";

/// Thread-safe database handle. Change listeners are in-process only.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    listeners: ListenerMap,
}

enum RouteTable {
    Active,
    History,
}

impl RouteTable {
    fn name(&self) -> &'static str {
        match self {
            Self::Active => "active_routes",
            Self::History => "route_history",
        }
    }
}

impl SqliteStorage {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            listeners: ListenerMap::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_route(&self, table: &RouteTable, key: &str, route: &StoredRoute) -> StorageResult<()> {
        let props = route.props.as_ref().map(serde_json::to_string).transpose()?;
        self.conn().execute(
            &format!(
                "INSERT OR REPLACE INTO {} (route_key, route, kind, props, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                table.name()
            ),
            params![
                key,
                route.route,
                route.kind.as_str(),
                props,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn read_route(&self, table: &RouteTable, key: &str) -> StorageResult<Option<StoredRoute>> {
        let row: Option<(String, String, Option<String>)> = self
            .conn()
            .query_row(
                &format!(
                    "SELECT route, kind, props FROM {} WHERE route_key = ?1",
                    table.name()
                ),
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((route, kind, props)) = row else {
            return Ok(None);
        };
        let kind = RouteKind::parse(&kind).ok_or_else(|| StorageError::Corrupt {
            key: key.to_string(),
            reason: format!("unknown route kind {kind:?}"),
        })?;
        let props = props.as_deref().map(serde_json::from_str).transpose()?;
        Ok(Some(StoredRoute { route, kind, props }))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_state(&self, key: &str, route: &str, value: Value) -> StorageResult<()> {
        let json = serde_json::to_string(&value)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO component_state (state_key, route, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, route, json, Utc::now().to_rfc3339()],
        )?;
        self.listeners.notify(&state_topic(key, route));
        Ok(())
    }

    async fn restore_state(&self, key: &str, route: &str) -> StorageResult<Option<Value>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM component_state WHERE state_key = ?1 AND route = ?2",
                params![key, route],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.as_deref().map(serde_json::from_str).transpose()?)
    }

    async fn delete_state(&self, key: &str, route: &str) -> StorageResult<()> {
        self.conn().execute(
            "DELETE FROM component_state WHERE state_key = ?1 AND route = ?2",
            params![key, route],
        )?;
        self.listeners.notify(&state_topic(key, route));
        Ok(())
    }

    async fn save_route(&self, key: &str, route: &StoredRoute) -> StorageResult<()> {
        self.write_route(&RouteTable::Active, key, route)?;
        self.listeners.notify(&route_topic(key));
        Ok(())
    }

    async fn restore_route(&self, key: &str) -> StorageResult<Option<StoredRoute>> {
        self.read_route(&RouteTable::Active, key)
    }

    async fn add_history(&self, key: &str, route: &StoredRoute) -> StorageResult<()> {
        self.write_route(&RouteTable::History, key, route)
    }

    async fn restore_history(&self, key: &str) -> StorageResult<Option<StoredRoute>> {
        self.read_route(&RouteTable::History, key)
    }

    async fn delete_history(&self, key: &str) -> StorageResult<()> {
        self.conn().execute(
            "DELETE FROM route_history WHERE route_key = ?1",
            params![key],
        )?;
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
