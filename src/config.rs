//! Environment-driven configuration

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Quiet period after the last commit before an inbound update is answered
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(2_000);
/// Upper bound on how long a single update may wait for quiet
pub const DEFAULT_MAX_QUIET_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_REDIRECT_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required credential {0}")]
    MissingCredential(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub quiet_window: Duration,
    pub max_quiet_wait: Duration,
    pub max_redirect_depth: usize,
    /// Buffer of the adapter to core inbound channel
    pub inbound_buffer: usize,
    /// Buffer of each session's command channel
    pub session_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            quiet_window: DEFAULT_QUIET_WINDOW,
            max_quiet_wait: DEFAULT_MAX_QUIET_WAIT,
            max_redirect_depth: DEFAULT_MAX_REDIRECT_DEPTH,
            inbound_buffer: 256,
            session_buffer: 32,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            quiet_window: parse_or(&lookup, "CHATFRAME_QUIET_WINDOW_MS", defaults.quiet_window, |v| {
                v.parse().ok().map(Duration::from_millis)
            })?,
            max_quiet_wait: parse_or(
                &lookup,
                "CHATFRAME_MAX_QUIET_WAIT_MS",
                defaults.max_quiet_wait,
                |v| v.parse().ok().map(Duration::from_millis),
            )?,
            max_redirect_depth: parse_or(
                &lookup,
                "CHATFRAME_MAX_REDIRECT_DEPTH",
                defaults.max_redirect_depth,
                |v| v.parse().ok(),
            )?,
            ..defaults
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub storage: StorageBackend,
    pub db_path: PathBuf,
    /// Route metadata JSON; the built-in demo routes are used when unset
    pub routes_path: Option<PathBuf>,
    /// Shared secret expected in the `x-chatframe-token` header
    pub webhook_token: String,
    pub core: CoreConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let webhook_token = lookup("CHATFRAME_WEBHOOK_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("CHATFRAME_WEBHOOK_TOKEN"))?;

        let port = parse_or(&lookup, "CHATFRAME_PORT", 8000, |v| v.parse().ok())?;
        let storage = parse_or(&lookup, "CHATFRAME_STORAGE", StorageBackend::Sqlite, |v| {
            match v.to_ascii_lowercase().as_str() {
                "memory" => Some(StorageBackend::Memory),
                "sqlite" => Some(StorageBackend::Sqlite),
                _ => None,
            }
        })?;
        let db_path = lookup("CHATFRAME_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.chatframe/chatframe.db"))
            },
            PathBuf::from,
        );

        Ok(Self {
            port,
            storage,
            db_path,
            routes_path: lookup("CHATFRAME_ROUTES").map(PathBuf::from),
            webhook_token,
            core: CoreConfig::from_lookup(&lookup)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => parse(value.trim()).ok_or(ConfigError::InvalidValue { name, value }),
    }
}
