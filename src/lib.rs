//! chatframe - route-driven UI components delivered as chat messages
//!
//! An application is a tree of routes whose pages render into a virtual
//! node tree. Every conversation keeps its own route pointer and committed
//! tree; each inbound chat event is decoded into a path, resolved against the
//! route registry, rendered, diffed against the previous tree and handed to a
//! platform adapter as a single outgoing message update.

pub mod adapter;
pub mod app;
pub mod component;
pub mod config;
pub mod engine;
pub mod error;
pub mod route;
pub mod state_machine;
pub mod storage;
pub mod vdom;
pub mod webhook;

#[cfg(test)]
pub mod testing;

pub use adapter::{
    Adapter, AdapterError, AdapterErrorKind, ChatIdentity, InboundEvent, InboundSink,
    RedirectOptions, RouteInput,
};
pub use component::{
    ApiError, ApiHandler, ApiRequest, ApiResponse, Component, ComponentCatalog, Layout,
    PageProps, RenderContext,
};
pub use config::{ConfigError, CoreConfig, ServerConfig, StorageBackend};
pub use engine::{CommitClock, ConversationSession, Core, CoreHandle, QuietOutcome};
pub use error::{ErrorClass, RenderError};
pub use route::{
    MatchKind, MatchedRoute, Menu, RenderedComponent, RouteFile, RouteInfo, RouteKind,
    RouteMetadata, RouteRegistry, Router, StoredRoute, ROOT_ROUTE,
};
pub use state_machine::{transition, RenderEvent, RenderState, TransitionError};
pub use storage::{MemoryStorage, SqliteStorage, Storage, StorageError, Subscription};
pub use vdom::{diff, CommitError, CommitSummary, Node, Patch, RootTree};
