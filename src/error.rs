//! Render pipeline error types

use crate::adapter::AdapterError;
use crate::route::RegistryError;
use crate::state_machine::TransitionError;
use crate::storage::StorageError;
use crate::vdom::CommitError;
use thiserror::Error;

/// Everything that can stop a render, plus the redirect signal.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Raised by a component to move the conversation elsewhere.
    #[error("Redirect to {location}")]
    Redirect { location: String },
    #[error("Redirect loop: gave up after {depth} hops (last location {location})")]
    RedirectLoop { location: String, depth: usize },
    #[error("Nothing to render: no component has been loaded for this session")]
    NothingToRender,
    #[error("Component failed: {0}")]
    Component(String),
    #[error("State value could not be (de)serialized: {0}")]
    StateCodec(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Core has been dropped")]
    CoreReleased,
}

/// How a failure is treated by the top-level inbound handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Misconfiguration or broken invariant. Surfaced at startup or logged loudly.
    Fatal,
    /// The session keeps its last committed tree and processing continues.
    Recoverable,
    /// Not a failure: the render pipeline acts on it.
    ControlFlow,
}

impl RenderError {
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component(message.into())
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Redirect { .. } => ErrorClass::ControlFlow,
            Self::NothingToRender | Self::Registry(_) | Self::Transition(_) | Self::CoreReleased => {
                ErrorClass::Fatal
            }
            Self::Adapter(e) if !e.kind.is_recoverable() => ErrorClass::Fatal,
            Self::RedirectLoop { .. }
            | Self::Component(_)
            | Self::StateCodec(_)
            | Self::Storage(_)
            | Self::Adapter(_)
            | Self::Commit(_) => ErrorClass::Recoverable,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}
