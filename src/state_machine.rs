//! Per-session render lifecycle
//!
//! Pure transitions between `Empty`, `Loaded`, `Rendering` and `Committed`.
//! The engine feeds events in and executes the returned effects.

mod effect;
mod event;
mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::RenderEffect;
pub use event::RenderEvent;
pub use state::{RenderFacts, RenderState};
pub use transition::{transition, TransitionError, TransitionResult};
