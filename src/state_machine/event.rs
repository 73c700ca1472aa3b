//! Render lifecycle events

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// Router produced a component for the stored route
    ComponentLoaded,
    RenderStarted,
    /// Tree committed and the adapter accepted it
    CommitCompleted { tree_changed: bool },
    RenderFailed,
}
