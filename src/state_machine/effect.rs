//! Effects requested by a transition

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEffect {
    /// Move the session's last-commit time forward
    TouchCommitClock,
    /// Run component mount hooks and the adapter's mount callback
    RunMountHooks,
    /// Resubscribe the session to the state it read while rendering
    RefreshSubscriptions,
}
