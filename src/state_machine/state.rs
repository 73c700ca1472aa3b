//! Render lifecycle states

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    /// Nothing loaded yet
    #[default]
    Empty,
    /// A component is pending; no render in flight
    Loaded,
    /// Evaluation and commit in progress
    Rendering,
    /// Last render committed and handed to the adapter
    Committed,
}

impl RenderState {
    pub fn has_component(self) -> bool {
        !matches!(self, Self::Empty)
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::Rendering => "rendering",
            Self::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Session facts the transition depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFacts {
    pub has_committed_tree: bool,
}
