//! Pure state transition function

use super::{RenderEffect, RenderEvent, RenderFacts, RenderState};
use thiserror::Error;

#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: RenderState,
    pub effects: Vec<RenderEffect>,
}

impl TransitionResult {
    pub fn new(state: RenderState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = RenderEffect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Nothing to render")]
    NothingToRender,
    #[error("A render is already in progress for this session")]
    RenderInProgress,
    #[error("Invalid transition: {event} while {state}")]
    InvalidTransition { state: RenderState, event: String },
}

/// Given the same inputs, always produces the same outputs, with no I/O.
pub fn transition(
    state: RenderState,
    facts: RenderFacts,
    event: RenderEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (RenderState::Rendering, RenderEvent::ComponentLoaded | RenderEvent::RenderStarted) => {
            Err(TransitionError::RenderInProgress)
        }
        (_, RenderEvent::ComponentLoaded) => Ok(TransitionResult::new(RenderState::Loaded)),

        (RenderState::Empty, RenderEvent::RenderStarted) => Err(TransitionError::NothingToRender),
        (RenderState::Loaded | RenderState::Committed, RenderEvent::RenderStarted) => {
            Ok(TransitionResult::new(RenderState::Rendering))
        }

        (RenderState::Rendering, RenderEvent::CommitCompleted { tree_changed }) => {
            // subscriptions first so state written by mount hooks is observed
            let mut effects = vec![
                RenderEffect::TouchCommitClock,
                RenderEffect::RefreshSubscriptions,
            ];
            if tree_changed {
                effects.push(RenderEffect::RunMountHooks);
            }
            Ok(TransitionResult::new(RenderState::Committed).with_effects(effects))
        }

        (RenderState::Rendering, RenderEvent::RenderFailed) => {
            let back = if facts.has_committed_tree {
                RenderState::Committed
            } else {
                RenderState::Loaded
            };
            Ok(TransitionResult::new(back))
        }

        (state, event @ (RenderEvent::CommitCompleted { .. } | RenderEvent::RenderFailed)) => {
            Err(TransitionError::InvalidTransition {
                state,
                event: format!("{event:?}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESH: RenderFacts = RenderFacts {
        has_committed_tree: false,
    };
    const SHOWN: RenderFacts = RenderFacts {
        has_committed_tree: true,
    };

    #[test]
    fn test_happy_path() {
        let loaded = transition(RenderState::Empty, FRESH, RenderEvent::ComponentLoaded).unwrap();
        assert_eq!(loaded.new_state, RenderState::Loaded);

        let rendering = transition(loaded.new_state, FRESH, RenderEvent::RenderStarted).unwrap();
        assert_eq!(rendering.new_state, RenderState::Rendering);

        let done = transition(
            rendering.new_state,
            FRESH,
            RenderEvent::CommitCompleted { tree_changed: true },
        )
        .unwrap();
        assert_eq!(done.new_state, RenderState::Committed);
        assert_eq!(
            done.effects,
            vec![
                RenderEffect::TouchCommitClock,
                RenderEffect::RefreshSubscriptions,
                RenderEffect::RunMountHooks
            ]
        );
    }

    #[test]
    fn test_unchanged_commit_skips_mount_hooks() {
        let done = transition(
            RenderState::Rendering,
            SHOWN,
            RenderEvent::CommitCompleted { tree_changed: false },
        )
        .unwrap();
        assert!(!done.effects.contains(&RenderEffect::RunMountHooks));
        assert!(done.effects.contains(&RenderEffect::TouchCommitClock));
    }

    #[test]
    fn test_render_before_load() {
        assert_eq!(
            transition(RenderState::Empty, FRESH, RenderEvent::RenderStarted).unwrap_err(),
            TransitionError::NothingToRender
        );
    }

    #[test]
    fn test_failure_returns_to_prior_state() {
        let back = transition(RenderState::Rendering, FRESH, RenderEvent::RenderFailed).unwrap();
        assert_eq!(back.new_state, RenderState::Loaded);

        let back = transition(RenderState::Rendering, SHOWN, RenderEvent::RenderFailed).unwrap();
        assert_eq!(back.new_state, RenderState::Committed);
    }

    #[test]
    fn test_no_reentrant_render() {
        assert_eq!(
            transition(RenderState::Rendering, SHOWN, RenderEvent::RenderStarted).unwrap_err(),
            TransitionError::RenderInProgress
        );
    }

    #[test]
    fn test_commit_outside_render_is_invalid() {
        assert!(matches!(
            transition(
                RenderState::Loaded,
                FRESH,
                RenderEvent::CommitCompleted { tree_changed: true }
            ),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }
}
