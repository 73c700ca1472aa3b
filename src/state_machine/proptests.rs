//! Property-based tests for the render lifecycle

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_event() -> impl Strategy<Value = RenderEvent> {
    prop_oneof![
        Just(RenderEvent::ComponentLoaded),
        Just(RenderEvent::RenderStarted),
        any::<bool>().prop_map(|tree_changed| RenderEvent::CommitCompleted { tree_changed }),
        Just(RenderEvent::RenderFailed),
    ]
}

fn arb_state() -> impl Strategy<Value = RenderState> {
    prop_oneof![
        Just(RenderState::Empty),
        Just(RenderState::Loaded),
        Just(RenderState::Rendering),
        Just(RenderState::Committed),
    ]
}

/// Drive events the way the engine does: a failed transition leaves the
/// state alone, and a committed tree exists once any commit went through.
fn run(events: &[RenderEvent]) -> Vec<RenderState> {
    let mut state = RenderState::Empty;
    let mut facts = RenderFacts::default();
    let mut trace = vec![state];
    for event in events {
        if let Ok(result) = transition(state, facts, *event) {
            if matches!(event, RenderEvent::CommitCompleted { .. }) {
                facts.has_committed_tree = true;
            }
            state = result.new_state;
            trace.push(state);
        }
    }
    trace
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Once something has been loaded the session never goes back to Empty
    #[test]
    fn prop_never_returns_to_empty(events in proptest::collection::vec(arb_event(), 0..30)) {
        let trace = run(&events);
        let first_loaded = trace.iter().position(|s| s.has_component());
        if let Some(i) = first_loaded {
            prop_assert!(trace[i..].iter().all(|s| s.has_component()));
        }
    }

    // After a commit, failures can only land back on Committed
    #[test]
    fn prop_commit_is_sticky(events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut state = RenderState::Empty;
        let mut facts = RenderFacts::default();
        for event in events {
            if let Ok(result) = transition(state, facts, event) {
                if facts.has_committed_tree && event == RenderEvent::RenderFailed {
                    prop_assert_eq!(result.new_state, RenderState::Committed);
                }
                if matches!(event, RenderEvent::CommitCompleted { .. }) {
                    facts.has_committed_tree = true;
                }
                state = result.new_state;
            }
        }
    }

    // NothingToRender is reported exactly when rendering from Empty
    #[test]
    fn prop_nothing_to_render_only_from_empty(state in arb_state(), committed in any::<bool>()) {
        let facts = RenderFacts { has_committed_tree: committed };
        let result = transition(state, facts, RenderEvent::RenderStarted);
        prop_assert_eq!(
            matches!(result, Err(TransitionError::NothingToRender)),
            state == RenderState::Empty
        );
    }

    // Rendering is never entered from Rendering
    #[test]
    fn prop_one_render_in_flight(event in arb_event(), committed in any::<bool>()) {
        let facts = RenderFacts { has_committed_tree: committed };
        if let Ok(result) = transition(RenderState::Rendering, facts, event) {
            prop_assert_ne!(result.new_state, RenderState::Rendering);
        }
    }

    // Effects only accompany a completed commit
    #[test]
    fn prop_effects_only_on_commit(state in arb_state(), event in arb_event(), committed in any::<bool>()) {
        let facts = RenderFacts { has_committed_tree: committed };
        if let Ok(result) = transition(state, facts, event) {
            if !matches!(event, RenderEvent::CommitCompleted { .. }) {
                prop_assert!(result.effects.is_empty());
            }
        }
    }
}
