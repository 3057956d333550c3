//! Property-based tests for the turn state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn arb_outcome() -> impl Strategy<Value = ActionOutcome> {
    prop_oneof![
        Just(ActionOutcome::Silent),
        Just(ActionOutcome::Message),
        Just(ActionOutcome::Final),
        arb_name().prop_map(|trigger| ActionOutcome::Triggered { trigger }),
    ]
}

fn arb_state() -> impl Strategy<Value = TurnState> {
    prop_oneof![
        Just(TurnState::Idle),
        (arb_name(), any::<bool>())
            .prop_map(|(objective, committed)| TurnState::AwaitingPlan { objective, committed }),
        (arb_name(), arb_name(), proptest::collection::vec(arb_name(), 0..4)).prop_map(
            |(objective, current, remaining)| TurnState::Executing {
                objective,
                current,
                remaining,
            }
        ),
        Just(TurnState::AwaitingUserInput),
        Just(TurnState::Finished),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_name().prop_map(|objective| Event::UserSignal { objective }),
        Just(Event::Cancelled),
        (arb_name(), proptest::collection::vec(arb_name(), 0..4))
            .prop_map(|(objective, plan)| Event::PlanSucceeded { objective, plan }),
        Just(Event::PlanFailed),
        (arb_name(), arb_outcome()).prop_map(|(action, outcome)| Event::ActionCompleted { action, outcome }),
        Just(Event::ActionFailed),
        arb_name().prop_map(|action| Event::PreconditionUnmet { action }),
        Just(Event::TriggerSettled),
        arb_name().prop_map(|story| Event::Redirected { story }),
    ]
}

fn arb_ready_state() -> impl Strategy<Value = TurnState> {
    prop_oneof![Just(TurnState::Idle), Just(TurnState::AwaitingUserInput)]
}

fn arb_busy_state() -> impl Strategy<Value = TurnState> {
    arb_state().prop_filter("busy", TurnState::is_busy)
}

// ============================================================================
// Validity Checkers
// ============================================================================

fn effects_match_state(effects: &[Effect], state: &TurnState) -> bool {
    effects.iter().all(|effect| match effect {
        Effect::RequestPlan { .. } | Effect::FollowTrigger { .. } => {
            matches!(state, TurnState::AwaitingPlan { .. })
        }
        Effect::ExecuteAction { action } => {
            matches!(state, TurnState::Executing { current, .. } if current == action)
        }
        Effect::EndTurn => matches!(state, TurnState::Idle | TurnState::AwaitingUserInput),
        Effect::Redirect { .. } => *state == TurnState::AwaitingUserInput,
        Effect::FinishStory => state.is_terminal(),
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Invariant 1: every accepted transition yields exactly one effect that
    // agrees with the new state
    #[test]
    fn prop_effects_agree_with_state(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            prop_assert_eq!(result.effects.len(), 1, "effects: {:?}", result.effects);
            prop_assert!(
                effects_match_state(&result.effects, &result.new_state),
                "Invalid effects for state {:?}: {:?}",
                result.new_state,
                result.effects
            );
        }
    }

    // Invariant 2: Finished is terminal
    #[test]
    fn prop_finished_is_terminal(event in arb_event()) {
        prop_assert!(transition(&TurnState::Finished, event).is_err());
    }

    // Invariant 3: busy states reject user signals
    #[test]
    fn prop_busy_rejects_signals(state in arb_busy_state(), objective in arb_name()) {
        let result = transition(&state, Event::UserSignal { objective });
        prop_assert!(matches!(result, Err(TransitionError::TurnInProgress)), "got {:?}", result);
    }

    // Invariant 4: ready states accept user signals and request a plan
    #[test]
    fn prop_ready_accepts_signals(state in arb_ready_state(), objective in arb_name()) {
        let result = transition(&state, Event::UserSignal { objective: objective.clone() });
        prop_assert!(result.is_ok(), "Ready state should accept: {:?}", result);
        prop_assert_eq!(
            result.unwrap().effects,
            vec![Effect::RequestPlan { objective }]
        );
    }

    // Invariant 5: walking a plan of silent actions visits every step in order
    #[test]
    fn prop_silent_plan_walks_in_order(plan in proptest::collection::vec(arb_name(), 1..6)) {
        let mut state = TurnState::AwaitingPlan { objective: "goal".to_string(), committed: false };
        let mut result = transition(&state, Event::PlanSucceeded {
            objective: "goal".to_string(),
            plan: plan.clone(),
        }).unwrap();
        let mut visited = Vec::new();

        loop {
            state = result.new_state;
            let Some(Effect::ExecuteAction { action }) = result.effects.pop() else {
                break;
            };
            visited.push(action.clone());
            result = transition(&state, Event::ActionCompleted {
                action,
                outcome: ActionOutcome::Silent,
            }).unwrap();
        }

        prop_assert_eq!(visited, plan);
        prop_assert_eq!(state, TurnState::AwaitingUserInput);
    }

    // Invariant 6: failures during execution keep the story alive
    #[test]
    fn prop_execution_failure_awaits_user(state in arb_state().prop_filter("executing", |s| matches!(s, TurnState::Executing { .. }))) {
        for event in [Event::ActionFailed, Event::Cancelled] {
            let result = transition(&state, event).unwrap();
            prop_assert_eq!(result.new_state, TurnState::AwaitingUserInput);
        }
    }
}
