//! Pure state transition function

use super::{ActionOutcome, Effect, Event, TurnState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A turn is already in progress for this session")]
    TurnInProgress,
    #[error("Story is finished")]
    StoryFinished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same state and event it always returns the same result and
/// performs no I/O.
pub fn transition(state: &TurnState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Turn start
        // ============================================================
        (TurnState::Idle | TurnState::AwaitingUserInput, Event::UserSignal { objective }) => {
            let committed = matches!(state, TurnState::AwaitingUserInput);
            Ok(TransitionResult::new(TurnState::AwaitingPlan {
                objective: objective.clone(),
                committed,
            })
            .with_effect(Effect::RequestPlan { objective }))
        }

        (TurnState::Finished, Event::UserSignal { .. }) => Err(TransitionError::StoryFinished),

        (TurnState::AwaitingPlan { .. } | TurnState::Executing { .. }, Event::UserSignal { .. }) => {
            Err(TransitionError::TurnInProgress)
        }

        // ============================================================
        // Planning
        // ============================================================
        (TurnState::AwaitingPlan { .. }, Event::PlanSucceeded { objective, plan }) => {
            let mut steps = plan.into_iter();
            let Some(first) = steps.next() else {
                return Err(TransitionError::InvalidTransition(format!(
                    "empty plan for <{objective}>"
                )));
            };
            Ok(TransitionResult::new(TurnState::Executing {
                objective,
                current: first.clone(),
                remaining: steps.collect(),
            })
            .with_effect(Effect::ExecuteAction { action: first }))
        }

        // Nothing ever committed -> back to Idle, otherwise the story waits
        (TurnState::AwaitingPlan { committed, .. }, Event::PlanFailed | Event::Cancelled) => {
            let next = if *committed {
                TurnState::AwaitingUserInput
            } else {
                TurnState::Idle
            };
            Ok(TransitionResult::new(next).with_effect(Effect::EndTurn))
        }

        (TurnState::AwaitingPlan { .. }, Event::TriggerSettled) => Ok(
            TransitionResult::new(TurnState::AwaitingUserInput).with_effect(Effect::EndTurn),
        ),

        // ============================================================
        // Execution
        // ============================================================
        (
            TurnState::Executing {
                objective,
                current,
                remaining,
            },
            Event::ActionCompleted { action, outcome },
        ) => {
            if action != *current {
                return Err(TransitionError::InvalidTransition(format!(
                    "completed <{action}> while executing <{current}>"
                )));
            }
            Ok(complete_action(objective, remaining, outcome))
        }

        (TurnState::Executing { objective, .. }, Event::PreconditionUnmet { .. }) => {
            Ok(TransitionResult::new(TurnState::AwaitingPlan {
                objective: objective.clone(),
                committed: true,
            })
            .with_effect(Effect::RequestPlan {
                objective: objective.clone(),
            }))
        }

        (TurnState::Executing { .. }, Event::Redirected { story }) => Ok(
            TransitionResult::new(TurnState::AwaitingUserInput).with_effect(Effect::Redirect { story }),
        ),

        // Partial progress stays committed
        (TurnState::Executing { .. }, Event::ActionFailed | Event::Cancelled) => Ok(
            TransitionResult::new(TurnState::AwaitingUserInput).with_effect(Effect::EndTurn),
        ),

        // ============================================================
        // Everything else
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {state:?}"
        ))),
    }
}

fn complete_action(objective: &str, remaining: &[String], outcome: ActionOutcome) -> TransitionResult {
    match outcome {
        ActionOutcome::Final => {
            TransitionResult::new(TurnState::Finished).with_effect(Effect::FinishStory)
        }

        // Whatever is left of the plan is dropped; the user answers first
        ActionOutcome::Message => {
            TransitionResult::new(TurnState::AwaitingUserInput).with_effect(Effect::EndTurn)
        }

        ActionOutcome::Triggered { trigger } => TransitionResult::new(TurnState::AwaitingPlan {
            objective: objective.to_string(),
            committed: true,
        })
        .with_effect(Effect::FollowTrigger { trigger }),

        ActionOutcome::Silent => match remaining.split_first() {
            Some((next, rest)) => TransitionResult::new(TurnState::Executing {
                objective: objective.to_string(),
                current: next.clone(),
                remaining: rest.to_vec(),
            })
            .with_effect(Effect::ExecuteAction {
                action: next.clone(),
            }),
            None => {
                TransitionResult::new(TurnState::AwaitingUserInput).with_effect(Effect::EndTurn)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executing(current: &str, remaining: &[&str]) -> TurnState {
        TurnState::Executing {
            objective: "goal".to_string(),
            current: current.to_string(),
            remaining: remaining.iter().map(ToString::to_string).collect(),
        }
    }

    fn completed(action: &str, outcome: ActionOutcome) -> Event {
        Event::ActionCompleted {
            action: action.to_string(),
            outcome,
        }
    }

    #[test]
    fn test_user_signal_requests_plan() {
        let result = transition(
            &TurnState::Idle,
            Event::UserSignal {
                objective: "goal".to_string(),
            },
        )
        .unwrap();

        assert_eq!(
            result.new_state,
            TurnState::AwaitingPlan {
                objective: "goal".to_string(),
                committed: false
            }
        );
        assert_eq!(
            result.effects,
            vec![Effect::RequestPlan {
                objective: "goal".to_string()
            }]
        );
    }

    #[test]
    fn test_plan_succeeded_executes_first_step() {
        let state = TurnState::AwaitingPlan {
            objective: "goal".to_string(),
            committed: false,
        };
        let result = transition(
            &state,
            Event::PlanSucceeded {
                objective: "goal".to_string(),
                plan: vec!["load".to_string(), "goal".to_string()],
            },
        )
        .unwrap();

        assert_eq!(result.new_state, executing("load", &["goal"]));
        assert_eq!(
            result.effects,
            vec![Effect::ExecuteAction {
                action: "load".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let state = TurnState::AwaitingPlan {
            objective: "goal".to_string(),
            committed: false,
        };
        let result = transition(
            &state,
            Event::PlanSucceeded {
                objective: "goal".to_string(),
                plan: vec![],
            },
        );
        assert!(matches!(result, Err(TransitionError::InvalidTransition(_))));
    }

    #[test]
    fn test_plan_failure_destination() {
        let fresh = TurnState::AwaitingPlan {
            objective: "goal".to_string(),
            committed: false,
        };
        let resumed = TurnState::AwaitingPlan {
            objective: "goal".to_string(),
            committed: true,
        };

        assert_eq!(
            transition(&fresh, Event::PlanFailed).unwrap().new_state,
            TurnState::Idle
        );
        assert_eq!(
            transition(&resumed, Event::PlanFailed).unwrap().new_state,
            TurnState::AwaitingUserInput
        );
    }

    #[test]
    fn test_silent_action_advances() {
        let result = transition(
            &executing("load", &["compute", "goal"]),
            completed("load", ActionOutcome::Silent),
        )
        .unwrap();
        assert_eq!(result.new_state, executing("compute", &["goal"]));
    }

    #[test]
    fn test_message_discards_remaining_plan() {
        let result = transition(
            &executing("ask", &["goal"]),
            completed("ask", ActionOutcome::Message),
        )
        .unwrap();
        assert_eq!(result.new_state, TurnState::AwaitingUserInput);
        assert_eq!(result.effects, vec![Effect::EndTurn]);
    }

    #[test]
    fn test_final_action_finishes() {
        let result = transition(&executing("goal", &[]), completed("goal", ActionOutcome::Final)).unwrap();
        assert_eq!(result.new_state, TurnState::Finished);
        assert_eq!(result.effects, vec![Effect::FinishStory]);

        let again = transition(
            &TurnState::Finished,
            Event::UserSignal {
                objective: "goal".to_string(),
            },
        );
        assert!(matches!(again, Err(TransitionError::StoryFinished)));
    }

    #[test]
    fn test_trigger_follows() {
        let result = transition(
            &executing("jump", &["goal"]),
            completed(
                "jump",
                ActionOutcome::Triggered {
                    trigger: "next".to_string(),
                },
            ),
        )
        .unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::FollowTrigger {
                trigger: "next".to_string()
            }]
        );
        assert_eq!(
            transition(&result.new_state, Event::TriggerSettled)
                .unwrap()
                .new_state,
            TurnState::AwaitingUserInput
        );
    }

    #[test]
    fn test_precondition_miss_replans() {
        let result = transition(
            &executing("goal", &[]),
            Event::PreconditionUnmet {
                action: "goal".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            result.effects,
            vec![Effect::RequestPlan {
                objective: "goal".to_string()
            }]
        );
    }

    #[test]
    fn test_mismatched_completion_rejected() {
        let result = transition(&executing("load", &[]), completed("other", ActionOutcome::Silent));
        assert!(matches!(result, Err(TransitionError::InvalidTransition(_))));
    }

    #[test]
    fn test_busy_rejects_user_signal() {
        let result = transition(
            &executing("load", &[]),
            Event::UserSignal {
                objective: "goal".to_string(),
            },
        );
        assert!(matches!(result, Err(TransitionError::TurnInProgress)));
    }

    #[test]
    fn test_redirect_drops_remaining_plan() {
        let result = transition(
            &executing("load", &["show"]),
            Event::Redirected {
                story: "fallback".to_string(),
            },
        )
        .unwrap();

        assert_eq!(result.new_state, TurnState::AwaitingUserInput);
        assert_eq!(
            result.effects,
            vec![Effect::Redirect {
                story: "fallback".to_string()
            }]
        );
    }
}
