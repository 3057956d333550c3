//! Events that drive a turn

use serde::{Deserialize, Serialize};

/// What executing an action amounted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Handler ran, contexts merged
    Silent,
    /// The action fired a state chart transition
    Triggered { trigger: String },
    /// A message was sent and the story goes on
    Message,
    /// A final action ran
    Final,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Caller
    UserSignal { objective: String },
    Cancelled,

    // Planner
    PlanSucceeded { objective: String, plan: Vec<String> },
    PlanFailed,

    // Execution
    ActionCompleted { action: String, outcome: ActionOutcome },
    ActionFailed,
    /// Inputs of the next action do not hold, typically because a handler
    /// produced an alternative context
    PreconditionUnmet { action: String },
    /// A trigger led nowhere new
    TriggerSettled,
    /// The same action kept running past the story's repetition limit
    Redirected { story: String },
}
