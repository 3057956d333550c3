//! Turn state types

use serde::{Deserialize, Serialize};

/// Where a session stands in its turn lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// No turn has committed anything yet
    #[default]
    Idle,

    /// Objective resolved, waiting for a plan
    AwaitingPlan {
        objective: String,
        /// Whether the session already holds committed progress. Decides
        /// where a planning failure lands.
        committed: bool,
    },

    /// Walking a plan, one action at a time
    Executing {
        objective: String,
        current: String,
        remaining: Vec<String>,
    },

    /// A message went out; the next user signal resumes the story
    AwaitingUserInput,

    /// A final action ran. Terminal.
    Finished,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Finished)
    }

    /// A turn is running and must not be interleaved with another signal
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TurnState::AwaitingPlan { .. } | TurnState::Executing { .. }
        )
    }
}
