//! Effects produced by state transitions

/// Work the runtime performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Plan the actions leading to `objective`
    RequestPlan { objective: String },

    /// Resolve the objective a trigger leads to, then plan it
    FollowTrigger { trigger: String },

    /// Check preconditions and execute one action
    ExecuteAction { action: String },

    /// Return control to the caller, story continues
    EndTurn,

    /// Return control to the caller, story is over
    FinishStory,

    /// Return control to the caller, which hands the user to `story`
    Redirect { story: String },
}
