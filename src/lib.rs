//! Tick - a dialog engine for declarative, goal-driven stories
//!
//! A story declares actions with precondition and effect contexts plus a
//! hierarchical state chart. Each user turn resolves an objective action,
//! backward-chains a plan from the session's contexts and executes it.

pub mod config;
pub mod handlers;
pub mod planner;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod story;

pub use config::EngineConfig;
pub use handlers::{DevToolsProvider, FnHandler, Handler, HandlerProvider, HandlerRegistry};
pub use runtime::{
    ObjectiveResolver, SendError, Sender, SessionManager, TransitionResolver, TurnError,
    TurnOutcome, TurnProcessor, UserSignal,
};
pub use session::{ContextStore, Session, SessionKey};
pub use state_machine::TurnState;
pub use story::{StoryDefinition, StoryError};
