//! Turn lifecycle state machine
//!
//! Pure transitions in the Elm style: `transition(state, event)` returns the
//! next state and the effects the runtime must perform. All I/O (planning,
//! handler calls, sending messages) lives in `runtime`.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{ActionOutcome, Event};
pub use state::TurnState;
pub use transition::{transition, TransitionError, TransitionResult};
