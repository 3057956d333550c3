//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the turn processor with mock implementations.

use crate::session::SessionKey;
use crate::story::StoryDefinition;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SendError(pub String);

/// Outbound channel to the user, owned by the transport layer.
///
/// Called exactly once per executed message action or unknown-intent answer.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Deliver the content behind a message action or an unknown-intent
    /// answer id; the story continues
    async fn send_message(&self, session: &SessionKey, message: &str) -> Result<(), SendError>;

    /// Deliver the content of a final action; the story ends
    async fn send_final_message(&self, session: &SessionKey, action: &str) -> Result<(), SendError>;

    /// Plain diagnostic text, only used in debug mode
    async fn send_debug(&self, _session: &SessionKey, _text: &str) -> Result<(), SendError> {
        Ok(())
    }
}

/// Maps an incoming intent to the action the turn must reach.
///
/// Pluggable because the matching rule belongs to the host platform.
pub trait ObjectiveResolver: Send + Sync {
    fn resolve(&self, story: &StoryDefinition, current_state: Option<&str>, intent: &str) -> Option<String>;
}

/// Follows the state chart: the transition named after the intent, looked up
/// from the current state and its ancestors. Without a matching transition
/// the current action stays the objective.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionResolver;

impl ObjectiveResolver for TransitionResolver {
    fn resolve(&self, story: &StoryDefinition, current_state: Option<&str>, intent: &str) -> Option<String> {
        let chart = story.chart();
        let from = current_state.unwrap_or_else(|| chart.entry_state());

        chart
            .next(from, intent)
            .or_else(|| current_state.filter(|s| story.action(s).is_some()))
            .map(String::from)
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Sender + ?Sized> Sender for Arc<T> {
    async fn send_message(&self, session: &SessionKey, action: &str) -> Result<(), SendError> {
        (**self).send_message(session, action).await
    }

    async fn send_final_message(&self, session: &SessionKey, action: &str) -> Result<(), SendError> {
        (**self).send_final_message(session, action).await
    }

    async fn send_debug(&self, session: &SessionKey, text: &str) -> Result<(), SendError> {
        (**self).send_debug(session, text).await
    }
}

impl<T: ObjectiveResolver + ?Sized> ObjectiveResolver for Arc<T> {
    fn resolve(&self, story: &StoryDefinition, current_state: Option<&str>, intent: &str) -> Option<String> {
        (**self).resolve(story, current_state, intent)
    }
}
