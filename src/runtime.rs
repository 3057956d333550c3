//! Runtime for executing story turns
//!
//! `TurnProcessor` runs one turn against one session. `SessionManager` owns
//! the sessions of every active story, serializing turns per session while
//! letting different sessions run in parallel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::TurnProcessor;
pub use traits::*;

use crate::config::EngineConfig;
use crate::handlers::HandlerRegistry;
use crate::planner::PlannerError;
use crate::session::{Session, SessionKey};
use crate::state_machine::{TransitionError, TurnState};
use crate::story::StoryDefinition;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Output of the NLU layer for one user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSignal {
    pub intent: String,
    /// Entity role -> recognized value
    pub entities: BTreeMap<String, Option<String>>,
}

impl UserSignal {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_entity(mut self, role: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(role.into(), Some(value.into()));
        self
    }
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// A final action ran; the session is over
    pub is_final: bool,
    /// Actions executed during this turn, in order
    pub executed: Vec<String>,
    pub state: TurnState,
    /// Story the user must continue in; this session is over
    pub redirect: Option<String>,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("No objective for intent <{intent}> from state <{state}>")]
    NoObjective { intent: String, state: String },

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Handler <{0}> is not registered")]
    HandlerNotFound(String),

    #[error("Handler <{handler}> timed out after {timeout:?}")]
    HandlerTimeout { handler: String, timeout: Duration },

    #[error("Handler <{handler}> failed: {message}")]
    HandlerFailure { handler: String, message: String },

    #[error("Failed to send <{action}>: {source}")]
    Send {
        action: String,
        #[source]
        source: SendError,
    },

    #[error("Turn exceeded {0} steps")]
    StepLimitExceeded(usize),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Unknown story <{0}>")]
    UnknownStory(String),
}

impl TurnError {
    /// Whether the caller may simply try again with another signal.
    ///
    /// Missing handlers, runaway turns and unknown stories point at a broken
    /// deployment instead. Lifecycle violations cannot be retried either.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TurnError::NoObjective { .. }
            | TurnError::Planner(_)
            | TurnError::HandlerTimeout { .. }
            | TurnError::HandlerFailure { .. }
            | TurnError::Send { .. }
            | TurnError::Cancelled => true,
            TurnError::Transition(_)
            | TurnError::HandlerNotFound(_)
            | TurnError::StepLimitExceeded(_)
            | TurnError::UnknownStory(_) => false,
        }
    }
}

type SessionHandle = Arc<Mutex<Session>>;

/// Manager for all sessions of all active stories
pub struct SessionManager<S: Sender> {
    registry: Arc<HandlerRegistry>,
    sender: Arc<S>,
    config: EngineConfig,
    resolver: Option<Arc<dyn ObjectiveResolver>>,
    processors: HashMap<String, TurnProcessor<S>>,
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
    archived: Mutex<Vec<Session>>,
}

impl<S: Sender> SessionManager<S> {
    pub fn new(registry: Arc<HandlerRegistry>, sender: Arc<S>, config: EngineConfig) -> Self {
        Self {
            registry,
            sender,
            config,
            resolver: None,
            processors: HashMap::new(),
            sessions: RwLock::new(HashMap::new()),
            archived: Mutex::new(Vec::new()),
        }
    }

    /// Use `resolver` instead of following state chart transitions.
    /// Applies to stories activated afterwards.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ObjectiveResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Activate a story. Activation completes before any session is served,
    /// which `&mut self` guarantees.
    pub fn activate(&mut self, story: StoryDefinition) {
        let id = story.id().to_string();
        let mut processor = TurnProcessor::new(
            Arc::new(story),
            Arc::clone(&self.registry),
            Arc::clone(&self.sender),
            self.config.clone(),
        );
        if let Some(resolver) = &self.resolver {
            processor = processor.with_resolver(Arc::clone(resolver));
        }
        tracing::info!(story = %id, "Story activated");
        self.processors.insert(id, processor);
    }

    pub fn story(&self, id: &str) -> Option<&Arc<StoryDefinition>> {
        self.processors.get(id).map(TurnProcessor::story)
    }

    /// Run one turn for `key`, creating the session on its first signal.
    ///
    /// Turns of the same session wait for each other. Sessions that reach
    /// `Finished` or are redirected to another story get archived, and a
    /// later signal starts a fresh one.
    pub async fn process_turn(
        &self,
        key: &SessionKey,
        signal: UserSignal,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let processor = self
            .processors
            .get(&key.story_id)
            .ok_or_else(|| TurnError::UnknownStory(key.story_id.clone()))?;

        let handle = self.get_or_create(key).await;
        let mut session = handle.lock().await;
        let result = processor.process(&mut session, signal, &cancel).await;

        let redirected = result.as_ref().is_ok_and(|o| o.redirect.is_some());
        if session.is_finished() || redirected {
            let done = session.clone();
            drop(session);
            self.archive(key, &handle, done).await;
        }
        result
    }

    async fn get_or_create(&self, key: &SessionKey) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(key) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(key.clone()).or_insert_with(|| {
            tracing::info!(session = %key, "Session created");
            Arc::new(Mutex::new(Session::new(key.clone())))
        }))
    }

    async fn archive(&self, key: &SessionKey, handle: &SessionHandle, session: Session) {
        let mut sessions = self.sessions.write().await;
        // Only drop the entry if it still is this session
        if sessions.get(key).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            sessions.remove(key);
            tracing::info!(session = %key, id = %session.id, "Session archived");
            self.archived.lock().await.push(session);
        }
    }

    /// Snapshot of an active session
    pub async fn session(&self, key: &SessionKey) -> Option<Session> {
        let handle = self.sessions.read().await.get(key).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Drop an active session without finishing its story
    pub async fn abandon(&self, key: &SessionKey) -> Option<Session> {
        let handle = self.sessions.write().await.remove(key)?;
        let session = handle.lock().await.clone();
        tracing::info!(session = %key, id = %session.id, "Session abandoned");
        Some(session)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drain the sessions archived so far, oldest first, for the host to
    /// persist
    pub async fn take_archived(&self) -> Vec<Session> {
        std::mem::take(&mut *self.archived.lock().await)
    }
}
