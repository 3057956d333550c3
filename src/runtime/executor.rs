//! Turn processor
//!
//! Runs one turn as an effect loop around the pure lifecycle in
//! `state_machine`: every transition yields effects, every effect performed
//! here may yield the next event.

use super::traits::{ObjectiveResolver, Sender, TransitionResolver};
use super::{TurnError, TurnOutcome, UserSignal};
use crate::config::EngineConfig;
use crate::handlers::{HandlerError, HandlerRegistry};
use crate::planner::{self, PlannerError};
use crate::session::{ContextStore, Session, Streak};
use crate::state_machine::{transition, ActionOutcome, Effect, Event, TurnState};
use crate::story::{ActionDefinition, ActionKind, StoryDefinition};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Executes turns of one story. Shared by every session of that story.
pub struct TurnProcessor<S: Sender> {
    story: Arc<StoryDefinition>,
    registry: Arc<HandlerRegistry>,
    sender: Arc<S>,
    resolver: Arc<dyn ObjectiveResolver>,
    config: EngineConfig,
}

impl<S: Sender> TurnProcessor<S> {
    pub fn new(
        story: Arc<StoryDefinition>,
        registry: Arc<HandlerRegistry>,
        sender: Arc<S>,
        config: EngineConfig,
    ) -> Self {
        Self {
            story,
            registry,
            sender,
            resolver: Arc::new(TransitionResolver),
            config,
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ObjectiveResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn story(&self) -> &Arc<StoryDefinition> {
        &self.story
    }

    /// Process one user signal against `session`.
    ///
    /// Planning failures leave the session untouched. Execution failures keep
    /// the actions that completed before the failure.
    pub async fn process(
        &self,
        session: &mut Session,
        signal: UserSignal,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        if session.is_finished() {
            return Err(crate::state_machine::TransitionError::StoryFinished.into());
        }
        if cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        if session.turn_state.is_busy() {
            tracing::warn!(
                session = %session.key,
                state = ?session.turn_state,
                "Previous turn was interrupted, resuming from user input"
            );
            session.turn_state = TurnState::AwaitingUserInput;
        }

        if self.story.is_unknown_intent(&signal.intent) {
            if let Some(answer) = self.story.unknown_answer(&signal.intent, session.last_action()) {
                return self.answer_unknown(session, answer).await;
            }
        }

        let objective = self
            .resolver
            .resolve(&self.story, session.current_state.as_deref(), &signal.intent)
            .ok_or_else(|| TurnError::NoObjective {
                intent: signal.intent.clone(),
                state: session
                    .current_state
                    .clone()
                    .unwrap_or_else(|| self.story.chart().entry_state().to_string()),
            })?;

        // Step 1 on a working copy, committed with the first plan
        let mut working = session.contexts.clone();
        working.merge(self.story.entity_contexts(&signal.entities));
        for context in self.story.intent_contexts(&signal.intent, session.last_action()) {
            working.set(context);
        }

        tracing::info!(
            session = %session.key,
            intent = %signal.intent,
            objective = %objective,
            "Turn started"
        );

        let turn = Turn {
            processor: self,
            state: session.turn_state.clone(),
            session,
            working: Some(working),
            executed: Vec::new(),
            redirect: None,
            steps: 0,
            cancel,
        };
        turn.run(Event::UserSignal { objective }).await
    }

    /// Reply to a signal the story cannot act on. The same answer repeated
    /// past the repetition limit sends the user to the redirect story instead.
    async fn answer_unknown(&self, session: &mut Session, answer: &str) -> Result<TurnOutcome, TurnError> {
        let limit = self.story.repetition_limit();
        let Some(streak) = Streak::extend(session.unknown_streak.as_ref(), answer, limit) else {
            let story = self.story.redirect_story().to_string();
            tracing::info!(session = %session.key, answer, story = %story, "Unknown intent repeated, redirecting");
            session.clear_streaks();
            session.touch();
            return Ok(TurnOutcome {
                is_final: false,
                executed: Vec::new(),
                state: session.turn_state.clone(),
                redirect: Some(story),
            });
        };

        self.sender
            .send_message(&session.key, answer)
            .await
            .map_err(|source| TurnError::Send {
                action: answer.to_string(),
                source,
            })?;
        tracing::info!(session = %session.key, answer, repeated = streak.count, "Answered unknown intent");

        session.unknown_streak = Some(streak);
        session.touch();
        Ok(TurnOutcome {
            is_final: false,
            executed: Vec::new(),
            state: session.turn_state.clone(),
            redirect: None,
        })
    }
}

/// State of one running turn
struct Turn<'a, S: Sender> {
    processor: &'a TurnProcessor<S>,
    session: &'a mut Session,
    state: TurnState,
    /// Uncommitted contexts; `None` once the first plan succeeded
    working: Option<ContextStore>,
    executed: Vec<String>,
    /// Story the user was sent to, if any
    redirect: Option<String>,
    steps: usize,
    cancel: &'a CancellationToken,
}

impl<S: Sender> Turn<'_, S> {
    async fn run(mut self, first: Event) -> Result<TurnOutcome, TurnError> {
        let mut events = vec![first];

        while let Some(event) = events.pop() {
            let result = match transition(&self.state, event) {
                Ok(result) => result,
                Err(e) => {
                    self.settle();
                    return Err(e.into());
                }
            };
            self.state = result.new_state;

            for effect in result.effects {
                match self.execute_effect(effect).await {
                    Ok(Some(next)) => events.push(next),
                    Ok(None) => {}
                    Err(e) => return Err(self.fail(e)),
                }
            }
        }

        self.settle();
        let outcome = TurnOutcome {
            is_final: self.state.is_terminal(),
            executed: self.executed,
            state: self.state,
            redirect: self.redirect,
        };
        tracing::info!(
            session = %self.session.key,
            executed = ?outcome.executed,
            is_final = outcome.is_final,
            redirect = ?outcome.redirect,
            "Turn ended"
        );
        Ok(outcome)
    }

    /// Persist the lifecycle. Busy states never reach the session, so a turn
    /// dropped mid-flight leaves it ready for the next signal.
    fn settle(&mut self) {
        self.session.turn_state = if self.state.is_busy() {
            TurnState::AwaitingUserInput
        } else {
            self.state.clone()
        };
    }

    /// Settle the lifecycle after a failed effect, then hand the error back
    fn fail(&mut self, error: TurnError) -> TurnError {
        let event = match (&error, &self.state) {
            (TurnError::Cancelled, _) => Event::Cancelled,
            (_, TurnState::AwaitingPlan { .. }) => Event::PlanFailed,
            _ => Event::ActionFailed,
        };
        match transition(&self.state, event) {
            Ok(result) => self.state = result.new_state,
            Err(e) => tracing::warn!(error = %e, "Could not settle turn state after failure"),
        }
        self.settle();

        if matches!(error, TurnError::HandlerNotFound(_)) {
            tracing::error!(session = %self.session.key, error = %error, "Story references a handler that is not deployed");
        } else {
            tracing::warn!(session = %self.session.key, error = %error, "Turn failed");
        }
        error
    }

    async fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, TurnError> {
        match effect {
            Effect::RequestPlan { objective } => self.request_plan(objective).map(Some),

            Effect::FollowTrigger { trigger } => self.follow_trigger(&trigger),

            Effect::ExecuteAction { action } => self.execute_action(action).await.map(Some),

            Effect::EndTurn => Ok(None),

            Effect::Redirect { story } => {
                tracing::info!(session = %self.session.key, story = %story, "Redirecting to another story");
                self.session.clear_streaks();
                self.session.touch();
                self.redirect = Some(story);
                Ok(None)
            }

            Effect::FinishStory => {
                tracing::info!(session = %self.session.key, "Story finished");
                Ok(None)
            }
        }
    }

    fn count_step(&mut self) -> Result<(), TurnError> {
        self.steps += 1;
        let limit = self.processor.config.max_steps_per_turn;
        if self.steps > limit {
            return Err(TurnError::StepLimitExceeded(limit));
        }
        Ok(())
    }

    fn request_plan(&mut self, objective: String) -> Result<Event, TurnError> {
        self.count_step()?;
        let story = &self.processor.story;

        let plan = match &self.working {
            // First plan of the turn: nothing has run yet
            Some(working) => planner::plan(
                story,
                working,
                self.session.current_state.as_deref(),
                &objective,
                &BTreeSet::new(),
            )?,
            None => planner::plan(
                story,
                &self.session.contexts,
                self.session.current_state.as_deref(),
                &objective,
                &self.session.ran_handlers,
            )?,
        };

        if let Some(working) = self.working.take() {
            self.session.contexts = working;
            self.session.ran_handlers.clear();
            self.session.unknown_streak = None;
            self.session.turn_state = TurnState::AwaitingUserInput;
            self.session.touch();
        }

        Ok(Event::PlanSucceeded { objective, plan })
    }

    fn follow_trigger(&mut self, trigger: &str) -> Result<Option<Event>, TurnError> {
        let story = Arc::clone(&self.processor.story);
        let current = self.session.current_state.as_deref();

        let objective = self.processor.resolver.resolve(&story, current, trigger);
        let Some(objective) = objective.filter(|o| Some(o.as_str()) != current) else {
            tracing::debug!(session = %self.session.key, trigger, "Trigger leads nowhere new");
            return Ok(Some(Event::TriggerSettled));
        };

        for context in story.intent_contexts(trigger, self.session.last_action()) {
            self.session.contexts.set(context);
        }

        tracing::debug!(session = %self.session.key, trigger, objective = %objective, "Following trigger");
        self.request_plan(objective).map(Some)
    }

    async fn execute_action(&mut self, name: String) -> Result<Event, TurnError> {
        if self.cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        self.count_step()?;

        let story = Arc::clone(&self.processor.story);
        let action = story
            .action(&name)
            .ok_or_else(|| PlannerError::UnknownAction(name.clone()))?;

        if let Some(missing) = action
            .input_contexts
            .iter()
            .find(|c| !self.session.contexts.contains(c))
        {
            tracing::debug!(
                session = %self.session.key,
                action = %name,
                missing = %missing,
                "Precondition no longer holds, replanning"
            );
            return Ok(Event::PreconditionUnmet { action: name });
        }

        let Some(streak) = Streak::extend(self.session.repetition.as_ref(), &name, story.repetition_limit()) else {
            tracing::info!(session = %self.session.key, action = %name, "Action repeated too often");
            return Ok(Event::Redirected {
                story: story.redirect_story().to_string(),
            });
        };

        self.debug_contexts(action, "INPUT").await;
        let outcome = self.perform(action).await?;
        self.debug_contexts(action, "OUTPUT").await;

        // Commit the step as a whole
        self.session.history.push(name.clone());
        self.session.current_state = Some(name.clone());
        self.session.repetition = Some(streak);
        self.session.touch();
        self.executed.push(name.clone());

        tracing::info!(
            session = %self.session.key,
            action = %name,
            outcome = ?outcome,
            "Action executed"
        );
        Ok(Event::ActionCompleted {
            action: name,
            outcome,
        })
    }

    async fn perform(&mut self, action: &ActionDefinition) -> Result<ActionOutcome, TurnError> {
        match action.kind() {
            ActionKind::Handler => {
                let handler = action.handler_name().unwrap_or_default();
                let delta = self.invoke_handler(handler).await?;
                self.session.contexts.merge(delta);
                self.session.ran_handlers.insert(handler.to_string());
                Ok(silent_outcome(action))
            }

            ActionKind::Trigger => Ok(silent_outcome(action)),

            ActionKind::Message => {
                let sender = &self.processor.sender;
                let key = &self.session.key;
                let sent = if action.is_final {
                    sender.send_final_message(key, &action.name).await
                } else {
                    sender.send_message(key, &action.name).await
                };
                sent.map_err(|source| TurnError::Send {
                    action: action.name.clone(),
                    source,
                })?;

                Ok(if action.is_final {
                    ActionOutcome::Final
                } else {
                    ActionOutcome::Message
                })
            }
        }
    }

    async fn invoke_handler(&self, handler: &str) -> Result<ContextStore, TurnError> {
        let timeout = self.processor.config.handler_timeout;
        let call = self.processor.registry.invoke(handler, &self.session.contexts);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(delta)) => Ok(delta),
            Ok(Err(HandlerError::NotFound(name))) => Err(TurnError::HandlerNotFound(name)),
            Ok(Err(HandlerError::Failure { handler, message })) => {
                Err(TurnError::HandlerFailure { handler, message })
            }
            Err(_) => Err(TurnError::HandlerTimeout {
                handler: handler.to_string(),
                timeout,
            }),
        }
    }

    async fn debug_contexts(&self, action: &ActionDefinition, phase: &str) {
        let contexts = &self.session.contexts;
        tracing::debug!(
            session = %self.session.key,
            action = %action.name,
            phase,
            contexts = %contexts,
            "Context snapshot"
        );

        if self.processor.config.debug {
            let text = format!("[DEBUG] {} : {phase} CONTEXTS {contexts}", action.name);
            if let Err(e) = self.processor.sender.send_debug(&self.session.key, &text).await {
                tracing::warn!(error = %e, "Failed to send debug message");
            }
        }
    }
}

/// Silent steps either fire their trigger, end the story, or just continue
fn silent_outcome(action: &ActionDefinition) -> ActionOutcome {
    if action.is_final {
        ActionOutcome::Final
    } else if let Some(trigger) = action.trigger_name() {
        ActionOutcome::Triggered {
            trigger: trigger.to_string(),
        }
    } else {
        ActionOutcome::Silent
    }
}
