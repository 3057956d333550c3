//! Mock implementations and fixtures for testing
//!
//! These mocks enable turn processing tests without a real transport.

use super::traits::{SendError, Sender};
use crate::handlers::HandlerRegistry;
use crate::session::SessionKey;
use crate::story::{
    ActionDefinition, ContextDocument, StateDocument, StoryDefinition, StoryDocument,
    StorySettingsDocument,
};
use async_trait::async_trait;
use std::sync::Mutex;

// ============================================================================
// Recording Sender
// ============================================================================

/// What the engine asked the transport to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message(String),
    Final(String),
    Debug(String),
}

/// Sender that records every call, optionally failing on one action
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(SessionKey, Sent)>>,
    fail_on: Option<String>,
}

impl RecordingSender {
    pub fn failing_on(action: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_on: Some(action.into()),
        }
    }

    pub fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn for_session(&self, key: &SessionKey) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn finals(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Final(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Debug(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, session: &SessionKey, sent: Sent) -> Result<(), SendError> {
        if let Sent::Message(action) | Sent::Final(action) = &sent {
            if self.fail_on.as_deref() == Some(action.as_str()) {
                return Err(SendError("transport unavailable".to_string()));
            }
        }
        self.sent.lock().unwrap().push((session.clone(), sent));
        Ok(())
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send_message(&self, session: &SessionKey, action: &str) -> Result<(), SendError> {
        self.record(session, Sent::Message(action.to_string()))
    }

    async fn send_final_message(&self, session: &SessionKey, action: &str) -> Result<(), SendError> {
        self.record(session, Sent::Final(action.to_string()))
    }

    async fn send_debug(&self, session: &SessionKey, text: &str) -> Result<(), SendError> {
        self.record(session, Sent::Debug(text.to_string()))
    }
}

// ============================================================================
// Story Fixtures
// ============================================================================

/// Transfer limit story, see [`transfer_document`]. `registry` must provide
/// the `check_transfer` handler.
pub fn transfer_story(registry: &HandlerRegistry) -> StoryDefinition {
    StoryDefinition::from_document(transfer_document(), registry).unwrap()
}

/// `transfer` aims at `show_cannot_change_limit` (final), `confirm` at
/// `show_can_change_limit`; both need `check_transfer`, a handler reading
/// `TRANSFER_AMOUNT` (entity role `amount`).
pub fn transfer_document() -> StoryDocument {
    let global = StateDocument::compound(
        "Global",
        "welcome",
        [
            StateDocument::atomic("welcome"),
            StateDocument::atomic("check_transfer"),
            StateDocument::atomic("show_can_change_limit"),
            StateDocument::atomic("show_cannot_change_limit"),
        ],
    )
    .on("transfer", "show_cannot_change_limit")
    .on("confirm", "show_can_change_limit");

    StoryDocument {
        id: "transfer".to_string(),
        state_machine: StateDocument::compound("root", "Global", [global]),
        actions: vec![
            ActionDefinition::message("welcome"),
            ActionDefinition::message("check_transfer")
                .with_handler("check_transfer")
                .with_inputs(["TRANSFER_AMOUNT"])
                .with_outputs(["CAN_CHANGE_LIMIT", "CANNOT_CHANGE_LIMIT"]),
            ActionDefinition::message("show_can_change_limit").with_inputs(["CAN_CHANGE_LIMIT"]),
            ActionDefinition::message("show_cannot_change_limit")
                .with_inputs(["CANNOT_CHANGE_LIMIT"])
                .final_action(),
        ],
        contexts: vec![
            ContextDocument {
                name: "TRANSFER_AMOUNT".to_string(),
                entity_role: Some("amount".to_string()),
            },
            ContextDocument {
                name: "CAN_CHANGE_LIMIT".to_string(),
                entity_role: None,
            },
            ContextDocument {
                name: "CANNOT_CHANGE_LIMIT".to_string(),
                entity_role: None,
            },
        ],
        intents: vec!["transfer".to_string(), "confirm".to_string()],
        triggers: vec![],
        intent_contexts: vec![],
        settings: StorySettingsDocument::default(),
        unknown_answers: vec![],
    }
}
