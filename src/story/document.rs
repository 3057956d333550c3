//! Serialized story document
//!
//! Loosely typed mirror of the authored JSON. Nothing here is trusted: the
//! document is turned into a `StoryDefinition` only after the state chart is
//! built and the whole story validated.

use super::action::ActionDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDocument {
    pub id: String,
    pub state_machine: StateDocument,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub contexts: Vec<ContextDocument>,
    /// Intents the NLU layer may emit for this story
    #[serde(default)]
    pub intents: Vec<String>,
    /// Transition names fired by trigger actions
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub intent_contexts: Vec<IntentContextDocument>,
    #[serde(default)]
    pub settings: StorySettingsDocument,
    /// Retry answers played when an unknown intent arrives after an action
    #[serde(default)]
    pub unknown_answers: Vec<UnknownAnswerDocument>,
}

/// One node of the xstate-like chart.
///
/// Transition targets are written `"#STATE_ID"`; a bare id is accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub states: BTreeMap<String, StateDocument>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub on: BTreeMap<String, String>,
}

impl StateDocument {
    pub fn atomic(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial: None,
            states: BTreeMap::new(),
            on: BTreeMap::new(),
        }
    }

    pub fn compound(
        id: impl Into<String>,
        initial: impl Into<String>,
        children: impl IntoIterator<Item = StateDocument>,
    ) -> Self {
        Self {
            id: id.into(),
            initial: Some(initial.into()),
            states: children.into_iter().map(|s| (s.id.clone(), s)).collect(),
            on: BTreeMap::new(),
        }
    }

    pub fn on(mut self, event: impl Into<String>, target: impl AsRef<str>) -> Self {
        self.on
            .insert(event.into(), format!("#{}", target.as_ref()));
        self
    }
}

/// A declared context name, optionally fed by an NLU entity role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentContextDocument {
    pub intent: String,
    #[serde(default)]
    pub associations: Vec<IntentAssociationDocument>,
}

/// Contexts set when `intent` arrives right after `action` ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentAssociationDocument {
    pub action: String,
    #[serde(default)]
    pub contexts: Vec<String>,
}

/// Intent name the NLU layer emits when it recognized nothing
pub const UNKNOWN_INTENT: &str = "unknown";

/// Story the user is handed to when no redirect story is configured
pub const DEFAULT_REDIRECT_STORY: &str = "unknown";

const DEFAULT_REPETITION_LIMIT: u32 = 2;

fn default_repetition_limit() -> u32 {
    DEFAULT_REPETITION_LIMIT
}

fn default_unknown_intent() -> String {
    UNKNOWN_INTENT.to_string()
}

/// Loop protection shared by the whole story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySettingsDocument {
    /// Consecutive re-runs of one action, or unknown answers in a row,
    /// tolerated before the user is redirected
    #[serde(default = "default_repetition_limit")]
    pub repetition_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_story: Option<String>,
    /// Answer for an unknown intent when no per-action answer matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_answer: Option<String>,
}

impl Default for StorySettingsDocument {
    fn default() -> Self {
        Self {
            repetition_limit: DEFAULT_REPETITION_LIMIT,
            redirect_story: None,
            unknown_answer: None,
        }
    }
}

/// Answer `answer` to `intent` when it arrives right after `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownAnswerDocument {
    #[serde(default = "default_unknown_intent")]
    pub intent: String,
    pub action: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_states() {
        let doc: StateDocument = serde_json::from_str(
            r##"{
                "id": "root",
                "initial": "Global",
                "states": {
                    "Global": {
                        "id": "Global",
                        "initial": "hello",
                        "states": { "hello": { "id": "hello" } },
                        "on": { "greet": "#hello" }
                    }
                }
            }"##,
        )
        .unwrap();

        let global = &doc.states["Global"];
        assert_eq!(global.initial.as_deref(), Some("hello"));
        assert_eq!(global.on["greet"], "#hello");
        assert!(global.states["hello"].states.is_empty());
    }

    #[test]
    fn test_settings_and_unknown_answers_defaults() {
        let doc: StoryDocument = serde_json::from_str(
            r#"{
                "id": "s",
                "state_machine": { "id": "root" },
                "unknown_answers": [{ "action": "ask", "answer": "sorry" }]
            }"#,
        )
        .unwrap();

        assert_eq!(doc.settings, StorySettingsDocument::default());
        assert_eq!(doc.settings.repetition_limit, 2);
        assert_eq!(doc.unknown_answers[0].intent, UNKNOWN_INTENT);
    }

    #[test]
    fn test_builder_prefixes_targets() {
        let state = StateDocument::atomic("a").on("go", "b");
        assert_eq!(state.on["go"], "#b");
    }
}
