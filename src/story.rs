//! Story definitions
//!
//! A story is loaded once from its declarative document, validated against the
//! handler registry, and then shared read-only by every session playing it.

mod action;
mod chart;
mod document;
pub mod validation;

pub use action::{ActionDefinition, ActionKind};
pub use chart::{ChartError, StateChart, StateKind, StateNode, Transition};
pub use document::{
    ContextDocument, IntentAssociationDocument, IntentContextDocument, StateDocument,
    StoryDocument, StorySettingsDocument, UnknownAnswerDocument, DEFAULT_REDIRECT_STORY,
    UNKNOWN_INTENT,
};

use crate::handlers::HandlerRegistry;
use crate::session::ContextStore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("failed to read story file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed story document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid state machine: {0}")]
    Chart(#[from] ChartError),

    #[error("story {story} is invalid:\n  {}", .errors.join("\n  "))]
    Invalid { story: String, errors: Vec<String> },
}

/// A declared context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDefinition {
    pub name: String,
    /// NLU entity role whose value feeds this context
    pub entity_role: Option<String>,
}

/// Immutable, validated story
#[derive(Debug, Clone)]
pub struct StoryDefinition {
    id: String,
    chart: StateChart,
    /// Declaration order matters for planner tie-breaking
    actions: Vec<ActionDefinition>,
    action_index: HashMap<String, usize>,
    contexts: BTreeMap<String, ContextDefinition>,
    intents: BTreeSet<String>,
    triggers: BTreeSet<String>,
    /// intent -> (previous action -> contexts)
    intent_contexts: HashMap<String, HashMap<String, BTreeSet<String>>>,
    settings: StorySettingsDocument,
    /// intent -> (previous action -> answer)
    unknown_answers: HashMap<String, HashMap<String, String>>,
}

impl StoryDefinition {
    /// Build and validate a story. Handler references are checked against
    /// `registry`, which must therefore be fully populated.
    pub fn from_document(doc: StoryDocument, registry: &HandlerRegistry) -> Result<Self, StoryError> {
        let chart = StateChart::from_document(&doc.state_machine)?;

        let errors = validation::validate_story(&doc, &chart, registry);
        if !errors.is_empty() {
            return Err(StoryError::Invalid {
                story: doc.id,
                errors,
            });
        }

        for unused in validation::unused_contexts(&doc) {
            tracing::warn!(story = %doc.id, context = %unused, "Declared context is never used");
        }

        let action_index = doc
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();

        let contexts = doc
            .contexts
            .into_iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ContextDefinition {
                        name: c.name,
                        entity_role: c.entity_role,
                    },
                )
            })
            .collect();

        let mut intent_contexts: HashMap<String, HashMap<String, BTreeSet<String>>> =
            HashMap::new();
        for entry in doc.intent_contexts {
            let by_action = intent_contexts.entry(entry.intent).or_default();
            for association in entry.associations {
                by_action
                    .entry(association.action)
                    .or_default()
                    .extend(association.contexts);
            }
        }

        let mut unknown_answers: HashMap<String, HashMap<String, String>> = HashMap::new();
        for u in doc.unknown_answers {
            unknown_answers
                .entry(u.intent)
                .or_default()
                .insert(u.action, u.answer);
        }

        tracing::info!(
            story = %doc.id,
            actions = doc.actions.len(),
            states = chart.leaf_states().len(),
            "Story loaded"
        );

        Ok(Self {
            id: doc.id,
            chart,
            actions: doc.actions,
            action_index,
            contexts,
            intents: doc.intents.into_iter().collect(),
            triggers: doc.triggers.into_iter().collect(),
            intent_contexts,
            settings: doc.settings,
            unknown_answers,
        })
    }

    pub fn from_json(json: &str, registry: &HandlerRegistry) -> Result<Self, StoryError> {
        let doc: StoryDocument = serde_json::from_str(json)?;
        Self::from_document(doc, registry)
    }

    pub fn load(path: impl AsRef<Path>, registry: &HandlerRegistry) -> Result<Self, StoryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| StoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json, registry)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn chart(&self) -> &StateChart {
        &self.chart
    }

    /// Actions in declaration order
    pub fn actions(&self) -> &[ActionDefinition] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&ActionDefinition> {
        self.action_index.get(name).map(|&i| &self.actions[i])
    }

    pub fn context(&self, name: &str) -> Option<&ContextDefinition> {
        self.contexts.get(name)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ContextDefinition> {
        self.contexts.values()
    }

    pub fn is_intent(&self, name: &str) -> bool {
        self.intents.contains(name)
    }

    pub fn is_trigger(&self, name: &str) -> bool {
        self.triggers.contains(name)
    }

    /// Times one action may repeat in a row before the user is redirected
    pub fn repetition_limit(&self) -> u32 {
        self.settings.repetition_limit
    }

    pub fn redirect_story(&self) -> &str {
        self.settings
            .redirect_story
            .as_deref()
            .unwrap_or(DEFAULT_REDIRECT_STORY)
    }

    /// The catch-all intent, or an intent configured with unknown answers
    pub fn is_unknown_intent(&self, intent: &str) -> bool {
        intent == UNKNOWN_INTENT || self.unknown_answers.contains_key(intent)
    }

    /// Retry answer for `intent` arriving after `last_action`, falling back to
    /// the story-wide unknown answer
    pub fn unknown_answer(&self, intent: &str, last_action: Option<&str>) -> Option<&str> {
        last_action
            .and_then(|action| self.unknown_answers.get(intent)?.get(action))
            .map(String::as_str)
            .or(self.settings.unknown_answer.as_deref())
    }

    /// Contexts fed by recognized entities, keyed by entity role
    pub fn entity_contexts(&self, entities: &BTreeMap<String, Option<String>>) -> ContextStore {
        self.contexts
            .values()
            .filter_map(|c| {
                let role = c.entity_role.as_deref()?;
                let value = entities.get(role)?;
                Some((c.name.clone(), value.clone()))
            })
            .collect()
    }

    /// Contexts implied by receiving `intent` right after `last_action`
    pub fn intent_contexts(&self, intent: &str, last_action: Option<&str>) -> BTreeSet<String> {
        last_action
            .and_then(|action| self.intent_contexts.get(intent)?.get(action))
            .cloned()
            .unwrap_or_default()
    }
}
