//! Per-conversation session record
//!
//! A session is mutated by exactly one turn at a time (see `runtime`); the
//! record itself is plain data so callers can persist it however they like.

use crate::state_machine::TurnState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Facts known during a conversation.
///
/// Presence of a key means the fact holds; the value is optional content
/// (an entity value, a handler result, ...). Ordered so that iteration, logs
/// and plans stay deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextStore(BTreeMap<String, Option<String>>);

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Value carried by a context, `None` when absent or value-less
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Option::as_deref)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.0.insert(name.into(), value);
    }

    /// Set a context that carries no value
    pub fn set(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), None);
    }

    pub fn remove(&mut self, name: &str) -> Option<Option<String>> {
        self.0.remove(name)
    }

    /// Merge `delta` into this store, later values win
    pub fn merge(&mut self, delta: ContextStore) {
        self.0.extend(delta.0);
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for ContextStore {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}: {}", v.as_deref().unwrap_or("-")))
            .collect();
        write!(f, "[{}]", rendered.join(" | "))
    }
}

/// Identifies the conversation of one user against one story
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub story_id: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(story_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.story_id, self.user_id)
    }
}

/// Consecutive occurrences of one action or answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub name: String,
    pub count: u32,
}

impl Streak {
    /// The streak after one more occurrence of `name`, or `None` when that
    /// occurrence would repeat `name` more than `limit` times in a row
    pub fn extend(previous: Option<&Streak>, name: &str, limit: u32) -> Option<Streak> {
        match previous {
            Some(streak) if streak.name == name => (streak.count <= limit).then(|| Streak {
                name: name.to_string(),
                count: streak.count + 1,
            }),
            _ => Some(Streak {
                name: name.to_string(),
                count: 1,
            }),
        }
    }
}

/// Mutable runtime state of one ongoing conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub key: SessionKey,
    /// State chart position, `None` before the first executed action
    pub current_state: Option<String>,
    pub contexts: ContextStore,
    /// Handlers fired during the current turn
    pub ran_handlers: BTreeSet<String>,
    /// Every executed action, in order
    pub history: Vec<String>,
    pub turn_state: TurnState,
    /// Consecutive runs of the last executed action
    #[serde(default)]
    pub repetition: Option<Streak>,
    /// Unknown answers played in a row
    #[serde(default)]
    pub unknown_streak: Option<Streak>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            current_state: None,
            contexts: ContextStore::new(),
            ran_handlers: BTreeSet::new(),
            history: Vec::new(),
            turn_state: TurnState::Idle,
            repetition: None,
            unknown_streak: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.turn_state.is_terminal()
    }

    /// Last executed action, across turns
    pub fn last_action(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    /// Forget repetition counts, as when the user leaves for another story
    pub(crate) fn clear_streaks(&mut self) {
        self.repetition = None;
        self.unknown_streak = None;
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
