//! Action definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What executing an action does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Invokes a registered handler
    Handler,
    /// Fires a state chart transition, no context side effect
    Trigger,
    /// Sends content to the user
    Message,
}

/// A named unit of story behavior with its precondition/effect contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default)]
    pub input_contexts: BTreeSet<String>,
    #[serde(default)]
    pub output_contexts: BTreeSet<String>,
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

impl ActionDefinition {
    /// A message action with no contexts
    pub fn message(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            trigger: None,
            input_contexts: BTreeSet::new(),
            output_contexts: BTreeSet::new(),
            is_final: false,
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_inputs<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_contexts.extend(contexts.into_iter().map(Into::into));
        self
    }

    pub fn with_outputs<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_contexts.extend(contexts.into_iter().map(Into::into));
        self
    }

    pub fn final_action(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Handler name, if non-blank
    pub fn handler_name(&self) -> Option<&str> {
        non_blank(self.handler.as_deref())
    }

    /// Trigger name, if non-blank
    pub fn trigger_name(&self) -> Option<&str> {
        non_blank(self.trigger.as_deref())
    }

    /// Silent actions are internal steps and never message the user
    pub fn is_silent(&self) -> bool {
        self.handler_name().is_some() || self.trigger_name().is_some()
    }

    pub fn kind(&self) -> ActionKind {
        if self.handler_name().is_some() {
            ActionKind::Handler
        } else if self.trigger_name().is_some() {
            ActionKind::Trigger
        } else {
            ActionKind::Message
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(handler: Option<&str>, trigger: Option<&str>) -> ActionDefinition {
        ActionDefinition {
            handler: handler.map(String::from),
            trigger: trigger.map(String::from),
            ..ActionDefinition::message("a")
        }
    }

    #[test]
    fn test_silent_when_handler_and_trigger_are_null() {
        assert!(!action(None, None).is_silent());
    }

    #[test]
    fn test_silent_when_handler_and_trigger_are_blank() {
        assert!(!action(Some(""), Some("   ")).is_silent());
        assert_eq!(action(Some(""), Some("   ")).kind(), ActionKind::Message);
    }

    #[test]
    fn test_silent_when_handler_is_set() {
        assert!(action(Some("h"), None).is_silent());
        assert!(action(Some("h"), Some("")).is_silent());
        assert_eq!(action(Some("h"), Some("t")).kind(), ActionKind::Handler);
    }

    #[test]
    fn test_silent_when_trigger_is_set() {
        assert!(action(None, Some("t")).is_silent());
        assert!(action(Some(" "), Some("t")).is_silent());
        assert_eq!(action(None, Some("t")).kind(), ActionKind::Trigger);
    }

    #[test]
    fn test_deserialize_final_flag() {
        let action: ActionDefinition = serde_json::from_str(
            r#"{"name":"bye","input_contexts":["DONE"],"final":true}"#,
        )
        .unwrap();
        assert!(action.is_final);
        assert!(action.input_contexts.contains("DONE"));
        assert!(action.output_contexts.is_empty());
    }
}
