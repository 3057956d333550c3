//! Story consistency checks
//!
//! Each check returns human-readable messages; `validate_story` runs them all
//! so an author sees every problem at once rather than the first one.

use super::chart::StateChart;
use super::document::{StoryDocument, UNKNOWN_INTENT};
use crate::handlers::HandlerRegistry;
use std::collections::{BTreeMap, BTreeSet};

/// Intents must each match a transition of the chart, unless they only
/// carry unknown answers
pub fn validate_intents(doc: &StoryDocument, chart: &StateChart) -> Vec<String> {
    let answered: BTreeSet<&str> = doc.unknown_answers.iter().map(|u| u.intent.as_str()).collect();
    doc.intents
        .iter()
        .filter(|intent| !answered.contains(intent.as_str()))
        .filter(|intent| !chart.contains_transition(intent))
        .map(|intent| format!("Intent <{intent}> has no matching transition"))
        .collect()
}

/// Triggers must each match a transition, and actions may only fire declared triggers
pub fn validate_triggers(doc: &StoryDocument, chart: &StateChart) -> Vec<String> {
    let declared: BTreeSet<&str> = doc.triggers.iter().map(String::as_str).collect();

    let unmatched = doc
        .triggers
        .iter()
        .filter(|trigger| !chart.contains_transition(trigger))
        .map(|trigger| format!("Trigger <{trigger}> has no matching transition"));

    let undeclared = doc.actions.iter().filter_map(|action| {
        let trigger = action.trigger_name()?;
        (!declared.contains(trigger)).then(|| {
            format!(
                "Action <{}> fires undeclared trigger <{trigger}>",
                action.name
            )
        })
    });

    unmatched.chain(undeclared).collect()
}

/// Every transition must be named after a declared intent or trigger
pub fn validate_transitions(doc: &StoryDocument, chart: &StateChart) -> Vec<String> {
    let known: BTreeSet<&str> = doc
        .intents
        .iter()
        .chain(&doc.triggers)
        .map(String::as_str)
        .collect();

    chart
        .transitions()
        .into_iter()
        .filter(|t| !known.contains(t))
        .map(|t| format!("Transition <{t}> is neither a declared intent nor a trigger"))
        .collect()
}

/// Actions map one-to-one onto atomic states
pub fn validate_actions(doc: &StoryDocument, chart: &StateChart) -> Vec<String> {
    let leaves = chart.leaf_states();

    let unplaced = doc
        .actions
        .iter()
        .filter(|a| !leaves.contains(a.name.as_str()))
        .map(|a| format!("Action <{}> has no matching atomic state", a.name));

    let action_names: BTreeSet<&str> = doc.actions.iter().map(|a| a.name.as_str()).collect();
    let orphan_states = leaves
        .iter()
        .filter(|s| !action_names.contains(*s))
        .map(|s| format!("State <{s}> has no matching action"));

    unplaced.chain(orphan_states).collect()
}

pub fn validate_duplicate_actions(doc: &StoryDocument) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for action in &doc.actions {
        *counts.entry(action.name.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, n)| format!("Action <{name}> is declared {n} times"))
        .collect()
}

/// Referenced handlers must be registered before the story is activated
pub fn validate_action_handlers(doc: &StoryDocument, registry: &HandlerRegistry) -> Vec<String> {
    doc.actions
        .iter()
        .filter_map(|a| a.handler_name())
        .filter(|h| !registry.contains(h))
        .map(|h| format!("Handler <{h}> is not registered"))
        .collect()
}

/// Contexts used by actions must be declared
pub fn validate_declared_action_contexts(doc: &StoryDocument) -> Vec<String> {
    let declared: BTreeSet<&str> = doc.contexts.iter().map(|c| c.name.as_str()).collect();

    doc.actions
        .iter()
        .flat_map(|a| a.input_contexts.iter().chain(&a.output_contexts))
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|c| !declared.contains(c))
        .map(|c| format!("Context <{c}> is used by an action but not declared"))
        .collect()
}

/// Declared contexts nothing reads or writes. Reported, not rejected.
pub fn unused_contexts(doc: &StoryDocument) -> Vec<String> {
    let used: BTreeSet<&str> = doc
        .actions
        .iter()
        .flat_map(|a| a.input_contexts.iter().chain(&a.output_contexts))
        .chain(association_contexts(doc))
        .map(String::as_str)
        .collect();

    doc.contexts
        .iter()
        .filter(|c| c.entity_role.is_none() && !used.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect()
}

/// Every input context needs some way to come into existence
pub fn validate_input_contexts(doc: &StoryDocument) -> Vec<String> {
    let from_intents: BTreeSet<&String> = association_contexts(doc).collect();
    let from_entities: BTreeSet<&str> = doc
        .contexts
        .iter()
        .filter(|c| c.entity_role.is_some())
        .map(|c| c.name.as_str())
        .collect();

    let mut errors = Vec::new();
    for action in &doc.actions {
        for input in &action.input_contexts {
            let produced_by_other = doc
                .actions
                .iter()
                .any(|other| other.name != action.name && other.output_contexts.contains(input));
            if !produced_by_other
                && !from_intents.contains(input)
                && !from_entities.contains(input.as_str())
            {
                errors.push(format!(
                    "Input context <{input}> of action <{}> is never produced",
                    action.name
                ));
            }
        }
    }
    errors
}

/// Intent associations must reference declared intents, contexts and actions
pub fn validate_intent_contexts(doc: &StoryDocument) -> Vec<String> {
    let declared_contexts: BTreeSet<&str> = doc.contexts.iter().map(|c| c.name.as_str()).collect();
    let action_names: BTreeSet<&str> = doc.actions.iter().map(|a| a.name.as_str()).collect();

    let mut errors = Vec::new();
    for entry in &doc.intent_contexts {
        if !doc.intents.contains(&entry.intent) {
            errors.push(format!(
                "Intent <{}> carries contexts but is not declared",
                entry.intent
            ));
        }
        for association in &entry.associations {
            if !action_names.contains(association.action.as_str()) {
                errors.push(format!(
                    "Intent <{}> is associated with unknown action <{}>",
                    entry.intent, association.action
                ));
            }
            for context in &association.contexts {
                if !declared_contexts.contains(context.as_str()) {
                    errors.push(format!(
                        "Intent <{}> sets undeclared context <{context}>",
                        entry.intent
                    ));
                }
            }
        }
    }
    errors
}

/// Context names and action names share one namespace in authored stories
pub fn validate_names(doc: &StoryDocument) -> Vec<String> {
    let action_names: BTreeSet<&str> = doc.actions.iter().map(|a| a.name.as_str()).collect();
    doc.contexts
        .iter()
        .filter(|c| action_names.contains(c.name.as_str()))
        .map(|c| format!("Name <{}> is used both as a context and an action", c.name))
        .collect()
}

/// Handler actions must agree with the contract their handler declares
pub fn validate_handler_contracts(doc: &StoryDocument, registry: &HandlerRegistry) -> Vec<String> {
    let mut errors = Vec::new();
    for action in &doc.actions {
        let Some(def) = action.handler_name().and_then(|h| registry.get(h)) else {
            continue;
        };
        for needed in def.input_contexts.difference(&action.input_contexts) {
            errors.push(format!(
                "Handler <{}> needs context <{needed}> missing from the inputs of action <{}>",
                def.name, action.name
            ));
        }
        if def.output_contexts.is_empty() {
            continue;
        }
        for output in action.output_contexts.difference(&def.output_contexts) {
            errors.push(format!(
                "Action <{}> declares output <{output}> that handler <{}> never produces",
                action.name, def.name
            ));
        }
    }
    errors
}

/// Unknown answers must follow a declared action
pub fn validate_unknown_answer_actions(doc: &StoryDocument) -> Vec<String> {
    let action_names: BTreeSet<&str> = doc.actions.iter().map(|a| a.name.as_str()).collect();
    doc.unknown_answers
        .iter()
        .filter(|u| !action_names.contains(u.action.as_str()))
        .map(|u| format!("Unknown answer refers to unknown action <{}>", u.action))
        .collect()
}

/// Unknown answers are keyed by the catch-all intent or a declared intent
pub fn validate_unknown_answer_intents(doc: &StoryDocument) -> Vec<String> {
    doc.unknown_answers
        .iter()
        .filter(|u| u.intent != UNKNOWN_INTENT && !doc.intents.contains(&u.intent))
        .map(|u| format!("Unknown answer intent <{}> is not declared", u.intent))
        .collect()
}

fn association_contexts(doc: &StoryDocument) -> impl Iterator<Item = &String> {
    doc.intent_contexts
        .iter()
        .flat_map(|e| &e.associations)
        .flat_map(|a| &a.contexts)
}

/// Run every check, returning the deduplicated, sorted error messages
pub fn validate_story(
    doc: &StoryDocument,
    chart: &StateChart,
    registry: &HandlerRegistry,
) -> Vec<String> {
    let errors: BTreeSet<String> = [
        // chart vs declared intents/triggers
        validate_intents(doc, chart),
        validate_triggers(doc, chart),
        validate_transitions(doc, chart),
        // chart vs actions
        validate_actions(doc, chart),
        validate_duplicate_actions(doc),
        validate_action_handlers(doc, registry),
        validate_handler_contracts(doc, registry),
        // contexts
        validate_declared_action_contexts(doc),
        validate_input_contexts(doc),
        validate_intent_contexts(doc),
        validate_names(doc),
        // unknown intent handling
        validate_unknown_answer_actions(doc),
        validate_unknown_answer_intents(doc),
    ]
    .into_iter()
    .flatten()
    .collect();

    errors.into_iter().collect()
}
