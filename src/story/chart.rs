//! Hierarchical state chart
//!
//! Built once from a `StateDocument` and immutable afterwards. Lookups are by
//! state id, which must be unique across the whole tree.

use super::document::StateDocument;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("State id must not be blank")]
    BlankStateId,
    #[error("Duplicate state <{0}>")]
    DuplicateState(String),
    #[error("Self-loop on state <{state}> for transition <{event}>")]
    SelfLoop { state: String, event: String },
    #[error("Group state <{0}> has no initial state")]
    MissingInitial(String),
    #[error("Initial state <{initial}> of <{state}> is not one of its children")]
    UnknownInitial { state: String, initial: String },
    #[error("Transition <{event}> of <{state}> targets unknown state <{target}>")]
    UnknownTarget {
        state: String,
        event: String,
        target: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub event: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound {
        initial: String,
        children: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNode {
    pub id: String,
    pub parent: Option<String>,
    pub kind: StateKind,
    pub transitions: Vec<Transition>,
}

impl StateNode {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic)
    }

    fn transition(&self, event: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.event == event)
    }
}

#[derive(Debug, Clone)]
pub struct StateChart {
    root: String,
    nodes: BTreeMap<String, StateNode>,
}

impl StateChart {
    pub fn from_document(doc: &StateDocument) -> Result<Self, ChartError> {
        let mut nodes = BTreeMap::new();
        flatten(doc, None, &mut nodes)?;

        let chart = Self {
            root: doc.id.clone(),
            nodes,
        };
        chart.check_targets()?;
        Ok(chart)
    }

    fn check_targets(&self) -> Result<(), ChartError> {
        for node in self.nodes.values() {
            for t in &node.transitions {
                if !self.nodes.contains_key(&t.target) {
                    return Err(ChartError::UnknownTarget {
                        state: node.id.clone(),
                        event: t.event.clone(),
                        target: t.target.clone(),
                    });
                }
                if t.target == node.id {
                    return Err(ChartError::SelfLoop {
                        state: node.id.clone(),
                        event: t.event.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &StateNode {
        &self.nodes[&self.root]
    }

    pub fn state(&self, id: &str) -> Option<&StateNode> {
        self.nodes.get(id)
    }

    pub fn parent(&self, id: &str) -> Option<&StateNode> {
        self.state(id)?
            .parent
            .as_deref()
            .and_then(|p| self.state(p))
    }

    /// Where a conversation starts: the root's declared initial state
    pub fn entry_state(&self) -> &str {
        match &self.root().kind {
            StateKind::Compound { initial, .. } => initial,
            StateKind::Atomic => &self.root,
        }
    }

    /// Descend through initial children until an atomic state
    pub fn initial_leaf(&self, id: &str) -> Option<&str> {
        let mut node = self.state(id)?;
        while let StateKind::Compound { initial, .. } = &node.kind {
            node = self.state(initial)?;
        }
        Some(&node.id)
    }

    /// Follow `event` from `id`, looking it up on ancestors when the state
    /// itself has no such transition. Returns the atomic state entered.
    pub fn next(&self, id: &str, event: &str) -> Option<&str> {
        let mut cursor = Some(self.state(id)?);
        while let Some(node) = cursor {
            if let Some(t) = node.transition(event) {
                return self.initial_leaf(&t.target);
            }
            cursor = node.parent.as_deref().and_then(|p| self.state(p));
        }
        None
    }

    pub fn contains_transition(&self, event: &str) -> bool {
        self.nodes.values().any(|n| n.transition(event).is_some())
    }

    pub fn transitions(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .flat_map(|n| n.transitions.iter().map(|t| t.event.as_str()))
            .collect()
    }

    /// Ids of every atomic state
    pub fn leaf_states(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .filter(|n| n.is_atomic())
            .map(|n| n.id.as_str())
            .collect()
    }

    fn leaves_under(&self, id: &str, out: &mut BTreeSet<String>) {
        let Some(node) = self.state(id) else { return };
        match &node.kind {
            StateKind::Atomic => {
                out.insert(node.id.clone());
            }
            StateKind::Compound { children, .. } => {
                for child in children {
                    self.leaves_under(child, out);
                }
            }
        }
    }

    /// Atomic states a conversation positioned at `from` can get to.
    ///
    /// The scope of a state is every leaf of its enclosing group; scopes are
    /// then extended through the transitions declared on reached states and
    /// their ancestors. `None` starts from the entry state.
    pub fn reachable_from(&self, from: Option<&str>) -> BTreeSet<String> {
        let start = from
            .filter(|id| self.nodes.contains_key(*id))
            .unwrap_or_else(|| self.entry_state());

        let mut reached = BTreeSet::new();
        let mut scopes_seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.to_string()]);

        while let Some(id) = queue.pop_front() {
            let scope = self
                .state(&id)
                .and_then(|n| n.parent.clone())
                .unwrap_or_else(|| self.root.clone());
            if !scopes_seen.insert(scope.clone()) {
                continue;
            }

            let mut leaves = BTreeSet::new();
            self.leaves_under(&scope, &mut leaves);

            for leaf in leaves {
                let mut cursor = self.state(&leaf);
                while let Some(node) = cursor {
                    for t in &node.transitions {
                        if let Some(target) = self.initial_leaf(&t.target) {
                            queue.push_back(target.to_string());
                        }
                    }
                    cursor = node.parent.as_deref().and_then(|p| self.state(p));
                }
                reached.insert(leaf);
            }
        }

        reached
    }
}

fn flatten(
    doc: &StateDocument,
    parent: Option<&str>,
    nodes: &mut BTreeMap<String, StateNode>,
) -> Result<(), ChartError> {
    if doc.id.trim().is_empty() {
        return Err(ChartError::BlankStateId);
    }
    if nodes.contains_key(&doc.id) {
        return Err(ChartError::DuplicateState(doc.id.clone()));
    }

    let kind = if doc.states.is_empty() {
        StateKind::Atomic
    } else {
        let initial = doc
            .initial
            .clone()
            .ok_or_else(|| ChartError::MissingInitial(doc.id.clone()))?;
        let children: Vec<String> = doc.states.values().map(|s| s.id.clone()).collect();
        if !children.contains(&initial) {
            return Err(ChartError::UnknownInitial {
                state: doc.id.clone(),
                initial,
            });
        }
        StateKind::Compound { initial, children }
    };

    let transitions = doc
        .on
        .iter()
        .map(|(event, target)| Transition {
            event: event.clone(),
            target: target.strip_prefix('#').unwrap_or(target).to_string(),
        })
        .collect();

    nodes.insert(
        doc.id.clone(),
        StateNode {
            id: doc.id.clone(),
            parent: parent.map(String::from),
            kind,
            transitions,
        },
    );

    for child in doc.states.values() {
        flatten(child, Some(&doc.id), nodes)?;
    }
    Ok(())
}
