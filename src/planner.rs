//! Goal-directed action planning
//!
//! Given the contexts known so far, find the actions that must run before a
//! target action so that each one's input contexts hold when it executes.
//!
//! Planning is done in two passes over the action catalogue:
//!
//! 1. A forward fixed point assigns every producible context its shortest
//!    dependency depth and the producer achieving it (ties go to the action
//!    declared first).
//! 2. A backward walk from the target emits each chosen producer after its
//!    own prerequisites.
//!
//! When the target cannot be satisfied a depth-first walk of the requirement
//! graph names the reason: a missing producer or a dependency cycle.

#[cfg(test)]
mod proptests;

use crate::session::ContextStore;
use crate::story::{ActionDefinition, StoryDefinition};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Planning failures. None of them mutate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("Unknown action <{0}>")]
    UnknownAction(String),

    #[error("No action can produce context <{context}> required by <{required_by}>")]
    UnsatisfiableContext {
        context: String,
        required_by: String,
    },

    #[error("Cyclic dependency: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },
}

/// Compute the ordered plan ending in `target`.
///
/// Candidate producers are the actions reachable from `current_state` whose
/// handler has not already run in this turn. The target itself is never a
/// producer.
pub fn plan(
    story: &StoryDefinition,
    known: &ContextStore,
    current_state: Option<&str>,
    target: &str,
    already_ran: &BTreeSet<String>,
) -> Result<Vec<String>, PlannerError> {
    let reachable = story.chart().reachable_from(current_state);
    let result = plan_over(story.actions(), &reachable, known, target, already_ran);

    match &result {
        Ok(steps) => tracing::debug!(
            story = %story.id(),
            target,
            plan = ?steps,
            known = %known,
            "Plan computed"
        ),
        Err(e) => tracing::debug!(story = %story.id(), target, error = %e, "Planning failed"),
    }
    result
}

fn plan_over(
    actions: &[ActionDefinition],
    reachable: &BTreeSet<String>,
    known: &ContextStore,
    target: &str,
    already_ran: &BTreeSet<String>,
) -> Result<Vec<String>, PlannerError> {
    let target = actions
        .iter()
        .find(|a| a.name == target)
        .ok_or_else(|| PlannerError::UnknownAction(target.to_string()))?;

    let eligible: Vec<&ActionDefinition> = actions
        .iter()
        .filter(|a| a.name != target.name)
        .filter(|a| a.handler_name().map_or(true, |h| !already_ran.contains(h)))
        .filter(|a| reachable.contains(&a.name))
        .collect();

    let search = Search::new(&eligible, known);

    if target.input_contexts.iter().all(|c| search.is_satisfiable(c)) {
        Ok(search.extract(target))
    } else {
        Err(Diagnosis::new(&eligible, &search, target).run())
    }
}

/// Producer chosen for a context, keyed for comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    depth: usize,
    order: usize,
}

struct Search<'a> {
    known: &'a ContextStore,
    eligible: &'a [&'a ActionDefinition],
    /// context -> (rank, index into `eligible`)
    best: HashMap<&'a str, (Rank, usize)>,
}

impl<'a> Search<'a> {
    fn new(eligible: &'a [&'a ActionDefinition], known: &'a ContextStore) -> Self {
        let mut search = Self {
            known,
            eligible,
            best: HashMap::new(),
        };
        search.relax();
        search
    }

    fn depth(&self, context: &str) -> Option<usize> {
        if self.known.contains(context) {
            Some(0)
        } else {
            self.best.get(context).map(|(rank, _)| rank.depth)
        }
    }

    fn is_satisfiable(&self, context: &str) -> bool {
        self.depth(context).is_some()
    }

    /// Iterate until no context gets a better producer.
    ///
    /// Ranks only ever decrease, so this converges well before `max_rounds`.
    fn relax(&mut self) {
        let eligible = self.eligible;
        let contexts: HashSet<&str> = eligible
            .iter()
            .flat_map(|a| &a.output_contexts)
            .map(String::as_str)
            .collect();
        let max_rounds = (contexts.len() + 1) * (eligible.len() + 1);

        for _ in 0..max_rounds {
            let mut changed = false;

            for (order, action) in eligible.iter().enumerate() {
                let Some(depth) = self.action_depth(action) else {
                    continue;
                };
                let rank = Rank { depth, order };

                for output in &action.output_contexts {
                    if self.known.contains(output) {
                        continue;
                    }
                    let better = self
                        .best
                        .get(output.as_str())
                        .map_or(true, |(current, _)| rank < *current);
                    if better {
                        self.best.insert(output.as_str(), (rank, order));
                        changed = true;
                    }
                }
            }

            if !changed {
                return;
            }
        }
    }

    /// 1 + the deepest input, or `None` while an input is unsatisfiable
    fn action_depth(&self, action: &ActionDefinition) -> Option<usize> {
        action
            .input_contexts
            .iter()
            .try_fold(0, |deepest, c| Some(deepest.max(self.depth(c)?)))
            .map(|d| d + 1)
    }

    fn extract(&self, target: &ActionDefinition) -> Vec<String> {
        let mut plan = Vec::new();
        let mut emitted = HashSet::new();
        for input in &target.input_contexts {
            self.emit_producer(input, &mut emitted, &mut plan);
        }
        plan.push(target.name.clone());
        plan
    }

    /// Every producer has strictly shallower inputs than its output, so the
    /// recursion is bounded by the depth of `context`.
    fn emit_producer(&self, context: &str, emitted: &mut HashSet<usize>, plan: &mut Vec<String>) {
        if self.known.contains(context) {
            return;
        }
        let Some(&(_, index)) = self.best.get(context) else {
            return;
        };
        if emitted.contains(&index) {
            return;
        }
        let producer = self.eligible[index];
        for input in &producer.input_contexts {
            self.emit_producer(input, emitted, plan);
        }
        // A sibling input may already have emitted it
        if emitted.insert(index) {
            plan.push(producer.name.clone());
        }
    }
}

/// Explains why the target is unsatisfiable
struct Diagnosis<'a> {
    eligible: &'a [&'a ActionDefinition],
    search: &'a Search<'a>,
    target: &'a ActionDefinition,
    /// Actions on the current requirement path
    chain: Vec<&'a str>,
    failures: HashMap<&'a str, PlannerError>,
}

impl<'a> Diagnosis<'a> {
    fn new(
        eligible: &'a [&'a ActionDefinition],
        search: &'a Search<'a>,
        target: &'a ActionDefinition,
    ) -> Self {
        Self {
            eligible,
            search,
            target,
            chain: Vec::new(),
            failures: HashMap::new(),
        }
    }

    fn run(mut self) -> PlannerError {
        let target = self.target;
        self.explain_action(target).unwrap_or_else(|| {
            // Unreachable when the search and the diagnosis agree
            let context = target
                .input_contexts
                .iter()
                .find(|c| !self.search.is_satisfiable(c))
                .cloned()
                .unwrap_or_default();
            PlannerError::UnsatisfiableContext {
                context,
                required_by: target.name.clone(),
            }
        })
    }

    /// First failure among the unmet inputs of `action`
    fn explain_action(&mut self, action: &'a ActionDefinition) -> Option<PlannerError> {
        let search = self.search;
        self.chain.push(&action.name);
        let failure = action
            .input_contexts
            .iter()
            .filter(|c| !search.is_satisfiable(c))
            .find_map(|c| self.explain_context(c, &action.name));
        self.chain.pop();
        failure
    }

    fn explain_context(&mut self, context: &'a str, required_by: &str) -> Option<PlannerError> {
        if let Some(known) = self.failures.get(context) {
            return Some(known.clone());
        }

        let target = self.target;
        let producers: Vec<&'a ActionDefinition> = self
            .eligible
            .iter()
            .copied()
            .chain(std::iter::once(target))
            .filter(|a| a.output_contexts.contains(context))
            .collect();

        if producers.is_empty() {
            let err = PlannerError::UnsatisfiableContext {
                context: context.to_string(),
                required_by: required_by.to_string(),
            };
            self.failures.insert(context, err.clone());
            return Some(err);
        }

        let mut first = None;
        for producer in producers {
            let failure = if let Some(start) = self.chain.iter().position(|a| *a == producer.name) {
                let mut chain: Vec<String> = self.chain[start..].iter().map(|a| (*a).to_string()).collect();
                chain.push(producer.name.clone());
                Some(PlannerError::CyclicDependency { chain })
            } else {
                self.explain_action(producer)
            };

            match failure {
                Some(cycle @ PlannerError::CyclicDependency { .. }) => {
                    self.failures.insert(context, cycle.clone());
                    return Some(cycle);
                }
                Some(other) => {
                    first.get_or_insert(other);
                }
                None => {}
            }
        }

        if let Some(err) = &first {
            self.failures.insert(context, err.clone());
        }
        first
    }
}
