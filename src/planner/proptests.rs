//! Property-based tests for the planner
//!
//! Random catalogues over a small context vocabulary, so that chains,
//! alternatives and cycles all show up regularly.

use super::*;
use proptest::prelude::*;

const CONTEXTS: [&str; 6] = ["C0", "C1", "C2", "C3", "C4", "C5"];

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_context_set(max: usize) -> impl Strategy<Value = BTreeSet<String>> {
    proptest::sample::subsequence(CONTEXTS.to_vec(), 0..=max)
        .prop_map(|names| names.into_iter().map(String::from).collect())
}

fn arb_catalogue() -> impl Strategy<Value = Vec<ActionDefinition>> {
    proptest::collection::vec((arb_context_set(2), arb_context_set(2), any::<bool>()), 1..8).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (inputs, outputs, has_handler))| {
                    let name = format!("a{i}");
                    let mut action = ActionDefinition::message(&name)
                        .with_inputs(inputs)
                        .with_outputs(outputs);
                    if has_handler {
                        action = action.with_handler(format!("h{i}"));
                    }
                    action
                })
                .collect()
        },
    )
}

fn arb_problem() -> impl Strategy<Value = (Vec<ActionDefinition>, BTreeSet<String>, usize, BTreeSet<String>)> {
    arb_catalogue().prop_flat_map(|actions| {
        let n = actions.len();
        let handlers: Vec<String> = actions.iter().filter_map(|a| a.handler.clone()).collect();
        (
            Just(actions),
            arb_context_set(3),
            0..n,
            proptest::sample::subsequence(handlers.clone(), 0..=handlers.len())
                .prop_map(|ran| ran.into_iter().collect::<BTreeSet<_>>()),
        )
    })
}

fn store(names: &BTreeSet<String>) -> ContextStore {
    names.iter().map(|c| (c.clone(), None)).collect()
}

fn reachable(actions: &[ActionDefinition]) -> BTreeSet<String> {
    actions.iter().map(|a| a.name.clone()).collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Identical inputs give identical plans (or identical errors)
    #[test]
    fn prop_planning_is_deterministic((actions, known, target, ran) in arb_problem()) {
        let target = &actions[target].name;
        let first = plan_over(&actions, &reachable(&actions), &store(&known), target, &ran);
        let second = plan_over(&actions, &reachable(&actions), &store(&known), target, &ran);
        prop_assert_eq!(first, second);
    }

    // Every step's inputs hold when it runs
    #[test]
    fn prop_plans_are_sound((actions, known, target, ran) in arb_problem()) {
        let target = &actions[target].name;
        if let Ok(plan) = plan_over(&actions, &reachable(&actions), &store(&known), target, &ran) {
            let mut holds = known.clone();
            for step in &plan {
                let action = actions.iter().find(|a| &a.name == step).unwrap();
                for input in &action.input_contexts {
                    prop_assert!(
                        holds.contains(input),
                        "{} runs before {} holds in {:?}",
                        step,
                        input,
                        plan
                    );
                }
                holds.extend(action.output_contexts.iter().cloned());
            }
            prop_assert_eq!(plan.last(), Some(target));
        }
    }

    // No action twice, no handler that already ran
    #[test]
    fn prop_plans_do_not_repeat((actions, known, target, ran) in arb_problem()) {
        let target = &actions[target].name;
        if let Ok(plan) = plan_over(&actions, &reachable(&actions), &store(&known), target, &ran) {
            let unique: BTreeSet<&String> = plan.iter().collect();
            prop_assert_eq!(unique.len(), plan.len(), "Repeated action in {:?}", plan);

            for step in &plan[..plan.len() - 1] {
                let action = actions.iter().find(|a| &a.name == step).unwrap();
                if let Some(handler) = action.handler_name() {
                    prop_assert!(!ran.contains(handler), "{} already ran", handler);
                }
            }
        }
    }

    // Failure is only reported when the target really is unsatisfiable:
    // adding every missing input as known always makes planning succeed
    #[test]
    fn prop_failures_are_genuine((actions, known, target, ran) in arb_problem()) {
        let target_name = &actions[target].name;
        let result = plan_over(&actions, &reachable(&actions), &store(&known), target_name, &ran);
        if let Err(err) = result {
            prop_assert!(
                matches!(
                    err,
                    PlannerError::UnsatisfiableContext { .. } | PlannerError::CyclicDependency { .. }
                ),
                "unexpected error {:?}",
                err
            );
            let mut all = known.clone();
            all.extend(actions[target].input_contexts.iter().cloned());
            let plan = plan_over(&actions, &reachable(&actions), &store(&all), target_name, &ran);
            prop_assert_eq!(plan, Ok(vec![target_name.clone()]));
        }
    }
}
