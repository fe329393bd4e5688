//! Invariants of the optimiser on randomly generated linear grids.

use proptest::prelude::*;
use rao_algo::test_utils::{case_from_json, TestCase};
use rao_algo::{
    run_rao, Budget, IteratingLinearOptimizer, Leaf, ObjectiveFunction, RaoParameters, SearchTree,
};
use rao_core::{GridSnapshot, Perimeter, SensitivityProvider};

const PST_CATALOG: &str = r#"{
    "instants": [{"id": "preventive", "kind": "preventive"}],
    "cnecs": [
        {"id": "line", "network_element": "l1", "instant": "preventive",
         "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
    ],
    "range_actions": [
        {"id": "pst", "network_element": "pst-a", "kind": "pst-tap",
         "taps": [{"tap": -3, "angle": -6.0}, {"tap": -2, "angle": -4.0}, {"tap": -1, "angle": -2.0},
                  {"tap": 0, "angle": 0.0}, {"tap": 1, "angle": 2.0}, {"tap": 2, "angle": 4.0},
                  {"tap": 3, "angle": 6.0}],
         "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
    ]
}"#;

const TOPO_CATALOG: &str = r#"{
    "instants": [{"id": "preventive", "kind": "preventive"}],
    "cnecs": [
        {"id": "line", "network_element": "l1", "instant": "preventive",
         "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]},
        {"id": "other", "network_element": "l2", "instant": "preventive",
         "thresholds": [{"unit": "megawatt", "min": -150.0, "max": 150.0}]}
    ],
    "network_actions": [
        {"id": "a", "elementary_actions": [{"type": "topology", "element": "la", "action": "open"}],
         "usage_rules": [{"type": "on-instant", "instant": "preventive"}]},
        {"id": "b", "elementary_actions": [{"type": "topology", "element": "lb", "action": "open"}],
         "usage_rules": [{"type": "on-instant", "instant": "preventive"}]},
        {"id": "c", "elementary_actions": [{"type": "topology", "element": "lc", "action": "open"}],
         "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
    ]
}"#;

fn full_perimeter(case: &TestCase) -> Perimeter {
    let catalog = &case.catalog;
    let mut perimeter = Perimeter::new(catalog.preventive_state());
    perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
    perimeter.network_actions = catalog.network_actions().map(|(id, _)| id).collect();
    perimeter.range_actions = catalog.range_actions().map(|(id, _)| id).collect();
    perimeter
}

fn topo_case(line: f64, other: f64, impacts: &[(f64, f64)]) -> TestCase {
    let names = ["a", "b", "c"];
    let entries: Vec<String> = names
        .iter()
        .zip(impacts)
        .flat_map(|(name, (on_line, on_other))| {
            [
                format!(r#"{{"cnec": "line", "network_action": "{name}", "delta": {on_line}}}"#),
                format!(r#"{{"cnec": "other", "network_action": "{name}", "delta": {on_other}}}"#),
            ]
        })
        .collect();
    let grid = format!(
        r#"{{
            "reference_flows": [{{"cnec": "line", "flow": {line}}}, {{"cnec": "other", "flow": {other}}}],
            "action_impacts": [{}]
        }}"#,
        entries.join(", ")
    );
    case_from_json(TOPO_CATALOG, &grid).unwrap()
}

fn impacts() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-120i32..120, -120i32..120), 3)
        .prop_map(|v| v.into_iter().map(|(a, b)| (f64::from(a), f64::from(b))).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn iterating_optimizer_never_accepts_a_worse_iterate(
        flow in -250i32..250,
        sensitivity in prop_oneof![-20i32..-1, 1i32..20],
        curvature in 0i32..4,
    ) {
        let grid = format!(
            r#"{{
                "reference_flows": [{{"cnec": "line", "flow": {flow}}}],
                "sensitivities": [{{"cnec": "line", "range_action": "pst", "value": {sensitivity}, "curvature": {curvature}}}]
            }}"#
        );
        let mut case = case_from_json(PST_CATALOG, &grid).unwrap();
        let perimeter = full_perimeter(&case);
        let params = RaoParameters::default();
        let budget = Budget::unlimited();
        let initial = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &initial);
        let initial_cost = objective.evaluate(&case.catalog, &initial).cost();

        let optimizer = IteratingLinearOptimizer::new(&case.catalog, &params, &case.provider, &budget);
        let result = optimizer.optimize(&mut case.snapshot, &perimeter, &objective, initial).unwrap();

        prop_assert!(result.cost() <= initial_cost + 1e-9);
        // the snapshot is left on the returned iterate
        let recomputed = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        prop_assert!((objective.evaluate(&case.catalog, &recomputed).cost() - result.cost()).abs() < 1e-9);
    }

    #[test]
    fn search_never_returns_worse_than_root(
        line in -250i32..250,
        other in -200i32..200,
        impacts in impacts(),
        max_depth in 0usize..4,
    ) {
        let case = topo_case(f64::from(line), f64::from(other), &impacts);
        let perimeter = full_perimeter(&case);
        let params = RaoParameters::default();
        let budget = Budget::unlimited();
        let initial = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &initial);

        let result = SearchTree::new(&case.catalog, &params, &case.provider, &budget, &perimeter, &objective, max_depth, 2)
            .run(case.snapshot.clone())
            .unwrap();

        prop_assert!(result.cost() <= result.root_cost);
        prop_assert!(result.depth <= max_depth);
        prop_assert_eq!(result.depth, result.best.network_actions().len());
    }

    #[test]
    fn child_adds_exactly_one_action(order in Just(vec![0usize, 1, 2]).prop_shuffle()) {
        let case = topo_case(120.0, 0.0, &[(-10.0, 0.0), (-20.0, 0.0), (-30.0, 0.0)]);
        let mut leaf = Leaf::root(case.snapshot.clone());
        for index in order {
            let action = rao_core::NetworkActionId::new(index);
            let child = leaf.child(&case.catalog, action).unwrap();
            let mut expected = leaf.network_actions().clone();
            expected.insert(action);
            prop_assert_eq!(child.network_actions(), &expected);
            prop_assert_eq!(child.depth(), leaf.depth() + 1);
            prop_assert_eq!(child.last_action(), Some(action));
            leaf = child;
        }
    }

    #[test]
    fn optimising_an_optimum_changes_nothing(
        line in -250i32..250,
        other in -200i32..200,
        impacts in impacts(),
    ) {
        let case = topo_case(f64::from(line), f64::from(other), &impacts);
        let mut params = RaoParameters::default();
        // deep enough to exhaust the catalog, so the first run stops on its own
        params.topological_actions_optimization.max_preventive_search_tree_depth = 3;
        let first = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
        let preventive = first.perimeter(case.catalog.preventive_state()).unwrap();

        let mut optimum = case.snapshot.clone();
        for id in &preventive.network_actions {
            optimum.apply_network_action(case.catalog.network_action(*id));
        }
        let second = run_rao(&case.catalog, &params, &optimum, &case.provider).unwrap();
        let again = second.perimeter(case.catalog.preventive_state()).unwrap();

        prop_assert!((second.cost() - first.cost()).abs() < 1e-9);
        prop_assert!(again.network_actions.is_empty());
    }
}
