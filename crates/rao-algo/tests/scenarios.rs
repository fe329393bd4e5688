//! End-to-end behaviour on small reference cases.

use rao_algo::test_utils::{case_from_json, TestCase};
use rao_algo::{run_rao, Budget, ComputationStatus, ObjectiveFunction, RaoParameters, SearchTree};
use rao_core::{Perimeter, SensitivityProvider, Unit};

fn preventive_perimeter(case: &TestCase) -> Perimeter {
    let catalog = &case.catalog;
    let mut perimeter = Perimeter::new(catalog.preventive_state());
    perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
    perimeter.network_actions = catalog.network_actions().map(|(id, _)| id).collect();
    perimeter.range_actions = catalog.range_actions().map(|(id, _)| id).collect();
    perimeter
}

fn action_names(case: &TestCase, ids: impl IntoIterator<Item = rao_core::NetworkActionId>) -> Vec<String> {
    ids.into_iter()
        .map(|id| case.catalog.network_action(id).id.clone())
        .collect()
}

const THREE_ACTIONS: &str = r#"{
    "instants": [{"id": "preventive", "kind": "preventive"}],
    "cnecs": [
        {"id": "line", "network_element": "l1", "instant": "preventive",
         "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
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

#[test]
fn margin_without_remedial_action() {
    // 100 A on a 400 kV line
    let flow_mw = 100.0 * 400.0 * 3f64.sqrt() / 1000.0;
    let case = case_from_json(
        r#"{
            "instants": [{"id": "preventive", "kind": "preventive"}],
            "cnecs": [
                {"id": "line", "network_element": "l1", "instant": "preventive", "nominal_voltage_kv": 400.0,
                 "thresholds": [{"unit": "ampere", "max": 200.0}]}
            ]
        }"#,
        &format!(r#"{{"reference_flows": [{{"cnec": "line", "flow": {flow_mw}}}]}}"#),
    )
    .unwrap();
    let mut params = RaoParameters::default();
    params.objective_function.unit = Unit::Ampere;

    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();
    let line = case.catalog.cnec_id("line").unwrap();

    assert!((preventive.margins[&line] - 100.0).abs() < 1e-9);
    assert!((result.functional_cost + 100.0).abs() < 1e-9);
    assert!(preventive.network_actions.is_empty());
    assert!(preventive.range_actions.is_empty());
    assert_eq!(result.status, ComputationStatus::Converged);
}

#[test]
fn single_network_action_removes_violation() {
    let case = case_from_json(
        THREE_ACTIONS,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 150.0}],
            "action_impacts": [
                {"cnec": "line", "network_action": "a", "delta": 5.0},
                {"cnec": "line", "network_action": "b", "delta": -80.0},
                {"cnec": "line", "network_action": "c", "delta": 10.0}
            ]
        }"#,
    )
    .unwrap();
    let params = RaoParameters::default();
    let perimeter = preventive_perimeter(&case);
    let initial = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
    let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &initial);
    let budget = Budget::unlimited();

    let result = SearchTree::new(&case.catalog, &params, &case.provider, &budget, &perimeter, &objective, 3, 2)
        .run(case.snapshot.clone())
        .unwrap();

    assert_eq!(result.root_cost, 50.0);
    assert_eq!(result.depth, 1);
    assert!(result.cost() <= 0.0);
    assert_eq!(action_names(&case, result.best.network_actions().iter().copied()), vec!["b"]);
    assert_eq!(result.status, ComputationStatus::Converged);
}

#[test]
fn grouped_range_actions_share_their_setpoint() {
    let case = case_from_json(
        r#"{
            "instants": [{"id": "preventive", "kind": "preventive"}],
            "cnecs": [
                {"id": "line", "network_element": "l1", "instant": "preventive",
                 "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
            ],
            "range_actions": [
                {"id": "pst-a", "network_element": "pst-1", "kind": "pst-tap", "group_id": "twin",
                 "taps": [{"tap": -2, "angle": -4.0}, {"tap": -1, "angle": -2.0}, {"tap": 0, "angle": 0.0},
                          {"tap": 1, "angle": 2.0}, {"tap": 2, "angle": 4.0}],
                 "usage_rules": [{"type": "on-instant", "instant": "preventive"}]},
                {"id": "pst-b", "network_element": "pst-2", "kind": "pst-tap", "group_id": "twin",
                 "taps": [{"tap": -2, "angle": -4.0}, {"tap": -1, "angle": -2.0}, {"tap": 0, "angle": 0.0},
                          {"tap": 1, "angle": 2.0}, {"tap": 2, "angle": 4.0}],
                 "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
            ]
        }"#,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 130.0}],
            "sensitivities": [
                {"cnec": "line", "range_action": "pst-a", "value": -10.0},
                {"cnec": "line", "range_action": "pst-b", "value": -3.0}
            ]
        }"#,
    )
    .unwrap();
    let params = RaoParameters::default();
    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();

    let a = case.catalog.range_action_id("pst-a").unwrap();
    let b = case.catalog.range_action_id("pst-b").unwrap();
    let (setpoint_a, setpoint_b) = (preventive.range_actions[&a], preventive.range_actions[&b]);
    assert_eq!(setpoint_a.to_bits(), setpoint_b.to_bits());
    assert_ne!(setpoint_a, 0.0);
    assert!(result.cost() < preventive.initial_cost);
}

#[test]
fn failed_leaf_is_excluded_while_siblings_are_kept() {
    let case = case_from_json(
        THREE_ACTIONS,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 200.0}],
            "action_impacts": [
                {"cnec": "line", "network_action": "a", "delta": -30.0},
                {"cnec": "line", "network_action": "b", "delta": -20.0},
                {"cnec": "line", "network_action": "c", "delta": -10.0}
            ],
            "failing_combinations": [["a", "b"]]
        }"#,
    )
    .unwrap();
    let params = RaoParameters::default();
    let perimeter = preventive_perimeter(&case);
    let initial = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
    let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &initial);
    let budget = Budget::unlimited();

    let result = SearchTree::new(&case.catalog, &params, &case.provider, &budget, &perimeter, &objective, 3, 3)
        .run(case.snapshot.clone())
        .unwrap();

    // a+b diverges at depth 2, a+c is the best valid sibling
    assert_eq!(result.depth, 2);
    assert_eq!(action_names(&case, result.best.network_actions().iter().copied()), vec!["a", "c"]);
    assert_eq!(result.cost(), 60.0);
    assert!(result.cost().is_finite());
}

#[test]
fn zero_depth_returns_root_with_budget_limited_status() {
    let case = case_from_json(
        THREE_ACTIONS,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 150.0}],
            "action_impacts": [{"cnec": "line", "network_action": "a", "delta": -80.0}]
        }"#,
    )
    .unwrap();
    let mut params = RaoParameters::default();
    params.topological_actions_optimization.max_preventive_search_tree_depth = 0;

    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();

    assert_eq!(result.status, ComputationStatus::BudgetLimited);
    assert_eq!(preventive.cost(), preventive.initial_cost);
    assert_eq!(result.cost(), 50.0);
    assert!(preventive.network_actions.is_empty());
}

#[test]
fn leaf_budget_stops_the_search_early() {
    let case = case_from_json(
        THREE_ACTIONS,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 200.0}],
            "action_impacts": [
                {"cnec": "line", "network_action": "a", "delta": -30.0},
                {"cnec": "line", "network_action": "b", "delta": -20.0},
                {"cnec": "line", "network_action": "c", "delta": -10.0}
            ]
        }"#,
    )
    .unwrap();
    let mut params = RaoParameters::default();
    params.topological_actions_optimization.max_preventive_search_tree_depth = 3;
    // root plus the three children of depth one
    params.budget.max_leaf_evaluations = Some(4);

    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();

    assert_eq!(result.status, ComputationStatus::BudgetLimited);
    assert_eq!(action_names(&case, preventive.network_actions.iter().copied()), vec!["a"]);
    assert_eq!(result.cost(), 70.0);
}

const PST_ONLY: &str = r#"{
    "instants": [{"id": "preventive", "kind": "preventive"}],
    "cnecs": [
        {"id": "line", "network_element": "l1", "instant": "preventive",
         "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
    ],
    "range_actions": [
        {"id": "pst", "network_element": "pst-a", "kind": "pst-tap",
         "taps": [{"tap": -2, "angle": -4.0}, {"tap": -1, "angle": -2.0}, {"tap": 0, "angle": 0.0},
                  {"tap": 1, "angle": 2.0}, {"tap": 2, "angle": 4.0}],
         "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
    ]
}"#;

#[test]
fn range_optimisation_cut_by_leaf_budget_is_budget_limited() {
    let case = case_from_json(
        PST_ONLY,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 130.0}],
            "sensitivities": [{"cnec": "line", "range_action": "pst", "value": -10.0}]
        }"#,
    )
    .unwrap();
    let mut params = RaoParameters::default();
    // the root leaf is the only evaluation allowed
    params.budget.max_leaf_evaluations = Some(1);

    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();
    let pst = case.catalog.range_action_id("pst").unwrap();

    assert_eq!(result.status, ComputationStatus::BudgetLimited);
    assert_eq!(preventive.status, ComputationStatus::BudgetLimited);
    assert_eq!(result.cost(), 30.0);
    assert_eq!(preventive.range_actions.get(&pst).copied().unwrap_or(0.0), 0.0);
}

#[test]
fn expired_deadline_returns_root_with_budget_limited_status() {
    let case = case_from_json(
        THREE_ACTIONS,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 150.0}],
            "action_impacts": [{"cnec": "line", "network_action": "a", "delta": -80.0}]
        }"#,
    )
    .unwrap();
    let mut params = RaoParameters::default();
    params.budget.max_duration_seconds = Some(1e-9);

    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();

    assert_eq!(result.status, ComputationStatus::BudgetLimited);
    assert!(preventive.network_actions.is_empty());
    assert_eq!(result.cost(), 50.0);
}

#[test]
fn network_action_tying_the_root_is_not_applied() {
    let case = case_from_json(
        THREE_ACTIONS,
        r#"{
            "reference_flows": [{"cnec": "line", "flow": 150.0}],
            "action_impacts": [{"cnec": "line", "network_action": "a", "delta": -1e-7}]
        }"#,
    )
    .unwrap();
    let mut params = RaoParameters::default();
    params.topological_actions_optimization.tie_tolerance = 1e-3;

    let result = run_rao(&case.catalog, &params, &case.snapshot, &case.provider).unwrap();
    let preventive = result.perimeter(case.catalog.preventive_state()).unwrap();

    assert!(preventive.network_actions.is_empty());
    assert_eq!(result.cost(), 50.0);
    assert_eq!(result.status, ComputationStatus::Converged);
}
