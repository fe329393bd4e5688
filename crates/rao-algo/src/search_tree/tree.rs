//! Depth-by-depth search over network action combinations.
//!
//! The root leaf holds no network action. At each depth every candidate
//! action is added on top of the current optimal leaf; children are
//! evaluated and optimised in parallel, then compared once all of them are
//! done. The best child replaces the optimal leaf only when it improves
//! enough on it.

use std::collections::HashSet;

use rao_core::{Catalog, GridSnapshot, Perimeter, RaoError, RaoResult, SensitivityProvider, SensitivityStatus};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use super::bloomer::Bloomer;
use super::leaf::{Leaf, LeafStatus};
use crate::budget::Budget;
use crate::linear::{IteratingLinearOptimizer, LinearProblemStatus};
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::{RaoParameters, StopCriterion};
use crate::result::{ComputationStatus, PerimeterResult};

const EPSILON: f64 = 1e-6;

pub struct SearchTreeResult<S> {
    pub best: Leaf<S>,
    pub root_cost: f64,
    pub status: ComputationStatus,
    /// Depth of the best leaf.
    pub depth: usize,
}

impl<S: GridSnapshot> SearchTreeResult<S> {
    pub fn cost(&self) -> f64 {
        self.best.cost()
    }

    pub fn perimeter_result(&self, perimeter: &Perimeter) -> PerimeterResult {
        let objective = self
            .best
            .objective()
            .cloned()
            .filter(|_| self.best.status() != LeafStatus::Error)
            .unwrap_or_else(ObjectiveFunctionResult::failed);
        PerimeterResult {
            state: perimeter.main_state,
            status: self.status,
            initial_cost: self.root_cost,
            functional_cost: objective.functional_cost,
            virtual_costs: objective.virtual_costs,
            margins: objective.margins,
            limiting_elements: objective.limiting_elements,
            network_actions: self.best.network_actions().clone(),
            range_actions: self.best.range_actions(),
        }
    }
}

pub struct SearchTree<'a, P: ?Sized> {
    catalog: &'a Catalog,
    parameters: &'a RaoParameters,
    provider: &'a P,
    budget: &'a Budget,
    perimeter: &'a Perimeter,
    objective: &'a ObjectiveFunction,
    max_depth: usize,
    leaves_in_parallel: usize,
}

impl<'a, P: ?Sized> SearchTree<'a, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: &'a Catalog,
        parameters: &'a RaoParameters,
        provider: &'a P,
        budget: &'a Budget,
        perimeter: &'a Perimeter,
        objective: &'a ObjectiveFunction,
        max_depth: usize,
        leaves_in_parallel: usize,
    ) -> Self {
        SearchTree {
            catalog,
            parameters,
            provider,
            budget,
            perimeter,
            objective,
            max_depth,
            leaves_in_parallel: leaves_in_parallel.max(1),
        }
    }

    fn limiting_names<S: GridSnapshot>(&self, leaf: &Leaf<S>, count: usize) -> Vec<&'a str> {
        let catalog = self.catalog;
        leaf.objective()
            .map(|o| {
                o.most_limiting(count)
                    .iter()
                    .map(|id| catalog.cnec(*id).id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn stop_criterion_reached<S: GridSnapshot>(&self, leaf: &Leaf<S>) -> bool {
        if leaf.virtual_cost() > EPSILON {
            return false;
        }
        if self.objective.functional_cnecs().is_empty() {
            return true;
        }
        let objective = &self.parameters.objective_function;
        match objective.stop_criterion {
            StopCriterion::MinObjective => false,
            StopCriterion::AtTargetObjectiveValue => leaf.cost() < objective.target_objective_value,
        }
    }

    /// Whether `candidate` beats `previous` by the configured absolute and
    /// relative thresholds.
    fn improved_enough<S: GridSnapshot>(&self, previous: &Leaf<S>, candidate: &Leaf<S>) -> bool {
        let topo = &self.parameters.topological_actions_optimization;
        let relative = topo.relative_minimum_impact_threshold.max(0.0);
        let absolute = topo.absolute_minimum_impact_threshold.max(0.0);
        let previous_cost = previous.cost();
        let new_cost = candidate.cost();
        // a child within the tie tolerance of its parent only adds an action
        if new_cost >= previous_cost - topo.tie_tolerance {
            return false;
        }
        if self.stop_criterion_reached(candidate) {
            return true;
        }
        previous_cost - absolute > new_cost && (1.0 - previous_cost.signum() * relative) * previous_cost > new_cost
    }

    /// Cheapest child; siblings within the tie tolerance go to the lowest
    /// action id.
    fn select_best<S: GridSnapshot>(&self, children: Vec<Leaf<S>>) -> Option<Leaf<S>> {
        let tolerance = self.parameters.topological_actions_optimization.tie_tolerance;
        let min_cost = children
            .iter()
            .map(|leaf| leaf.cost())
            .filter(|cost| cost.is_finite())
            .reduce(f64::min)?;
        children
            .into_iter()
            .filter(|leaf| leaf.cost() <= min_cost + tolerance)
            .min_by_key(|leaf| leaf.last_action())
    }

    fn finish<S: GridSnapshot>(&self, best: Leaf<S>, root_cost: f64, status: ComputationStatus) -> SearchTreeResult<S> {
        let mut status = match best.sensitivity().map(|s| s.global_status()) {
            Some(SensitivityStatus::PartialFailure) => status.worst(ComputationStatus::PartialFailure),
            _ => status,
        };
        if self.budget.is_exhausted() || best.linear_status() == Some(LinearProblemStatus::BudgetExhausted) {
            status = status.worst(ComputationStatus::BudgetLimited);
        }
        info!(
            state = %self.catalog.state_name(self.perimeter.main_state),
            cost = best.cost(),
            functional = best.functional_cost(),
            virtual_cost = best.virtual_cost(),
            actions = best.depth(),
            status = status.as_str(),
            limiting = ?self.limiting_names(&best, 5),
            "search tree finished"
        );
        SearchTreeResult {
            depth: best.depth(),
            best,
            root_cost,
            status,
        }
    }

    /// Runs the search from `snapshot`, which becomes the root leaf.
    pub fn run<S>(&self, snapshot: S) -> RaoResult<SearchTreeResult<S>>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.leaves_in_parallel)
            .build()
            .map_err(|err| RaoError::Other(format!("failed to build leaf thread pool: {err}")))?;
        let optimizer = IteratingLinearOptimizer::new(self.catalog, self.parameters, self.provider, self.budget);
        let bloomer = Bloomer::new(self.catalog, self.perimeter, self.parameters);

        let mut root = Leaf::root(snapshot);
        self.budget.record_leaf_evaluation();
        root.evaluate(self.catalog, self.perimeter, self.provider, self.objective);
        if root.status() == LeafStatus::Error {
            warn!(state = %self.catalog.state_name(self.perimeter.main_state), "root leaf could not be computed");
            return Ok(SearchTreeResult {
                best: root,
                root_cost: f64::INFINITY,
                status: ComputationStatus::Failure,
                depth: 0,
            });
        }
        let root_cost = root.cost();
        if self.stop_criterion_reached(&root) {
            return Ok(self.finish(root, root_cost, ComputationStatus::Converged));
        }
        root.optimize(&optimizer, self.perimeter, self.objective)?;
        debug!(cost = root.cost(), "root leaf optimised");

        let mut seen: HashSet<u64> = HashSet::new();
        seen.insert(root.snapshot().state_signature());
        let mut optimal = root;
        let mut status = ComputationStatus::Converged;
        let mut depth = 0;

        loop {
            if self.stop_criterion_reached(&optimal) {
                debug!(depth, "stop criterion reached");
                break;
            }
            let candidates = bloomer.bloom(&optimal);
            if candidates.is_empty() {
                debug!(depth, "no more network action available");
                break;
            }
            if depth >= self.max_depth {
                info!(depth, remaining = candidates.len(), "maximum search depth reached");
                status = ComputationStatus::BudgetLimited;
                break;
            }
            if self.budget.is_exhausted() {
                warn!(depth, "computation budget exhausted, returning best leaf so far");
                status = ComputationStatus::BudgetLimited;
                break;
            }

            let mut children = Vec::with_capacity(candidates.len());
            for action in candidates {
                let Some(child) = optimal.child(self.catalog, action) else {
                    debug!(action = %self.catalog.network_action(action).id, "network action changes nothing");
                    continue;
                };
                if !seen.insert(child.snapshot().state_signature()) {
                    debug!(action = %self.catalog.network_action(action).id, "equivalent network state already explored");
                    continue;
                }
                children.push(child);
            }
            if children.is_empty() {
                break;
            }

            let evaluated: Vec<Leaf<S>> = pool.install(|| {
                children
                    .into_par_iter()
                    .map(|mut child| {
                        self.budget.record_leaf_evaluation();
                        child.evaluate(self.catalog, self.perimeter, self.provider, self.objective);
                        child.optimize(&optimizer, self.perimeter, self.objective)?;
                        debug!(actions = ?child.network_actions(), cost = child.cost(), "leaf evaluated");
                        Ok(child)
                    })
                    .collect::<RaoResult<Vec<_>>>()
            })?;
            depth += 1;

            match self.select_best(evaluated) {
                Some(best) if self.improved_enough(&optimal, &best) => {
                    info!(
                        depth,
                        cost = best.cost(),
                        limiting = ?self.limiting_names(&best, 2),
                        "new optimal leaf"
                    );
                    optimal = best;
                }
                _ => {
                    info!(depth, "no leaf improves enough, search stops");
                    break;
                }
            }
        }

        Ok(self.finish(optimal, root_cost, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{case_from_json, TestCase};

    const CATALOG: &str = r#"{
        "instants": [{"id": "preventive", "kind": "preventive"}],
        "cnecs": [
            {"id": "line", "network_element": "l1", "instant": "preventive",
             "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
        ],
        "network_actions": [
            {"id": "first", "elementary_actions": [{"type": "topology", "element": "la", "action": "open"}],
             "usage_rules": [{"type": "on-instant", "instant": "preventive"}]},
            {"id": "second", "elementary_actions": [{"type": "topology", "element": "lb", "action": "open"}],
             "usage_rules": [{"type": "on-instant", "instant": "preventive"}]},
            {"id": "first-twin", "elementary_actions": [{"type": "topology", "element": "la", "action": "open"}],
             "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
        ]
    }"#;

    fn run_with(
        case: &TestCase,
        params: &RaoParameters,
        budget: &Budget,
        max_depth: usize,
    ) -> SearchTreeResult<rao_core::LinearGridSnapshot> {
        let catalog = &case.catalog;
        let mut perimeter = Perimeter::new(catalog.preventive_state());
        perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
        perimeter.network_actions = catalog.network_actions().map(|(id, _)| id).collect();
        perimeter.range_actions = catalog.range_actions().map(|(id, _)| id).collect();
        let initial = case.provider.compute(&case.snapshot, &perimeter, catalog).unwrap();
        let objective = ObjectiveFunction::build(catalog, &perimeter, params, &initial);
        SearchTree::new(catalog, params, &case.provider, budget, &perimeter, &objective, max_depth, 2)
            .run(case.snapshot.clone())
            .unwrap()
    }

    fn run(case: &TestCase, max_depth: usize) -> SearchTreeResult<rao_core::LinearGridSnapshot> {
        run_with(case, &RaoParameters::default(), &Budget::unlimited(), max_depth)
    }

    fn names(case: &TestCase, result: &SearchTreeResult<rao_core::LinearGridSnapshot>) -> Vec<String> {
        result
            .best
            .network_actions()
            .iter()
            .map(|id| case.catalog.network_action(*id).id.clone())
            .collect()
    }

    #[test]
    fn ties_within_tolerance_keep_the_lowest_action_id() {
        let case = case_from_json(
            CATALOG,
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 150.0}],
                "action_impacts": [
                    {"cnec": "line", "network_action": "first", "delta": -30.0},
                    {"cnec": "line", "network_action": "second", "delta": -30.0000001}
                ]
            }"#,
        )
        .unwrap();
        let result = run(&case, 1);

        assert_eq!(names(&case, &result), vec!["first"]);
        assert_eq!(result.status, ComputationStatus::BudgetLimited);
    }

    #[test]
    fn equivalent_network_states_are_explored_once() {
        let case = case_from_json(
            CATALOG,
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 150.0}],
                "action_impacts": [
                    {"cnec": "line", "network_action": "first", "delta": -30.0},
                    {"cnec": "line", "network_action": "first-twin", "delta": -45.0}
                ]
            }"#,
        )
        .unwrap();
        let before = case.provider.computations();
        let result = run(&case, 3);

        // the twin opens the same element as "first" and is never evaluated
        assert_eq!(names(&case, &result), vec!["first"]);
        assert_eq!(result.cost(), 20.0);
        assert_eq!(result.status, ComputationStatus::Converged);
        assert!(case.provider.computations() > before);
    }

    #[test]
    fn child_tying_its_parent_is_not_kept() {
        let case = case_from_json(
            CATALOG,
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 150.0}],
                "action_impacts": [{"cnec": "line", "network_action": "first", "delta": -1e-7}]
            }"#,
        )
        .unwrap();
        let mut params = RaoParameters::default();
        params.topological_actions_optimization.tie_tolerance = 1e-3;
        let result = run_with(&case, &params, &Budget::unlimited(), 3);

        assert!(result.best.network_actions().is_empty());
        assert_eq!(result.depth, 0);
        assert_eq!(result.cost(), 50.0);
        assert_eq!(result.status, ComputationStatus::Converged);
    }

    #[test]
    fn range_optimisation_stopped_by_budget_is_budget_limited() {
        let case = case_from_json(
            r#"{
                "instants": [{"id": "preventive", "kind": "preventive"}],
                "cnecs": [
                    {"id": "line", "network_element": "l1", "instant": "preventive",
                     "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
                ],
                "range_actions": [
                    {"id": "pst", "network_element": "pst-a", "kind": "pst-tap",
                     "taps": [{"tap": -1, "angle": -2.0}, {"tap": 0, "angle": 0.0}, {"tap": 1, "angle": 2.0}],
                     "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
                ]
            }"#,
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 130.0}],
                "sensitivities": [{"cnec": "line", "range_action": "pst", "value": -10.0}]
            }"#,
        )
        .unwrap();
        // the root evaluation uses the only leaf allowed
        let budget = Budget::new(&crate::parameters::BudgetParameters {
            max_duration_seconds: None,
            max_leaf_evaluations: Some(1),
        });
        let result = run_with(&case, &RaoParameters::default(), &budget, 2);

        assert_eq!(result.best.linear_status(), Some(LinearProblemStatus::BudgetExhausted));
        assert_eq!(result.cost(), 30.0);
        assert_eq!(result.status, ComputationStatus::BudgetLimited);
    }
}
