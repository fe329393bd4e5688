//! Iterating linear optimizer.
//!
//! Sensitivities are only valid around the point they were computed at, so
//! the LP is rebuilt and solved again after every accepted move:
//! solve, round, apply, recompute sensitivities, evaluate. A move is kept
//! only when it lowers the cost; the best iterate is always the one returned
//! and applied to the snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use rao_core::{
    Catalog, GridSnapshot, Perimeter, RangeActionId, RaoResult, SensitivityProvider, SensitivityResult,
    SensitivityStatus,
};
use tracing::{debug, warn};

use super::backend::{solve, LinearProblemStatus};
use super::fillers::{build_problem, fillers_for, FillContext};
use super::rounding::{round_setpoints, solution_setpoints, solution_tap_angles};
use crate::budget::Budget;
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::RaoParameters;

/// Best iterate of one optimisation.
#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    pub status: LinearProblemStatus,
    /// Number of LP solves performed.
    pub iterations: usize,
    pub setpoints: BTreeMap<RangeActionId, f64>,
    pub sensitivity: SensitivityResult,
    pub objective: ObjectiveFunctionResult,
}

impl LinearOptimizationResult {
    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }
}

pub struct IteratingLinearOptimizer<'a, P: ?Sized> {
    catalog: &'a Catalog,
    parameters: &'a RaoParameters,
    provider: &'a P,
    budget: &'a Budget,
}

fn apply_setpoints<S: GridSnapshot>(catalog: &Catalog, snapshot: &mut S, setpoints: &BTreeMap<RangeActionId, f64>) {
    for (id, setpoint) in setpoints {
        snapshot.apply_range_action(catalog.range_action(*id), *setpoint);
    }
}

impl<'a, P: ?Sized> IteratingLinearOptimizer<'a, P> {
    pub fn new(catalog: &'a Catalog, parameters: &'a RaoParameters, provider: &'a P, budget: &'a Budget) -> Self {
        IteratingLinearOptimizer {
            catalog,
            parameters,
            provider,
            budget,
        }
    }

    /// Optimises the range actions of `perimeter` starting from the current
    /// state of `snapshot`, whose flows are `initial`. On return the snapshot
    /// holds the setpoints of the best iterate.
    ///
    /// Only configuration problems surface as `Err`; solver and sensitivity
    /// failures end the iterations and keep the best iterate.
    pub fn optimize<S>(
        &self,
        snapshot: &mut S,
        perimeter: &Perimeter,
        objective: &ObjectiveFunction,
        initial: SensitivityResult,
    ) -> RaoResult<LinearOptimizationResult>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        let reference_setpoints: BTreeMap<RangeActionId, f64> = perimeter
            .range_actions
            .iter()
            .map(|id| (*id, snapshot.range_action_setpoint(self.catalog.range_action(*id))))
            .collect();
        let initial_objective = objective.evaluate(self.catalog, &initial);
        let mut best = LinearOptimizationResult {
            status: LinearProblemStatus::Optimal,
            iterations: 0,
            setpoints: reference_setpoints.clone(),
            sensitivity: initial,
            objective: initial_objective,
        };
        if perimeter.range_actions.is_empty() || best.sensitivity.global_status() == SensitivityStatus::Failure {
            return Ok(best);
        }

        let ra_params = &self.parameters.range_actions_optimization;
        let fillers = fillers_for(self.parameters, objective);
        let time_limit = Duration::from_secs_f64(ra_params.solver_time_limit_seconds);
        let mut status = LinearProblemStatus::MaxIterationReached;
        let mut iterations = 0;

        for iteration in 0..ra_params.max_mip_iterations {
            if self.budget.is_exhausted() {
                warn!(iteration, "budget exhausted during range action optimisation");
                status = LinearProblemStatus::BudgetExhausted;
                break;
            }
            let ctx = FillContext {
                catalog: self.catalog,
                perimeter,
                parameters: self.parameters,
                objective,
                sensitivity: &best.sensitivity,
                setpoints: &best.setpoints,
                reference_setpoints: &reference_setpoints,
                iteration,
            };
            let problem = build_problem(&fillers, &ctx)?;
            let solution = solve(&problem, ra_params.solver, self.budget.cap(time_limit))?;
            iterations += 1;
            if !solution.status.has_solution() {
                warn!(iteration, status = ?solution.status, "linear problem has no solution, keeping best iterate");
                status = solution.status;
                break;
            }

            let proposed = solution_setpoints(&problem, &solution, perimeter);
            let tap_angles = solution_tap_angles(self.catalog, &problem, &solution, perimeter);
            let setpoints = round_setpoints(
                self.catalog,
                objective,
                &best.sensitivity,
                &best.setpoints,
                &proposed,
                &tap_angles,
            );
            if setpoints == best.setpoints {
                debug!(iteration, "setpoints unchanged, optimisation converged");
                status = solution.status;
                break;
            }

            apply_setpoints(self.catalog, snapshot, &setpoints);
            let sensitivity = match self.provider.compute(snapshot, perimeter, self.catalog) {
                Ok(result) if result.global_status() != SensitivityStatus::Failure => result,
                Ok(_) => {
                    warn!(iteration, "sensitivity computation failed, keeping best iterate");
                    apply_setpoints(self.catalog, snapshot, &best.setpoints);
                    status = LinearProblemStatus::SensitivityComputationFailed;
                    break;
                }
                Err(err) => {
                    warn!(iteration, error = %err, "sensitivity computation failed, keeping best iterate");
                    apply_setpoints(self.catalog, snapshot, &best.setpoints);
                    status = LinearProblemStatus::SensitivityComputationFailed;
                    break;
                }
            };
            let evaluated = objective.evaluate(self.catalog, &sensitivity);
            debug!(
                iteration,
                cost = evaluated.cost(),
                functional = evaluated.functional_cost,
                best = best.cost(),
                "range action iteration evaluated"
            );

            if evaluated.cost() < best.cost() - ra_params.min_iteration_improvement {
                best.setpoints = setpoints;
                best.sensitivity = sensitivity;
                best.objective = evaluated;
                continue;
            }

            apply_setpoints(self.catalog, snapshot, &best.setpoints);
            if !ra_params.range_shrinking {
                status = solution.status;
                break;
            }
            // a narrower window may still find an improvement
        }

        best.status = status;
        best.iterations = iterations;
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::case_from_json;

    const CATALOG: &str = r#"{
        "instants": [{"id": "preventive", "kind": "preventive"}],
        "cnecs": [
            {"id": "line", "network_element": "l1", "instant": "preventive",
             "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
        ],
        "range_actions": [
            {"id": "pst", "network_element": "pst-a", "kind": "pst-tap",
             "taps": [{"tap": -2, "angle": -4.0}, {"tap": -1, "angle": -2.0}, {"tap": 0, "angle": 0.0},
                      {"tap": 1, "angle": 2.0}, {"tap": 2, "angle": 4.0}]}
        ]
    }"#;

    fn perimeter(catalog: &Catalog) -> Perimeter {
        let mut perimeter = Perimeter::new(catalog.preventive_state());
        perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
        perimeter.range_actions = catalog.range_actions().map(|(id, _)| id).collect();
        perimeter
    }

    fn run(grid: &str) -> (LinearOptimizationResult, f64) {
        let mut case = case_from_json(CATALOG, grid).unwrap();
        let perimeter = perimeter(&case.catalog);
        let params = RaoParameters::default();
        let budget = Budget::unlimited();
        let initial = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &initial);
        let initial_cost = objective.evaluate(&case.catalog, &initial).cost();
        let optimizer = IteratingLinearOptimizer::new(&case.catalog, &params, &case.provider, &budget);
        let result = optimizer
            .optimize(&mut case.snapshot, &perimeter, &objective, initial)
            .unwrap();
        let pst = case.catalog.range_action(RangeActionId::new(0));
        assert_eq!(case.snapshot.range_action_setpoint(pst), result.setpoints[&RangeActionId::new(0)]);
        (result, initial_cost)
    }

    #[test]
    fn pst_relieves_overload_on_linear_grid() {
        let (result, initial_cost) = run(
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 130.0}],
                "sensitivities": [{"cnec": "line", "range_action": "pst", "value": -10.0}]
            }"#,
        );
        assert_eq!(initial_cost, 30.0);
        // 4 degrees brings the flow to 90 MW
        assert_eq!(result.setpoints[&RangeActionId::new(0)], 4.0);
        assert!((result.objective.functional_cost + 10.0).abs() < 1e-6);
        assert!(result.cost() < initial_cost);
        assert!(result.status.has_solution());
    }

    #[test]
    fn curvature_triggers_relinearisation_without_regression() {
        let (result, initial_cost) = run(
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 130.0}],
                "sensitivities": [{"cnec": "line", "range_action": "pst", "value": -10.0, "curvature": 2.0}]
            }"#,
        );
        assert!(result.iterations >= 2);
        assert!(result.cost() <= initial_cost);
    }

    #[test]
    fn no_range_action_returns_initial_situation() {
        let mut case = case_from_json(CATALOG, r#"{"reference_flows": [{"cnec": "line", "flow": 50.0}]}"#).unwrap();
        let mut perimeter = perimeter(&case.catalog);
        perimeter.range_actions.clear();
        let params = RaoParameters::default();
        let budget = Budget::unlimited();
        let initial = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &initial);
        let optimizer = IteratingLinearOptimizer::new(&case.catalog, &params, &case.provider, &budget);
        let result = optimizer
            .optimize(&mut case.snapshot, &perimeter, &objective, initial)
            .unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.objective.functional_cost, -50.0);
    }
}
