//! Cost of a grid situation.
//!
//! The cost to minimise is a functional cost (minus the smallest margin
//! over the optimised CNECs) plus a set of virtual costs penalising side
//! effects: MNEC deterioration, loop flows, margin lost on non-optimised
//! operators and failed sensitivity computations.

pub mod margin;
pub mod virtual_cost;

use std::collections::{BTreeMap, BTreeSet};

use rao_core::{Catalog, CnecId, ContingencyId, Perimeter, SensitivityResult, SensitivityStatus, Unit};

use crate::parameters::{ObjectiveType, RaoParameters};
use margin::{cnec_margin, objective_margin};
use virtual_cost::{LoopFlowCost, MarginDecreaseCost, MnecCost, VirtualCost};

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveFunctionResult {
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    /// Functional CNECs, most limiting first.
    pub limiting_elements: Vec<CnecId>,
    /// Absolute margin of every computed perimeter CNEC, in the objective unit.
    pub margins: BTreeMap<CnecId, f64>,
}

impl ObjectiveFunctionResult {
    /// Result of a situation that could not be computed at all.
    pub fn failed() -> Self {
        ObjectiveFunctionResult {
            functional_cost: f64::INFINITY,
            virtual_costs: BTreeMap::new(),
            limiting_elements: Vec::new(),
            margins: BTreeMap::new(),
        }
    }

    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }

    pub fn margin(&self, cnec: CnecId) -> Option<f64> {
        self.margins.get(&cnec).copied()
    }

    pub fn most_limiting(&self, count: usize) -> &[CnecId] {
        &self.limiting_elements[..count.min(self.limiting_elements.len())]
    }
}

/// Evaluator bound to one perimeter and its initial situation.
#[derive(Debug, Clone)]
pub struct ObjectiveFunction {
    unit: Unit,
    relative_lower_bound: Option<f64>,
    cnecs: BTreeSet<CnecId>,
    functional_cnecs: BTreeSet<CnecId>,
    highest_threshold: f64,
    virtual_costs: Vec<VirtualCost>,
}

impl ObjectiveFunction {
    /// `initial` is the situation virtual costs are measured against
    /// (MNEC and loop-flow allowances, initial margins).
    pub fn build(
        catalog: &Catalog,
        perimeter: &Perimeter,
        parameters: &RaoParameters,
        initial: &SensitivityResult,
    ) -> Self {
        let objective = &parameters.objective_function;
        let unit = objective.unit;
        let excluded: BTreeSet<ContingencyId> = objective
            .excluded_contingencies
            .iter()
            .filter_map(|name| catalog.contingency_id(name))
            .collect();
        let unoptimized_operators = &parameters.not_optimized_cnecs.operators_not_to_optimize;
        let is_excluded = |id: CnecId| {
            catalog
                .state(catalog.cnec(id).state)
                .contingency
                .is_some_and(|c| excluded.contains(&c))
        };
        let is_unoptimized = |id: CnecId| {
            catalog
                .cnec(id)
                .operator
                .as_ref()
                .is_some_and(|op| unoptimized_operators.contains(op))
        };

        let functional_cnecs: BTreeSet<CnecId> = perimeter
            .optimized_cnecs(catalog)
            .filter(|id| !is_excluded(*id) && !is_unoptimized(*id))
            .collect();
        let highest_threshold = functional_cnecs
            .iter()
            .map(|id| catalog.cnec(*id).highest_threshold(unit))
            .fold(0.0, f64::max);

        let mut virtual_costs = Vec::new();

        let mnec = &parameters.mnec;
        let floors: BTreeMap<CnecId, f64> = perimeter
            .monitored_cnecs(catalog)
            .filter_map(|id| {
                let initial_margin = cnec_margin(catalog, &initial.flows, id, unit)?;
                Some((id, (initial_margin - mnec.acceptable_margin_decrease).min(0.0)))
            })
            .collect();
        if !floors.is_empty() {
            virtual_costs.push(VirtualCost::Mnec(MnecCost {
                floors,
                cost: mnec.violation_cost,
                unit,
            }));
        }

        let loop_flow = &parameters.loop_flow;
        if loop_flow.enabled {
            let mut limits = BTreeMap::new();
            let mut commercial_flows = BTreeMap::new();
            for id in perimeter.cnecs.iter().copied() {
                let Some(threshold) = catalog.cnec(id).loop_flow_threshold_mw else { continue };
                for side in catalog.cnec(id).monitored_sides() {
                    let (Some(initial_loop_flow), Some(commercial)) = (
                        initial.flows.loop_flow(id, side),
                        initial.flows.commercial_flow(id, side),
                    ) else {
                        continue;
                    };
                    let limit = threshold.max(initial_loop_flow.abs() + loop_flow.acceptable_increase);
                    limits.insert((id, side), limit);
                    commercial_flows.insert((id, side), commercial);
                }
            }
            if !limits.is_empty() {
                virtual_costs.push(VirtualCost::LoopFlow(LoopFlowCost {
                    limits,
                    commercial_flows,
                    cost: loop_flow.violation_cost,
                }));
            }
        }

        if !unoptimized_operators.is_empty() {
            let initial_margins: BTreeMap<CnecId, f64> = perimeter
                .optimized_cnecs(catalog)
                .filter(|id| !is_excluded(*id) && is_unoptimized(*id))
                .filter_map(|id| Some((id, cnec_margin(catalog, &initial.flows, id, unit)?)))
                .collect();
            if !initial_margins.is_empty() {
                virtual_costs.push(VirtualCost::MarginDecrease(MarginDecreaseCost {
                    initial_margins,
                    cost: parameters.not_optimized_cnecs.margin_decrease_cost,
                    unit,
                }));
            }
        }

        if objective.sensitivity_failure_overcost > 0.0 {
            virtual_costs.push(VirtualCost::SensitivityFailure {
                overcost: objective.sensitivity_failure_overcost,
            });
        }

        ObjectiveFunction {
            unit,
            relative_lower_bound: match objective.objective_type {
                ObjectiveType::MaxMinMargin => None,
                ObjectiveType::MaxMinRelativeMargin => Some(objective.ptdf_sum_lower_bound),
            },
            cnecs: perimeter.cnecs.clone(),
            functional_cnecs,
            highest_threshold,
            virtual_costs,
        }
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// PTDF-sum floor when margins are relative.
    pub fn relative_lower_bound(&self) -> Option<f64> {
        self.relative_lower_bound
    }

    /// CNECs whose margin defines the functional cost.
    pub fn functional_cnecs(&self) -> &BTreeSet<CnecId> {
        &self.functional_cnecs
    }

    pub fn virtual_costs(&self) -> &[VirtualCost] {
        &self.virtual_costs
    }

    pub fn evaluate(&self, catalog: &Catalog, result: &SensitivityResult) -> ObjectiveFunctionResult {
        if result.global_status() == SensitivityStatus::Failure {
            return ObjectiveFunctionResult::failed();
        }

        let margins: BTreeMap<CnecId, f64> = self
            .cnecs
            .iter()
            .filter_map(|id| Some((*id, cnec_margin(catalog, &result.flows, *id, self.unit)?)))
            .collect();

        let mut limiting: Vec<(CnecId, f64)> = self
            .functional_cnecs
            .iter()
            .filter_map(|id| {
                let margin = objective_margin(catalog, &result.flows, *id, self.unit, self.relative_lower_bound)?;
                Some((*id, margin))
            })
            .collect();
        limiting.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let functional_cost = match limiting.first() {
            Some((_, margin)) if margin.is_finite() => -margin,
            _ => -self.highest_threshold,
        };

        let virtual_costs = self
            .virtual_costs
            .iter()
            .map(|cost| (cost.name().to_string(), cost.evaluate(catalog, result)))
            .collect();

        ObjectiveFunctionResult {
            functional_cost,
            virtual_costs,
            limiting_elements: limiting.into_iter().map(|(id, _)| id).collect(),
            margins,
        }
    }
}
