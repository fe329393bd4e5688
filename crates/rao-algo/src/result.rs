//! Optimisation results exposed to callers.

use std::collections::{BTreeMap, BTreeSet};

use rao_core::{Catalog, CnecId, NetworkActionId, RangeActionId, StateId};
use serde::{Deserialize, Serialize};

/// How a perimeter or a whole run completed, from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputationStatus {
    /// The search ran to its natural end.
    Converged,
    /// Depth, time or leaf budget ran out; the best result so far is returned.
    BudgetLimited,
    /// Some states could not be computed and were charged an overcost.
    PartialFailure,
    Failure,
}

impl ComputationStatus {
    pub fn worst(self, other: ComputationStatus) -> ComputationStatus {
        self.max(other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputationStatus::Converged => "converged",
            ComputationStatus::BudgetLimited => "budget-limited",
            ComputationStatus::PartialFailure => "partial-failure",
            ComputationStatus::Failure => "failure",
        }
    }
}

/// Outcome of one perimeter optimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct PerimeterResult {
    pub state: StateId,
    pub status: ComputationStatus,
    /// Cost of the perimeter before any of its remedial actions.
    pub initial_cost: f64,
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    pub margins: BTreeMap<CnecId, f64>,
    /// Optimised CNECs, most limiting first.
    pub limiting_elements: Vec<CnecId>,
    pub network_actions: BTreeSet<NetworkActionId>,
    pub range_actions: BTreeMap<RangeActionId, f64>,
}

impl PerimeterResult {
    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }
}

/// Aggregate over every optimised perimeter.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalResult {
    pub status: ComputationStatus,
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    pub perimeters: BTreeMap<StateId, PerimeterResult>,
    /// Whether the preventive actions come from the second preventive pass.
    pub second_preventive: bool,
}

impl GlobalResult {
    /// Functional cost is the worst perimeter's, virtual costs add up by
    /// name and the status is the worst perimeter status.
    ///
    /// Perimeters without functional CNECs only count when no other
    /// perimeter has some. Failed perimeters only contribute their virtual
    /// costs; when every perimeter failed the functional cost is +inf.
    pub fn aggregate(perimeters: impl IntoIterator<Item = PerimeterResult>) -> Self {
        let mut status = ComputationStatus::Converged;
        let mut functional_cost = f64::NEG_INFINITY;
        let mut without_cnecs = f64::NEG_INFINITY;
        let mut virtual_costs: BTreeMap<String, f64> = BTreeMap::new();
        let mut by_state = BTreeMap::new();
        for perimeter in perimeters {
            status = status.worst(perimeter.status);
            if perimeter.status != ComputationStatus::Failure {
                if perimeter.limiting_elements.is_empty() {
                    without_cnecs = without_cnecs.max(perimeter.functional_cost);
                } else {
                    functional_cost = functional_cost.max(perimeter.functional_cost);
                }
            }
            for (name, cost) in &perimeter.virtual_costs {
                *virtual_costs.entry(name.clone()).or_default() += cost;
            }
            by_state.insert(perimeter.state, perimeter);
        }
        if functional_cost == f64::NEG_INFINITY {
            functional_cost = without_cnecs;
        }
        if by_state.is_empty() {
            functional_cost = 0.0;
        } else if functional_cost == f64::NEG_INFINITY {
            functional_cost = f64::INFINITY;
        }
        GlobalResult {
            status,
            functional_cost,
            virtual_costs,
            perimeters: by_state,
            second_preventive: false,
        }
    }

    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }

    pub fn perimeter(&self, state: StateId) -> Option<&PerimeterResult> {
        self.perimeters.get(&state)
    }

    /// Most limiting CNEC over every perimeter, by margin.
    pub fn most_limiting(&self) -> Option<(StateId, CnecId)> {
        self.perimeters
            .values()
            .filter_map(|p| {
                let cnec = *p.limiting_elements.first()?;
                Some((p.state, cnec, p.margins.get(&cnec).copied().unwrap_or(f64::INFINITY)))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2).then(a.1.cmp(&b.1)))
            .map(|(state, cnec, _)| (state, cnec))
    }

    /// Name-keyed view for export.
    pub fn report(&self, catalog: &Catalog) -> RaoReport {
        RaoReport {
            status: self.status,
            cost: self.cost(),
            functional_cost: self.functional_cost,
            virtual_costs: self.virtual_costs.clone(),
            second_preventive: self.second_preventive,
            perimeters: self
                .perimeters
                .values()
                .map(|p| PerimeterReport {
                    state: catalog.state_name(p.state),
                    status: p.status,
                    initial_cost: p.initial_cost,
                    cost: p.cost(),
                    functional_cost: p.functional_cost,
                    virtual_costs: p.virtual_costs.clone(),
                    network_actions: p
                        .network_actions
                        .iter()
                        .map(|id| catalog.network_action(*id).id.clone())
                        .collect(),
                    range_actions: p
                        .range_actions
                        .iter()
                        .map(|(id, setpoint)| (catalog.range_action(*id).id.clone(), *setpoint))
                        .collect(),
                    margins: p
                        .margins
                        .iter()
                        .map(|(id, margin)| (catalog.cnec(*id).id.clone(), *margin))
                        .collect(),
                    limiting_elements: p
                        .limiting_elements
                        .iter()
                        .take(5)
                        .map(|id| catalog.cnec(*id).id.clone())
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerimeterReport {
    pub state: String,
    pub status: ComputationStatus,
    pub initial_cost: f64,
    pub cost: f64,
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    pub network_actions: Vec<String>,
    pub range_actions: BTreeMap<String, f64>,
    pub margins: BTreeMap<String, f64>,
    pub limiting_elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaoReport {
    pub status: ComputationStatus,
    pub cost: f64,
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    pub second_preventive: bool,
    pub perimeters: Vec<PerimeterReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perimeter(state: usize, status: ComputationStatus, functional: f64, mnec: f64) -> PerimeterResult {
        PerimeterResult {
            state: StateId::new(state),
            status,
            initial_cost: 0.0,
            functional_cost: functional,
            virtual_costs: [("mnec-cost".to_string(), mnec)].into(),
            margins: BTreeMap::new(),
            limiting_elements: Vec::new(),
            network_actions: BTreeSet::new(),
            range_actions: BTreeMap::new(),
        }
    }

    #[test]
    fn statuses_order_from_best_to_worst() {
        use ComputationStatus::*;
        assert_eq!(Converged.worst(BudgetLimited), BudgetLimited);
        assert_eq!(PartialFailure.worst(BudgetLimited), PartialFailure);
        assert_eq!(Failure.worst(Converged), Failure);
    }

    #[test]
    fn aggregate_takes_worst_functional_and_sums_virtual() {
        let global = GlobalResult::aggregate([
            perimeter(0, ComputationStatus::Converged, -50.0, 1.0),
            perimeter(2, ComputationStatus::BudgetLimited, -20.0, 2.5),
        ]);
        assert_eq!(global.functional_cost, -20.0);
        assert_eq!(global.virtual_costs["mnec-cost"], 3.5);
        assert_eq!(global.cost(), -16.5);
        assert_eq!(global.status, ComputationStatus::BudgetLimited);
        assert!(global.perimeter(StateId::new(2)).is_some());
    }

    #[test]
    fn failed_perimeters_only_add_virtual_costs() {
        let mut failed = perimeter(3, ComputationStatus::Failure, f64::INFINITY, 0.0);
        failed.virtual_costs = [("sensitivity-failure-cost".to_string(), 1000.0)].into();
        let global = GlobalResult::aggregate([perimeter(0, ComputationStatus::Converged, -50.0, 0.0), failed]);
        assert_eq!(global.functional_cost, -50.0);
        assert_eq!(global.cost(), 950.0);
        assert_eq!(global.status, ComputationStatus::Failure);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&ComputationStatus::BudgetLimited).unwrap();
        assert_eq!(json, "\"budget-limited\"");
    }
}
