//! Search tree leaf: one combination of network actions on its own snapshot.

use std::collections::{BTreeMap, BTreeSet};

use rao_core::{
    Catalog, CnecId, GridSnapshot, NetworkActionId, Perimeter, RangeActionId, RaoResult, SensitivityProvider,
    SensitivityResult, SensitivityStatus,
};
use tracing::warn;

use crate::linear::{IteratingLinearOptimizer, LinearOptimizationResult, LinearProblemStatus};
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    Created,
    Evaluated,
    Optimized,
    /// Sensitivity computation failed; the leaf costs +inf.
    Error,
}

#[derive(Debug, Clone)]
pub struct Leaf<S> {
    snapshot: S,
    network_actions: BTreeSet<NetworkActionId>,
    last_action: Option<NetworkActionId>,
    status: LeafStatus,
    pre_optimization: Option<(SensitivityResult, ObjectiveFunctionResult)>,
    optimization: Option<LinearOptimizationResult>,
}

impl<S: GridSnapshot> Leaf<S> {
    pub fn root(snapshot: S) -> Self {
        Leaf {
            snapshot,
            network_actions: BTreeSet::new(),
            last_action: None,
            status: LeafStatus::Created,
            pre_optimization: None,
            optimization: None,
        }
    }

    /// Child holding this leaf's actions plus `action`, on a fork of the
    /// pre-optimisation snapshot. `None` when the action changes nothing.
    ///
    /// The fork starts from the optimised setpoints of this leaf, so range
    /// actions keep their best known position.
    pub fn child(&self, catalog: &Catalog, action: NetworkActionId) -> Option<Leaf<S>> {
        if self.network_actions.contains(&action) {
            return None;
        }
        let mut snapshot = self.snapshot.clone();
        if !snapshot.apply_network_action(catalog.network_action(action)) {
            return None;
        }
        let mut network_actions = self.network_actions.clone();
        network_actions.insert(action);
        Some(Leaf {
            snapshot,
            network_actions,
            last_action: Some(action),
            status: LeafStatus::Created,
            pre_optimization: None,
            optimization: None,
        })
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> S {
        self.snapshot
    }

    pub fn network_actions(&self) -> &BTreeSet<NetworkActionId> {
        &self.network_actions
    }

    /// Action added on top of the parent's; `None` for the root.
    pub fn last_action(&self) -> Option<NetworkActionId> {
        self.last_action
    }

    pub fn depth(&self) -> usize {
        self.network_actions.len()
    }

    /// Computes flows for the leaf's network actions.
    pub fn evaluate<P>(&mut self, catalog: &Catalog, perimeter: &Perimeter, provider: &P, objective: &ObjectiveFunction)
    where
        P: SensitivityProvider<S> + ?Sized,
    {
        if self.status != LeafStatus::Created {
            return;
        }
        match provider.compute(&self.snapshot, perimeter, catalog) {
            Ok(result) if result.global_status() != SensitivityStatus::Failure => {
                let cost = objective.evaluate(catalog, &result);
                self.pre_optimization = Some((result, cost));
                self.status = LeafStatus::Evaluated;
            }
            Ok(_) => {
                warn!(actions = ?self.network_actions, "sensitivity computation failed for leaf");
                self.status = LeafStatus::Error;
            }
            Err(err) => {
                warn!(actions = ?self.network_actions, error = %err, "sensitivity computation failed for leaf");
                self.status = LeafStatus::Error;
            }
        }
    }

    /// Optimises the range actions of an evaluated leaf.
    pub fn optimize<P>(
        &mut self,
        optimizer: &IteratingLinearOptimizer<'_, P>,
        perimeter: &Perimeter,
        objective: &ObjectiveFunction,
    ) -> RaoResult<()>
    where
        P: SensitivityProvider<S> + ?Sized,
    {
        if self.status != LeafStatus::Evaluated {
            return Ok(());
        }
        let Some((sensitivity, _)) = &self.pre_optimization else {
            return Ok(());
        };
        let result = optimizer.optimize(&mut self.snapshot, perimeter, objective, sensitivity.clone())?;
        self.optimization = Some(result);
        self.status = LeafStatus::Optimized;
        Ok(())
    }

    /// Latest objective: optimised if available, else pre-optimisation.
    pub fn objective(&self) -> Option<&ObjectiveFunctionResult> {
        match (&self.optimization, &self.pre_optimization) {
            (Some(optimized), _) => Some(&optimized.objective),
            (None, Some((_, evaluated))) => Some(evaluated),
            _ => None,
        }
    }

    pub fn sensitivity(&self) -> Option<&SensitivityResult> {
        match (&self.optimization, &self.pre_optimization) {
            (Some(optimized), _) => Some(&optimized.sensitivity),
            (None, Some((sensitivity, _))) => Some(sensitivity),
            _ => None,
        }
    }

    pub fn pre_optimization_cost(&self) -> f64 {
        self.pre_optimization.as_ref().map_or(f64::INFINITY, |(_, cost)| cost.cost())
    }

    /// Cost used for comparisons; +inf until evaluated and for failed leaves.
    pub fn cost(&self) -> f64 {
        match self.status {
            LeafStatus::Error | LeafStatus::Created => f64::INFINITY,
            _ => self.objective().map_or(f64::INFINITY, |o| o.cost()),
        }
    }

    pub fn functional_cost(&self) -> f64 {
        self.objective().map_or(f64::INFINITY, |o| o.functional_cost)
    }

    pub fn virtual_cost(&self) -> f64 {
        self.objective().map_or(0.0, |o| o.virtual_cost())
    }

    /// Optimised setpoints, empty before optimisation.
    pub fn range_actions(&self) -> BTreeMap<RangeActionId, f64> {
        self.optimization
            .as_ref()
            .map(|o| o.setpoints.clone())
            .unwrap_or_default()
    }

    pub fn linear_status(&self) -> Option<LinearProblemStatus> {
        self.optimization.as_ref().map(|o| o.status)
    }

    /// Whether the CNEC is overloaded in this leaf.
    pub fn is_constrained(&self, cnec: CnecId) -> bool {
        self.objective()
            .and_then(|o| o.margin(cnec))
            .is_some_and(|margin| margin < 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::Budget;
    use crate::parameters::RaoParameters;
    use crate::test_utils::case_from_json;

    const CATALOG: &str = r#"{
        "instants": [{"id": "preventive", "kind": "preventive"}],
        "cnecs": [
            {"id": "line", "network_element": "l1", "instant": "preventive",
             "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
        ],
        "network_actions": [
            {"id": "open-l2", "elementary_actions": [{"type": "topology", "element": "l2", "action": "open"}],
             "usage_rules": [{"type": "on-instant", "instant": "preventive"}]},
            {"id": "close-l3", "elementary_actions": [{"type": "topology", "element": "l3", "action": "close"}],
             "usage_rules": [{"type": "on-instant", "instant": "preventive"}]}
        ]
    }"#;

    const GRID: &str = r#"{
        "reference_flows": [{"cnec": "line", "flow": 150.0}],
        "action_impacts": [{"cnec": "line", "network_action": "open-l2", "delta": -80.0}]
    }"#;

    #[test]
    fn child_adds_exactly_one_action_and_skips_no_ops() {
        let case = case_from_json(CATALOG, GRID).unwrap();
        let root = Leaf::root(case.snapshot.clone());
        let open = case.catalog.network_action_id("open-l2").unwrap();
        let close = case.catalog.network_action_id("close-l3").unwrap();
        let child = root.child(&case.catalog, open).unwrap();
        assert_eq!(child.depth(), 1);
        assert_eq!(child.last_action(), Some(open));
        assert!(child.child(&case.catalog, open).is_none());
        // l3 is closed initially, closing it changes nothing
        assert!(root.child(&case.catalog, close).is_none());
        assert!(root.network_actions().is_empty());
    }

    #[test]
    fn failed_sensitivity_makes_leaf_infinitely_costly() {
        let case = case_from_json(
            CATALOG,
            r#"{
                "reference_flows": [{"cnec": "line", "flow": 150.0}],
                "failing_combinations": [["open-l2"]]
            }"#,
        )
        .unwrap();
        let mut perimeter = Perimeter::new(case.catalog.preventive_state());
        perimeter.cnecs = case.catalog.cnecs().map(|(id, _)| id).collect();
        let params = RaoParameters::default();
        let root_flows = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &root_flows);

        let mut root = Leaf::root(case.snapshot.clone());
        root.evaluate(&case.catalog, &perimeter, &case.provider, &objective);
        assert_eq!(root.status(), LeafStatus::Evaluated);
        assert_eq!(root.cost(), 50.0);
        assert!(root.is_constrained(case.catalog.cnec_id("line").unwrap()));

        let open = case.catalog.network_action_id("open-l2").unwrap();
        let mut child = root.child(&case.catalog, open).unwrap();
        child.evaluate(&case.catalog, &perimeter, &case.provider, &objective);
        assert_eq!(child.status(), LeafStatus::Error);
        assert!(child.cost().is_infinite());

        let budget = Budget::unlimited();
        let optimizer = IteratingLinearOptimizer::new(&case.catalog, &params, &case.provider, &budget);
        child.optimize(&optimizer, &perimeter, &objective).unwrap();
        assert_eq!(child.status(), LeafStatus::Error);
    }

    #[test]
    fn optimize_without_range_actions_keeps_evaluated_cost() {
        let case = case_from_json(CATALOG, GRID).unwrap();
        let mut perimeter = Perimeter::new(case.catalog.preventive_state());
        perimeter.cnecs = case.catalog.cnecs().map(|(id, _)| id).collect();
        let params = RaoParameters::default();
        let flows = case.provider.compute(&case.snapshot, &perimeter, &case.catalog).unwrap();
        let objective = ObjectiveFunction::build(&case.catalog, &perimeter, &params, &flows);
        let budget = Budget::unlimited();
        let optimizer = IteratingLinearOptimizer::new(&case.catalog, &params, &case.provider, &budget);

        let open = case.catalog.network_action_id("open-l2").unwrap();
        let mut leaf = Leaf::root(case.snapshot.clone()).child(&case.catalog, open).unwrap();
        leaf.evaluate(&case.catalog, &perimeter, &case.provider, &objective);
        leaf.optimize(&optimizer, &perimeter, &objective).unwrap();
        assert_eq!(leaf.status(), LeafStatus::Optimized);
        assert_eq!(leaf.cost(), -30.0);
        assert_eq!(leaf.pre_optimization_cost(), -30.0);
    }
}
