//! Split of the catalog states into optimised perimeters.
//!
//! The preventive perimeter owns the preventive and outage states, plus
//! every post-contingency state where no remedial action can be used.
//! Each auto or curative state with usable actions becomes its own
//! perimeter and also owns the following states of its contingency until
//! the next optimised state.

use std::collections::BTreeSet;

use rao_core::{Catalog, CnecId, ContingencyId, StateId};

/// A state optimised on its own, with the states whose CNECs it watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedState {
    pub state: StateId,
    pub cnec_states: BTreeSet<StateId>,
}

/// Optimised states following one contingency, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContingencyScenario {
    pub contingency: ContingencyId,
    pub perimeters: Vec<OptimizedState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTree {
    pub preventive: OptimizedState,
    pub scenarios: Vec<ContingencyScenario>,
}

fn has_usable_action(catalog: &Catalog, state: StateId) -> bool {
    let any_cnec = |_: CnecId| true;
    catalog
        .network_actions()
        .any(|(_, a)| catalog.usage_method(&a.usage_rules, state, &any_cnec).is_some())
        || catalog
            .range_actions()
            .any(|(_, a)| catalog.usage_method(&a.usage_rules, state, &any_cnec).is_some())
}

impl StateTree {
    pub fn build(catalog: &Catalog) -> Self {
        let preventive_state = catalog.preventive_state();
        let mut preventive = OptimizedState {
            state: preventive_state,
            cnec_states: BTreeSet::from([preventive_state]),
        };
        let mut scenarios = Vec::new();

        for (contingency, _) in catalog.contingencies() {
            let mut states = catalog.states_after(contingency);
            states.sort_by_key(|s| catalog.state_instant(*s).order);

            let mut perimeters: Vec<OptimizedState> = Vec::new();
            for state in states {
                let instant = catalog.state_instant(state);
                if !instant.is_outage() && has_usable_action(catalog, state) {
                    perimeters.push(OptimizedState {
                        state,
                        cnec_states: BTreeSet::from([state]),
                    });
                    continue;
                }
                match perimeters.last_mut() {
                    Some(owner) => owner.cnec_states.insert(state),
                    None => preventive.cnec_states.insert(state),
                };
            }
            if !perimeters.is_empty() {
                scenarios.push(ContingencyScenario {
                    contingency,
                    perimeters,
                });
            }
        }

        StateTree { preventive, scenarios }
    }

    /// Every state whose CNECs are watched by some perimeter.
    pub fn all_states(&self) -> BTreeSet<StateId> {
        let mut states = self.preventive.cnec_states.clone();
        for scenario in &self.scenarios {
            for perimeter in &scenario.perimeters {
                states.extend(perimeter.cnec_states.iter().copied());
            }
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::catalog_from_json;

    #[test]
    fn contingencies_without_actions_stay_preventive() {
        let catalog = catalog_from_json(
            r#"{
                "instants": [
                    {"id": "preventive", "kind": "preventive"},
                    {"id": "outage", "kind": "outage"},
                    {"id": "auto", "kind": "auto"},
                    {"id": "curative", "kind": "curative"}
                ],
                "contingencies": [{"id": "co1"}, {"id": "co2"}],
                "network_actions": [
                    {"id": "cur-co1", "elementary_actions": [{"type": "topology", "element": "l2", "action": "open"}],
                     "usage_rules": [{"type": "on-contingency-state", "instant": "curative", "contingency": "co1"}]}
                ]
            }"#,
        )
        .unwrap();
        let tree = StateTree::build(&catalog);
        let co1 = catalog.contingency_id("co1").unwrap();
        let curative_co1 = catalog.resolve_state("curative", Some("co1")).unwrap();
        let auto_co1 = catalog.resolve_state("auto", Some("co1")).unwrap();
        let outage_co1 = catalog.resolve_state("outage", Some("co1")).unwrap();
        let curative_co2 = catalog.resolve_state("curative", Some("co2")).unwrap();

        assert_eq!(tree.scenarios.len(), 1);
        assert_eq!(tree.scenarios[0].contingency, co1);
        assert_eq!(tree.scenarios[0].perimeters.len(), 1);
        assert_eq!(tree.scenarios[0].perimeters[0].state, curative_co1);
        assert!(tree.preventive.cnec_states.contains(&outage_co1));
        assert!(tree.preventive.cnec_states.contains(&auto_co1));
        assert!(tree.preventive.cnec_states.contains(&curative_co2));
        assert!(!tree.preventive.cnec_states.contains(&curative_co1));
        assert_eq!(tree.all_states().len(), catalog.states().count());
    }
}
