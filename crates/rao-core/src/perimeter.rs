//! The part of the catalog a single optimisation works on.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::Catalog;
use crate::{CnecId, NetworkActionId, RangeActionId, StateId};

/// Remedial actions already decided in states other than the perimeter's
/// main state. They are applied by the sensitivity provider but never
/// optimised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedRemedialActions {
    network: BTreeMap<StateId, BTreeSet<NetworkActionId>>,
    range: BTreeMap<StateId, BTreeMap<RangeActionId, f64>>,
}

impl AppliedRemedialActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network_action(&mut self, state: StateId, action: NetworkActionId) {
        self.network.entry(state).or_default().insert(action);
    }

    pub fn set_range_action(&mut self, state: StateId, action: RangeActionId, setpoint: f64) {
        self.range.entry(state).or_default().insert(action, setpoint);
    }

    pub fn network_actions(&self, state: StateId) -> impl Iterator<Item = NetworkActionId> + '_ {
        self.network.get(&state).into_iter().flatten().copied()
    }

    pub fn range_actions(&self, state: StateId) -> impl Iterator<Item = (RangeActionId, f64)> + '_ {
        self.range
            .get(&state)
            .into_iter()
            .flat_map(|m| m.iter().map(|(id, sp)| (*id, *sp)))
    }

    pub fn states(&self) -> BTreeSet<StateId> {
        self.network.keys().chain(self.range.keys()).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.network.values().all(BTreeSet::is_empty) && self.range.values().all(BTreeMap::is_empty)
    }

    pub fn extend(&mut self, other: &AppliedRemedialActions) {
        for (state, actions) in &other.network {
            self.network.entry(*state).or_default().extend(actions.iter().copied());
        }
        for (state, setpoints) in &other.range {
            self.range
                .entry(*state)
                .or_default()
                .extend(setpoints.iter().map(|(id, sp)| (*id, *sp)));
        }
    }
}

/// Main state, CNECs evaluated and actions optimised by one search tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Perimeter {
    pub main_state: StateId,
    pub cnecs: BTreeSet<CnecId>,
    /// Network actions the search tree may combine.
    pub network_actions: BTreeSet<NetworkActionId>,
    /// Range actions the linear optimiser may move.
    pub range_actions: BTreeSet<RangeActionId>,
    /// Actions fixed in other states of the perimeter.
    pub applied: AppliedRemedialActions,
}

impl Perimeter {
    pub fn new(main_state: StateId) -> Self {
        Perimeter {
            main_state,
            cnecs: BTreeSet::new(),
            network_actions: BTreeSet::new(),
            range_actions: BTreeSet::new(),
            applied: AppliedRemedialActions::new(),
        }
    }

    /// States whose CNECs belong to the perimeter.
    pub fn states(&self, catalog: &Catalog) -> BTreeSet<StateId> {
        self.cnecs.iter().map(|c| catalog.cnec(*c).state).collect()
    }

    pub fn optimized_cnecs<'a>(&'a self, catalog: &'a Catalog) -> impl Iterator<Item = CnecId> + 'a {
        self.cnecs.iter().copied().filter(|c| catalog.cnec(*c).optimized)
    }

    pub fn monitored_cnecs<'a>(&'a self, catalog: &'a Catalog) -> impl Iterator<Item = CnecId> + 'a {
        self.cnecs.iter().copied().filter(|c| catalog.cnec(*c).monitored)
    }
}
