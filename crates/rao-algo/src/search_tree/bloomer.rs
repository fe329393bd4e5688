//! Candidate network actions for the children of a leaf.

use std::collections::{BTreeMap, BTreeSet};

use rao_core::{Catalog, CnecId, GridSnapshot, NetworkActionId, Perimeter, UsageMethod};

use super::leaf::Leaf;
use crate::parameters::RaoParameters;

pub struct Bloomer<'a> {
    catalog: &'a Catalog,
    perimeter: &'a Perimeter,
    parameters: &'a RaoParameters,
}

impl<'a> Bloomer<'a> {
    pub fn new(catalog: &'a Catalog, perimeter: &'a Perimeter, parameters: &'a RaoParameters) -> Self {
        Bloomer {
            catalog,
            perimeter,
            parameters,
        }
    }

    /// Actions that may be added on top of `leaf`, ordered by id.
    pub fn bloom<S: GridSnapshot>(&self, leaf: &Leaf<S>) -> Vec<NetworkActionId> {
        let applied = leaf.network_actions();
        let limits = &self.parameters.ra_usage_limits;
        if limits.max_ra.is_some_and(|max| applied.len() >= max) {
            return Vec::new();
        }

        let mut operators: BTreeSet<&str> = BTreeSet::new();
        let mut topo_per_operator: BTreeMap<&str, usize> = BTreeMap::new();
        for id in applied {
            if let Some(operator) = self.catalog.network_action(*id).operator.as_deref() {
                operators.insert(operator);
                *topo_per_operator.entry(operator).or_default() += 1;
            }
        }

        let is_constrained = |cnec: CnecId| leaf.is_constrained(cnec);
        self.perimeter
            .network_actions
            .iter()
            .copied()
            .filter(|id| !applied.contains(id))
            .filter(|id| {
                let action = self.catalog.network_action(*id);
                self.catalog
                    .usage_method(&action.usage_rules, self.perimeter.main_state, &is_constrained)
                    == Some(UsageMethod::Available)
            })
            .filter(|id| {
                let Some(operator) = self.catalog.network_action(*id).operator.as_deref() else {
                    return true;
                };
                let tso_ok = operators.contains(operator)
                    || limits.max_tso.map_or(true, |max| operators.len() < max);
                let topo_ok = limits
                    .max_topo_per_tso
                    .get(operator)
                    .map_or(true, |max| topo_per_operator.get(operator).copied().unwrap_or(0) < *max);
                tso_ok && topo_ok
            })
            .filter(|id| self.is_close_to_most_limiting_element(leaf, *id))
            .collect()
    }

    fn is_close_to_most_limiting_element<S: GridSnapshot>(&self, leaf: &Leaf<S>, id: NetworkActionId) -> bool {
        let topo = &self.parameters.topological_actions_optimization;
        let graph = self.catalog.country_graph();
        if !topo.skip_actions_far_from_most_limiting_element || graph.is_empty() {
            return true;
        }
        let Some(limiting) = leaf.objective().and_then(|o| o.limiting_elements.first().copied()) else {
            return true;
        };
        let cnec_location = &self.catalog.cnec(limiting).location;
        let action_location = &self.catalog.network_action(id).location;
        if cnec_location.is_empty() || action_location.is_empty() {
            return true;
        }
        action_location.iter().any(|country| {
            cnec_location.iter().any(|other| {
                graph.are_neighbours(country, other, topo.max_number_of_boundaries_for_skipping_actions)
            })
        })
    }
}
