//! Reference grid driven by tabulated, linearised data.
//!
//! Flows are reconstructed from reference flows, per-action flow impacts and
//! per-element sensitivities (with an optional curvature term), so results
//! are reproducible and cheap enough for tests and benchmarks.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::cnec::Side;
use crate::flow::{FlowResult, SensitivityResult, SensitivityStatus};
use crate::perimeter::Perimeter;
use crate::remedial_action::{ElementaryAction, NetworkAction, RangeAction, TopologyAction};
use crate::snapshot::{GridSnapshot, SensitivityProvider};
use crate::{CnecId, ContingencyId, RaoError, RaoResult};

fn default_side() -> Side {
    Side::One
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub cnec: String,
    #[serde(default = "default_side")]
    pub side: Side,
    /// Flow in MW with every action at its initial position.
    pub flow: f64,
    #[serde(default)]
    pub ptdf_zonal_sum: Option<f64>,
    #[serde(default)]
    pub commercial_flow: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub cnec: String,
    #[serde(default = "default_side")]
    pub side: Side,
    pub range_action: String,
    /// MW per setpoint unit around the initial setpoint.
    pub value: f64,
    /// Second-order term: the sensitivity drifts by `curvature` per setpoint unit.
    #[serde(default)]
    pub curvature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionImpactEntry {
    pub cnec: String,
    #[serde(default = "default_side")]
    pub side: Side,
    pub network_action: String,
    /// Flow change in MW once the action is applied.
    pub delta: f64,
}

/// Serde description of a linearised grid, keyed by catalog ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearGridModel {
    #[serde(default)]
    pub reference_flows: Vec<FlowEntry>,
    #[serde(default)]
    pub sensitivities: Vec<SensitivityEntry>,
    #[serde(default)]
    pub action_impacts: Vec<ActionImpactEntry>,
    /// Elements open in the initial network.
    #[serde(default)]
    pub open_elements: Vec<String>,
    /// Sets of network actions whose joint application makes the
    /// computation diverge.
    #[serde(default)]
    pub failing_combinations: Vec<Vec<String>>,
    /// Contingencies whose post-contingency states cannot be computed.
    #[serde(default)]
    pub failing_contingencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ReferenceFlow {
    flow: f64,
    ptdf_zonal_sum: Option<f64>,
    commercial_flow: Option<f64>,
}

/// Resolved grid data shared by every snapshot fork.
#[derive(Debug)]
struct LinearGrid {
    reference: HashMap<(CnecId, Side), ReferenceFlow>,
    /// (cnec, side) -> element -> (sensitivity, curvature)
    sensitivities: HashMap<(CnecId, Side), BTreeMap<String, (f64, f64)>>,
    impacts: HashMap<(CnecId, Side), BTreeMap<String, f64>>,
    initial_setpoints: BTreeMap<String, f64>,
    failing_combinations: Vec<BTreeSet<String>>,
    failing_contingencies: BTreeSet<ContingencyId>,
}

impl LinearGridModel {
    /// Resolves the tabulated data against `catalog` and returns the initial
    /// snapshot with a provider bound to the same grid.
    pub fn build(&self, catalog: &Catalog) -> RaoResult<(LinearGridSnapshot, LinearSensitivityProvider)> {
        let cnec = |name: &str| {
            catalog
                .cnec_id(name)
                .ok_or_else(|| RaoError::Validation(format!("grid data: unknown cnec '{name}'")))
        };

        let mut reference = HashMap::new();
        for entry in &self.reference_flows {
            reference.insert(
                (cnec(&entry.cnec)?, entry.side),
                ReferenceFlow {
                    flow: entry.flow,
                    ptdf_zonal_sum: entry.ptdf_zonal_sum,
                    commercial_flow: entry.commercial_flow,
                },
            );
        }

        let mut sensitivities: HashMap<(CnecId, Side), BTreeMap<String, (f64, f64)>> = HashMap::new();
        for entry in &self.sensitivities {
            let action = catalog.range_action_id(&entry.range_action).ok_or_else(|| {
                RaoError::Validation(format!(
                    "grid data: unknown range action '{}'",
                    entry.range_action
                ))
            })?;
            let element = catalog.range_action(action).network_element.clone();
            sensitivities
                .entry((cnec(&entry.cnec)?, entry.side))
                .or_default()
                .insert(element, (entry.value, entry.curvature));
        }

        let mut impacts: HashMap<(CnecId, Side), BTreeMap<String, f64>> = HashMap::new();
        for entry in &self.action_impacts {
            if catalog.network_action_id(&entry.network_action).is_none() {
                return Err(RaoError::Validation(format!(
                    "grid data: unknown network action '{}'",
                    entry.network_action
                )));
            }
            impacts
                .entry((cnec(&entry.cnec)?, entry.side))
                .or_default()
                .insert(entry.network_action.clone(), entry.delta);
        }

        let mut failing_combinations = Vec::new();
        for combination in &self.failing_combinations {
            for name in combination {
                if catalog.network_action_id(name).is_none() {
                    return Err(RaoError::Validation(format!(
                        "grid data: unknown network action '{name}' in failing combination"
                    )));
                }
            }
            failing_combinations.push(combination.iter().cloned().collect());
        }

        let failing_contingencies = self
            .failing_contingencies
            .iter()
            .map(|name| {
                catalog.contingency_id(name).ok_or_else(|| {
                    RaoError::Validation(format!("grid data: unknown contingency '{name}'"))
                })
            })
            .collect::<RaoResult<BTreeSet<_>>>()?;

        let mut initial_setpoints = BTreeMap::new();
        for (_, action) in catalog.range_actions() {
            initial_setpoints
                .entry(action.network_element.clone())
                .or_insert(action.initial_setpoint);
        }

        let grid = Arc::new(LinearGrid {
            reference,
            sensitivities,
            impacts,
            initial_setpoints,
            failing_combinations,
            failing_contingencies,
        });

        let mut elements = BTreeMap::new();
        for element in &self.open_elements {
            elements.insert(element.clone(), ElementState::Open);
        }
        let snapshot = LinearGridSnapshot {
            grid: Arc::clone(&grid),
            state: Arc::new(SnapshotState {
                elements,
                setpoints: BTreeMap::new(),
                applied: BTreeSet::new(),
            }),
        };
        let provider = LinearSensitivityProvider {
            grid,
            computations: AtomicUsize::new(0),
        };
        Ok((snapshot, provider))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ElementState {
    Open,
    Closed,
    Tap(i32),
    /// Injection setpoint, stored as raw bits to stay hashable.
    Setpoint(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotState {
    elements: BTreeMap<String, ElementState>,
    setpoints: BTreeMap<String, f64>,
    applied: BTreeSet<String>,
}

/// Copy-on-write snapshot of a [`LinearGridModel`]. Forks share their data
/// until one of them is modified.
#[derive(Debug, Clone)]
pub struct LinearGridSnapshot {
    grid: Arc<LinearGrid>,
    state: Arc<SnapshotState>,
}

impl LinearGridSnapshot {
    /// Ids of the network actions that changed this snapshot.
    pub fn applied_network_actions(&self) -> impl Iterator<Item = &str> {
        self.state.applied.iter().map(String::as_str)
    }

    pub fn is_open(&self, element: &str) -> bool {
        self.state.elements.get(element) == Some(&ElementState::Open)
    }

    fn element_setpoint(&self, element: &str) -> f64 {
        self.state
            .setpoints
            .get(element)
            .or_else(|| self.grid.initial_setpoints.get(element))
            .copied()
            .unwrap_or(0.0)
    }
}

fn changes(action: &ElementaryAction) -> Vec<(&str, ElementState)> {
    match action {
        ElementaryAction::Topology { element, action } => {
            let state = match action {
                TopologyAction::Open => ElementState::Open,
                TopologyAction::Close => ElementState::Closed,
            };
            vec![(element.as_str(), state)]
        }
        ElementaryAction::PstSetpoint { element, tap } => vec![(element.as_str(), ElementState::Tap(*tap))],
        ElementaryAction::InjectionSetpoint { element, setpoint } => {
            vec![(element.as_str(), ElementState::Setpoint(setpoint.to_bits()))]
        }
        ElementaryAction::SwitchPair { open, close } => vec![
            (open.as_str(), ElementState::Open),
            (close.as_str(), ElementState::Closed),
        ],
    }
}

impl GridSnapshot for LinearGridSnapshot {
    type Checkpoint = Arc<SnapshotState>;

    fn apply_network_action(&mut self, action: &NetworkAction) -> bool {
        let updates: Vec<(&str, ElementState)> = action
            .elementary_actions
            .iter()
            .flat_map(changes)
            .filter(|(element, target)| {
                let current = self.state.elements.get(*element).copied().unwrap_or(ElementState::Closed);
                current != *target
            })
            .collect();
        if updates.is_empty() {
            return false;
        }
        let state = Arc::make_mut(&mut self.state);
        for (element, target) in updates {
            state.elements.insert(element.to_string(), target);
        }
        state.applied.insert(action.id.clone());
        true
    }

    fn apply_range_action(&mut self, action: &RangeAction, setpoint: f64) {
        if self.state.setpoints.get(&action.network_element) == Some(&setpoint) {
            return;
        }
        Arc::make_mut(&mut self.state)
            .setpoints
            .insert(action.network_element.clone(), setpoint);
    }

    fn range_action_setpoint(&self, action: &RangeAction) -> f64 {
        self.state
            .setpoints
            .get(&action.network_element)
            .copied()
            .unwrap_or(action.initial_setpoint)
    }

    fn checkpoint(&self) -> Self::Checkpoint {
        Arc::clone(&self.state)
    }

    fn restore(&mut self, checkpoint: &Self::Checkpoint) {
        self.state = Arc::clone(checkpoint);
    }

    fn state_signature(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.state.elements.hash(&mut hasher);
        for (element, setpoint) in &self.state.setpoints {
            element.hash(&mut hasher);
            setpoint.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Sensitivity provider over tabulated linear data.
#[derive(Debug)]
pub struct LinearSensitivityProvider {
    grid: Arc<LinearGrid>,
    computations: AtomicUsize,
}

impl LinearSensitivityProvider {
    /// Number of `compute` calls served so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

impl SensitivityProvider<LinearGridSnapshot> for LinearSensitivityProvider {
    fn id(&self) -> &str {
        "linear"
    }

    fn compute(
        &self,
        snapshot: &LinearGridSnapshot,
        perimeter: &Perimeter,
        catalog: &Catalog,
    ) -> RaoResult<SensitivityResult> {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let states = perimeter.states(catalog);

        let mut all_actions: BTreeSet<&str> = snapshot.applied_network_actions().collect();
        for state in perimeter.applied.states() {
            for action in perimeter.applied.network_actions(state) {
                all_actions.insert(catalog.network_action(action).id.as_str());
            }
        }
        let diverges = self
            .grid
            .failing_combinations
            .iter()
            .any(|combination| combination.iter().all(|name| all_actions.contains(name.as_str())));
        if diverges {
            return Ok(SensitivityResult::failed(states));
        }

        let mut result = SensitivityResult::new(FlowResult::new());
        for state in &states {
            let failed = catalog
                .state(*state)
                .contingency
                .is_some_and(|c| self.grid.failing_contingencies.contains(&c));
            let status = if failed {
                SensitivityStatus::Failure
            } else {
                SensitivityStatus::Success
            };
            result.set_status(*state, status);
        }

        // secondary states in chronological order, so later setpoints win
        let mut secondary: Vec<_> = perimeter.applied.states().into_iter().collect();
        secondary.sort_by_key(|s| catalog.state_instant(*s).order);

        for &id in &perimeter.cnecs {
            let cnec = catalog.cnec(id);
            if result.status(cnec.state) == SensitivityStatus::Failure {
                continue;
            }
            let mut actions: BTreeSet<&str> = snapshot.applied_network_actions().collect();
            let mut setpoints: BTreeMap<&str, f64> = BTreeMap::new();
            for state in secondary.iter().filter(|s| catalog.cnec_follows_state(id, **s)) {
                for action in perimeter.applied.network_actions(*state) {
                    actions.insert(catalog.network_action(action).id.as_str());
                }
                for (action, setpoint) in perimeter.applied.range_actions(*state) {
                    setpoints.insert(catalog.range_action(action).network_element.as_str(), setpoint);
                }
            }
            let delta = |element: &str| {
                let current = setpoints
                    .get(element)
                    .copied()
                    .unwrap_or_else(|| snapshot.element_setpoint(element));
                let initial = self.grid.initial_setpoints.get(element).copied().unwrap_or(0.0);
                current - initial
            };

            for side in cnec.monitored_sides() {
                let reference = self.grid.reference.get(&(id, side)).copied();
                let mut flow = reference.map_or(0.0, |r| r.flow);
                if let Some(impacts) = self.grid.impacts.get(&(id, side)) {
                    flow += impacts
                        .iter()
                        .filter(|(action, _)| actions.contains(action.as_str()))
                        .map(|(_, impact)| impact)
                        .sum::<f64>();
                }
                let table = self.grid.sensitivities.get(&(id, side));
                if let Some(table) = table {
                    for (element, (sensitivity, curvature)) in table {
                        let d = delta(element);
                        flow += sensitivity * d + 0.5 * curvature * d * d;
                    }
                }
                result.flows.set_flow(id, side, flow);
                if let Some(r) = reference {
                    if let Some(sum) = r.ptdf_zonal_sum {
                        result.flows.set_ptdf_zonal_sum(id, side, sum);
                    }
                    if let Some(commercial) = r.commercial_flow {
                        result.flows.set_commercial_flow(id, side, commercial);
                    }
                }
                let Some(table) = table else { continue };
                for &action in &perimeter.range_actions {
                    let element = catalog.range_action(action).network_element.as_str();
                    if let Some((sensitivity, curvature)) = table.get(element) {
                        result.set_sensitivity(id, side, action, sensitivity + curvature * delta(element));
                    }
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogDefinition;
    use crate::{NetworkActionId, RangeActionId, StateId};

    fn catalog() -> Catalog {
        let definition: CatalogDefinition = serde_json::from_str(
            r#"{
                "instants": [
                    {"id": "preventive", "kind": "preventive"},
                    {"id": "curative", "kind": "curative"}
                ],
                "contingencies": [{"id": "co1"}, {"id": "co2"}],
                "cnecs": [
                    {"id": "prev", "network_element": "l1", "instant": "preventive",
                     "thresholds": [{"unit": "megawatt", "max": 100.0}]},
                    {"id": "cur", "network_element": "l1", "instant": "curative", "contingency": "co1",
                     "thresholds": [{"unit": "megawatt", "max": 100.0}]},
                    {"id": "cur2", "network_element": "l1", "instant": "curative", "contingency": "co2",
                     "thresholds": [{"unit": "megawatt", "max": 100.0}]}
                ],
                "network_actions": [
                    {"id": "open-l2", "elementary_actions": [{"type": "topology", "element": "l2", "action": "open"}]},
                    {"id": "open-l3", "elementary_actions": [{"type": "topology", "element": "l3", "action": "open"}]},
                    {"id": "close-l4", "elementary_actions": [{"type": "topology", "element": "l4", "action": "close"}]}
                ],
                "range_actions": [
                    {"id": "pst", "network_element": "pst-1", "kind": "pst-tap",
                     "taps": [{"tap": -1, "angle": -5.0}, {"tap": 0, "angle": 0.0}, {"tap": 1, "angle": 5.0}]}
                ]
            }"#,
        )
        .unwrap();
        definition.build().unwrap()
    }

    fn model() -> LinearGridModel {
        serde_json::from_str(
            r#"{
                "reference_flows": [
                    {"cnec": "prev", "flow": 120.0, "ptdf_zonal_sum": 0.4, "commercial_flow": 50.0},
                    {"cnec": "cur", "flow": 90.0},
                    {"cnec": "cur2", "flow": 80.0}
                ],
                "sensitivities": [
                    {"cnec": "prev", "range_action": "pst", "value": -4.0, "curvature": 0.2}
                ],
                "action_impacts": [
                    {"cnec": "prev", "network_action": "open-l2", "delta": -30.0},
                    {"cnec": "cur", "network_action": "open-l3", "delta": 15.0}
                ],
                "failing_combinations": [["open-l2", "open-l3"]],
                "failing_contingencies": ["co2"]
            }"#,
        )
        .unwrap()
    }

    fn perimeter(catalog: &Catalog) -> Perimeter {
        let mut perimeter = Perimeter::new(catalog.preventive_state());
        perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
        perimeter.range_actions.insert(RangeActionId::new(0));
        perimeter
    }

    #[test]
    fn reference_flows_without_actions() {
        let catalog = catalog();
        let (snapshot, provider) = model().build(&catalog).unwrap();
        let result = provider.compute(&snapshot, &perimeter(&catalog), &catalog).unwrap();
        assert_eq!(result.flows.flow_mw(CnecId::new(0), Side::One), Some(120.0));
        assert_eq!(result.flows.ptdf_zonal_sum(CnecId::new(0), Side::One), Some(0.4));
        assert_eq!(result.flows.loop_flow(CnecId::new(0), Side::One), Some(70.0));
        assert_eq!(result.sensitivity_mw(CnecId::new(0), Side::One, RangeActionId::new(0)), -4.0);
        assert_eq!(provider.computations(), 1);
    }

    #[test]
    fn network_action_impacts_and_no_op_detection() {
        let catalog = catalog();
        let (mut snapshot, provider) = model().build(&catalog).unwrap();
        let open_l2 = catalog.network_action(NetworkActionId::new(0));
        let before = snapshot.state_signature();
        assert!(snapshot.apply_network_action(open_l2));
        assert!(!snapshot.apply_network_action(open_l2));
        assert_ne!(before, snapshot.state_signature());
        // l4 is closed initially
        assert!(!snapshot.apply_network_action(catalog.network_action(NetworkActionId::new(2))));

        let result = provider.compute(&snapshot, &perimeter(&catalog), &catalog).unwrap();
        assert_eq!(result.flows.flow_mw(CnecId::new(0), Side::One), Some(90.0));
    }

    #[test]
    fn range_action_moves_flow_with_curvature() {
        let catalog = catalog();
        let (mut snapshot, provider) = model().build(&catalog).unwrap();
        let pst = catalog.range_action(RangeActionId::new(0));
        snapshot.apply_range_action(pst, 5.0);
        assert_eq!(snapshot.range_action_setpoint(pst), 5.0);
        let result = provider.compute(&snapshot, &perimeter(&catalog), &catalog).unwrap();
        let flow = result.flows.flow_mw(CnecId::new(0), Side::One).unwrap();
        assert!((flow - (120.0 - 20.0 + 0.5 * 0.2 * 25.0)).abs() < 1e-9);
        let sensitivity = result.sensitivity_mw(CnecId::new(0), Side::One, RangeActionId::new(0));
        assert!((sensitivity - (-4.0 + 0.2 * 5.0)).abs() < 1e-9);
    }

    #[test]
    fn forks_are_independent_and_restorable() {
        let catalog = catalog();
        let (snapshot, _) = model().build(&catalog).unwrap();
        let mut fork = snapshot.clone();
        let checkpoint = fork.checkpoint();
        assert!(fork.apply_network_action(catalog.network_action(NetworkActionId::new(1))));
        assert!(fork.is_open("l3"));
        assert!(!snapshot.is_open("l3"));
        fork.restore(&checkpoint);
        assert!(!fork.is_open("l3"));
        assert_eq!(fork.state_signature(), snapshot.state_signature());
    }

    #[test]
    fn failing_combination_fails_every_state() {
        let catalog = catalog();
        let (mut snapshot, provider) = model().build(&catalog).unwrap();
        snapshot.apply_network_action(catalog.network_action(NetworkActionId::new(0)));
        snapshot.apply_network_action(catalog.network_action(NetworkActionId::new(1)));
        let result = provider.compute(&snapshot, &perimeter(&catalog), &catalog).unwrap();
        assert_eq!(result.global_status(), SensitivityStatus::Failure);
    }

    #[test]
    fn failing_contingency_is_partial_failure() {
        let catalog = catalog();
        let (snapshot, provider) = model().build(&catalog).unwrap();
        let result = provider.compute(&snapshot, &perimeter(&catalog), &catalog).unwrap();
        assert_eq!(result.global_status(), SensitivityStatus::PartialFailure);
        assert!(!result.flows.has_flow(CnecId::new(2), Side::One));
    }

    #[test]
    fn secondary_actions_apply_to_following_states_only() {
        let catalog = catalog();
        let (snapshot, provider) = model().build(&catalog).unwrap();
        let mut perimeter = perimeter(&catalog);
        let curative = catalog.resolve_state("curative", Some("co1")).unwrap();
        perimeter.applied.add_network_action(curative, NetworkActionId::new(1));
        let result = provider.compute(&snapshot, &perimeter, &catalog).unwrap();
        assert_eq!(result.flows.flow_mw(CnecId::new(1), Side::One), Some(105.0));
        assert_eq!(result.flows.flow_mw(CnecId::new(0), Side::One), Some(120.0));
        assert_ne!(curative, StateId::new(0));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let catalog = catalog();
        let mut model = model();
        model.sensitivities[0].range_action = "nope".into();
        assert!(matches!(model.build(&catalog), Err(RaoError::Validation(_))));
    }
}
