//! The immutable remedial action catalog and its name-based definition.
//!
//! A [`CatalogDefinition`] is what callers load from disk: every reference
//! between entities is a string id. [`CatalogDefinition::build`] validates
//! the references and produces a [`Catalog`] arena in which entities point at
//! each other through typed indices.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cnec::{Cnec, Threshold, Unit};
use crate::country_graph::CountryGraph;
use crate::instant::{Contingency, Instant, InstantKind, State};
use crate::remedial_action::{
    ElementaryAction, NetworkAction, Range, RangeAction, RangeActionGroup, RangeActionKind,
    UsageMethod, UsageRule,
};
use crate::{
    CnecId, ContingencyId, InstantId, NetworkActionId, RangeActionId, RaoError, RaoResult,
    StateId,
};

// ============================================================================
// Definition (serde side)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantDefinition {
    pub id: String,
    pub kind: InstantKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnecDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub network_element: String,
    pub instant: String,
    #[serde(default)]
    pub contingency: Option<String>,
    pub thresholds: Vec<Threshold>,
    #[serde(default = "default_true")]
    pub optimized: bool,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub reliability_margin: f64,
    #[serde(default = "default_nominal_voltage")]
    pub nominal_voltage_kv: f64,
    /// Side-two voltage for transformers; defaults to `nominal_voltage_kv`.
    #[serde(default)]
    pub nominal_voltage_kv_side_two: Option<f64>,
    #[serde(default)]
    pub imax: Option<f64>,
    #[serde(default)]
    pub imax_side_two: Option<f64>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub location: Vec<String>,
    #[serde(default)]
    pub loop_flow_threshold: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_nominal_voltage() -> f64 {
    400.0
}

fn default_method() -> UsageMethod {
    UsageMethod::Available
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UsageRuleDefinition {
    OnInstant {
        instant: String,
        #[serde(default = "default_method")]
        method: UsageMethod,
    },
    OnContingencyState {
        instant: String,
        contingency: String,
        #[serde(default = "default_method")]
        method: UsageMethod,
    },
    OnConstraint {
        instant: String,
        cnec: String,
        #[serde(default = "default_method")]
        method: UsageMethod,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkActionDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub location: Vec<String>,
    pub elementary_actions: Vec<ElementaryAction>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeActionDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub location: Vec<String>,
    pub network_element: String,
    #[serde(flatten)]
    pub kind: RangeActionKind,
    #[serde(default)]
    pub ranges: Vec<Range>,
    #[serde(default)]
    pub initial_setpoint: f64,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeActionGroupDefinition {
    pub id: String,
    pub members: Vec<String>,
}

/// Name-based description of a study, as read from a case file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    pub instants: Vec<InstantDefinition>,
    #[serde(default)]
    pub contingencies: Vec<ContingencyDefinition>,
    #[serde(default)]
    pub cnecs: Vec<CnecDefinition>,
    #[serde(default)]
    pub network_actions: Vec<NetworkActionDefinition>,
    #[serde(default)]
    pub range_actions: Vec<RangeActionDefinition>,
    #[serde(default)]
    pub range_action_groups: Vec<RangeActionGroupDefinition>,
    /// Pairs of countries sharing a border.
    #[serde(default)]
    pub boundaries: Vec<(String, String)>,
}

// ============================================================================
// Catalog (arena side)
// ============================================================================

/// Validated, immutable catalog. Shared read-only by every optimisation.
#[derive(Debug, Clone)]
pub struct Catalog {
    instants: Vec<Instant>,
    contingencies: Vec<Contingency>,
    states: Vec<State>,
    cnecs: Vec<Cnec>,
    network_actions: Vec<NetworkAction>,
    range_actions: Vec<RangeAction>,
    groups: Vec<RangeActionGroup>,
    country_graph: CountryGraph,
    state_index: HashMap<(InstantId, Option<ContingencyId>), StateId>,
    cnecs_by_state: Vec<Vec<CnecId>>,
    group_of: HashMap<RangeActionId, usize>,
    instant_by_name: HashMap<String, InstantId>,
    contingency_by_name: HashMap<String, ContingencyId>,
    cnec_by_name: HashMap<String, CnecId>,
    network_action_by_name: HashMap<String, NetworkActionId>,
    range_action_by_name: HashMap<String, RangeActionId>,
}

impl Catalog {
    // -- instants and states --------------------------------------------------

    pub fn instant(&self, id: InstantId) -> &Instant {
        &self.instants[id.value()]
    }

    pub fn instants(&self) -> impl Iterator<Item = (InstantId, &Instant)> {
        self.instants.iter().enumerate().map(|(i, inst)| (InstantId::new(i), inst))
    }

    /// Instants of one kind, chronologically.
    pub fn instants_of_kind(&self, kind: InstantKind) -> Vec<InstantId> {
        let mut ids: Vec<InstantId> = self
            .instants()
            .filter(|(_, inst)| inst.kind == kind)
            .map(|(id, _)| id)
            .collect();
        ids.sort_by_key(|id| self.instant(*id).order);
        ids
    }

    pub fn instant_id(&self, name: &str) -> Option<InstantId> {
        self.instant_by_name.get(name).copied()
    }

    pub fn contingency(&self, id: ContingencyId) -> &Contingency {
        &self.contingencies[id.value()]
    }

    pub fn contingencies(&self) -> impl Iterator<Item = (ContingencyId, &Contingency)> {
        self.contingencies
            .iter()
            .enumerate()
            .map(|(i, c)| (ContingencyId::new(i), c))
    }

    pub fn contingency_id(&self, name: &str) -> Option<ContingencyId> {
        self.contingency_by_name.get(name).copied()
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.value()]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states.iter().enumerate().map(|(i, s)| (StateId::new(i), s))
    }

    /// The preventive state always occupies the first slot.
    pub fn preventive_state(&self) -> StateId {
        StateId::new(0)
    }

    pub fn state_for(&self, instant: InstantId, contingency: Option<ContingencyId>) -> Option<StateId> {
        self.state_index.get(&(instant, contingency)).copied()
    }

    pub fn state_instant(&self, id: StateId) -> &Instant {
        self.instant(self.state(id).instant)
    }

    /// States following a contingency, chronologically.
    pub fn states_after(&self, contingency: ContingencyId) -> Vec<StateId> {
        let mut ids: Vec<StateId> = self
            .states()
            .filter(|(_, s)| s.contingency == Some(contingency))
            .map(|(id, _)| id)
            .collect();
        ids.sort_by_key(|id| self.state_instant(*id).order);
        ids
    }

    /// Human-readable state id: `preventive` or `<contingency> - <instant>`.
    pub fn state_name(&self, id: StateId) -> String {
        let state = self.state(id);
        let instant = &self.instant(state.instant).id;
        match state.contingency {
            None => instant.clone(),
            Some(c) => format!("{} - {}", self.contingency(c).id, instant),
        }
    }

    pub fn resolve_state(&self, instant: &str, contingency: Option<&str>) -> RaoResult<StateId> {
        let instant_id = self
            .instant_id(instant)
            .ok_or_else(|| RaoError::Validation(format!("unknown instant '{instant}'")))?;
        let contingency_id = match contingency {
            Some(name) => Some(self.contingency_id(name).ok_or_else(|| {
                RaoError::Validation(format!("unknown contingency '{name}'"))
            })?),
            None => None,
        };
        self.state_for(instant_id, contingency_id).ok_or_else(|| {
            RaoError::Validation(format!(
                "no state for instant '{instant}' and contingency {contingency:?}"
            ))
        })
    }

    // -- cnecs ----------------------------------------------------------------

    pub fn cnec(&self, id: CnecId) -> &Cnec {
        &self.cnecs[id.value()]
    }

    pub fn cnecs(&self) -> impl Iterator<Item = (CnecId, &Cnec)> {
        self.cnecs.iter().enumerate().map(|(i, c)| (CnecId::new(i), c))
    }

    pub fn cnec_count(&self) -> usize {
        self.cnecs.len()
    }

    pub fn cnecs_in_state(&self, state: StateId) -> &[CnecId] {
        &self.cnecs_by_state[state.value()]
    }

    pub fn cnec_id(&self, name: &str) -> Option<CnecId> {
        self.cnec_by_name.get(name).copied()
    }

    // -- actions --------------------------------------------------------------

    pub fn network_action(&self, id: NetworkActionId) -> &NetworkAction {
        &self.network_actions[id.value()]
    }

    pub fn network_actions(&self) -> impl Iterator<Item = (NetworkActionId, &NetworkAction)> {
        self.network_actions
            .iter()
            .enumerate()
            .map(|(i, a)| (NetworkActionId::new(i), a))
    }

    pub fn network_action_id(&self, name: &str) -> Option<NetworkActionId> {
        self.network_action_by_name.get(name).copied()
    }

    pub fn range_action(&self, id: RangeActionId) -> &RangeAction {
        &self.range_actions[id.value()]
    }

    pub fn range_actions(&self) -> impl Iterator<Item = (RangeActionId, &RangeAction)> {
        self.range_actions
            .iter()
            .enumerate()
            .map(|(i, a)| (RangeActionId::new(i), a))
    }

    pub fn range_action_id(&self, name: &str) -> Option<RangeActionId> {
        self.range_action_by_name.get(name).copied()
    }

    pub fn groups(&self) -> &[RangeActionGroup] {
        &self.groups
    }

    pub fn group_of(&self, id: RangeActionId) -> Option<&RangeActionGroup> {
        self.group_of.get(&id).map(|idx| &self.groups[*idx])
    }

    pub fn country_graph(&self) -> &CountryGraph {
        &self.country_graph
    }

    // -- usage rules ----------------------------------------------------------

    /// How a remedial action may be used in `state`, or `None` when none of
    /// its rules apply. Forced wins over available. `is_constrained` tells
    /// whether a CNEC is currently overloaded.
    pub fn usage_method(
        &self,
        rules: &[UsageRule],
        state: StateId,
        is_constrained: &dyn Fn(CnecId) -> bool,
    ) -> Option<UsageMethod> {
        let current = self.state(state);
        let mut result = None;
        for rule in rules {
            let applies = match *rule {
                UsageRule::OnInstant { instant, .. } => current.instant == instant,
                UsageRule::OnContingencyState { state: rule_state, .. } => rule_state == state,
                UsageRule::OnConstraint { instant, cnec, .. } => {
                    current.instant == instant
                        && self.cnec_follows_state(cnec, state)
                        && is_constrained(cnec)
                }
            };
            if !applies {
                continue;
            }
            match rule.method() {
                UsageMethod::Forced => return Some(UsageMethod::Forced),
                UsageMethod::Available => result = Some(UsageMethod::Available),
            }
        }
        result
    }

    /// A CNEC is influenced by actions of `state` when it is monitored at or
    /// after that state's instant, on the same contingency (any CNEC for the
    /// preventive state).
    pub fn cnec_follows_state(&self, cnec: CnecId, state: StateId) -> bool {
        let current = self.state(state);
        if current.is_preventive() {
            return true;
        }
        let cnec_state = self.state(self.cnec(cnec).state);
        cnec_state.contingency == current.contingency
            && self.instant(cnec_state.instant).order >= self.instant(current.instant).order
    }
}

// ============================================================================
// Validation
// ============================================================================

fn invalid(message: impl Into<String>) -> RaoError {
    RaoError::Validation(message.into())
}

fn index_names<'a, Id: Copy>(
    what: &str,
    names: impl Iterator<Item = &'a str>,
    make_id: impl Fn(usize) -> Id,
) -> RaoResult<HashMap<String, Id>> {
    let mut index = HashMap::new();
    for (i, name) in names.enumerate() {
        if index.insert(name.to_string(), make_id(i)).is_some() {
            return Err(invalid(format!("duplicate {what} id '{name}'")));
        }
    }
    Ok(index)
}

struct Resolver<'a> {
    instant_by_name: &'a HashMap<String, InstantId>,
    contingency_by_name: &'a HashMap<String, ContingencyId>,
    cnec_by_name: &'a HashMap<String, CnecId>,
    state_index: &'a HashMap<(InstantId, Option<ContingencyId>), StateId>,
    instants: &'a [Instant],
}

impl Resolver<'_> {
    fn instant(&self, name: &str, context: &str) -> RaoResult<InstantId> {
        self.instant_by_name
            .get(name)
            .copied()
            .ok_or_else(|| invalid(format!("{context}: unknown instant '{name}'")))
    }

    fn contingency(&self, name: &str, context: &str) -> RaoResult<ContingencyId> {
        self.contingency_by_name
            .get(name)
            .copied()
            .ok_or_else(|| invalid(format!("{context}: unknown contingency '{name}'")))
    }

    fn state(&self, instant: &str, contingency: Option<&str>, context: &str) -> RaoResult<StateId> {
        let instant_id = self.instant(instant, context)?;
        let is_preventive = self.instants[instant_id.value()].is_preventive();
        let contingency_id = match (contingency, is_preventive) {
            (None, true) => None,
            (Some(name), false) => Some(self.contingency(name, context)?),
            (Some(_), true) => {
                return Err(invalid(format!(
                    "{context}: preventive instant cannot carry a contingency"
                )))
            }
            (None, false) => {
                return Err(invalid(format!(
                    "{context}: instant '{instant}' requires a contingency"
                )))
            }
        };
        self.state_index
            .get(&(instant_id, contingency_id))
            .copied()
            .ok_or_else(|| invalid(format!("{context}: unknown state")))
    }

    fn usage_rules(&self, rules: &[UsageRuleDefinition], context: &str) -> RaoResult<Vec<UsageRule>> {
        rules
            .iter()
            .map(|rule| match rule {
                UsageRuleDefinition::OnInstant { instant, method } => Ok(UsageRule::OnInstant {
                    instant: self.instant(instant, context)?,
                    method: *method,
                }),
                UsageRuleDefinition::OnContingencyState {
                    instant,
                    contingency,
                    method,
                } => Ok(UsageRule::OnContingencyState {
                    state: self.state(instant, Some(contingency), context)?,
                    method: *method,
                }),
                UsageRuleDefinition::OnConstraint {
                    instant,
                    cnec,
                    method,
                } => Ok(UsageRule::OnConstraint {
                    instant: self.instant(instant, context)?,
                    cnec: self
                        .cnec_by_name
                        .get(cnec)
                        .copied()
                        .ok_or_else(|| invalid(format!("{context}: unknown cnec '{cnec}'")))?,
                    method: *method,
                }),
            })
            .collect()
    }
}

impl CatalogDefinition {
    /// Validates every reference and builds the catalog arena.
    ///
    /// Fails with [`RaoError::Validation`] on duplicate ids, dangling
    /// references, CNECs without thresholds, empty ranges and inconsistent
    /// range-action groups.
    pub fn build(&self) -> RaoResult<Catalog> {
        let instants = self.build_instants()?;
        let instant_by_name = index_names(
            "instant",
            instants.iter().map(|i| i.id.as_str()),
            InstantId::new,
        )?;
        let contingency_by_name = index_names(
            "contingency",
            self.contingencies.iter().map(|c| c.id.as_str()),
            ContingencyId::new,
        )?;
        let contingencies: Vec<Contingency> = self
            .contingencies
            .iter()
            .map(|c| Contingency {
                id: c.id.clone(),
                name: c.name.clone(),
                elements: c.elements.clone(),
            })
            .collect();

        let (states, state_index) = build_states(&instants, contingencies.len());

        let cnec_by_name = index_names("cnec", self.cnecs.iter().map(|c| c.id.as_str()), CnecId::new)?;
        let network_action_by_name = index_names(
            "network action",
            self.network_actions.iter().map(|a| a.id.as_str()),
            NetworkActionId::new,
        )?;
        let range_action_by_name = index_names(
            "range action",
            self.range_actions.iter().map(|a| a.id.as_str()),
            RangeActionId::new,
        )?;

        let resolver = Resolver {
            instant_by_name: &instant_by_name,
            contingency_by_name: &contingency_by_name,
            cnec_by_name: &cnec_by_name,
            state_index: &state_index,
            instants: &instants,
        };

        let cnecs = self
            .cnecs
            .iter()
            .map(|def| build_cnec(def, &resolver))
            .collect::<RaoResult<Vec<_>>>()?;
        let mut cnecs_by_state = vec![Vec::new(); states.len()];
        for (i, cnec) in cnecs.iter().enumerate() {
            cnecs_by_state[cnec.state.value()].push(CnecId::new(i));
        }

        let network_actions = self
            .network_actions
            .iter()
            .map(|def| build_network_action(def, &resolver))
            .collect::<RaoResult<Vec<_>>>()?;
        let mut range_actions = self
            .range_actions
            .iter()
            .map(|def| build_range_action(def, &resolver))
            .collect::<RaoResult<Vec<_>>>()?;

        let (groups, group_of) = self.build_groups(&mut range_actions, &range_action_by_name)?;
        let country_graph = CountryGraph::new(
            self.boundaries
                .iter()
                .map(|(a, b)| (a.as_str(), b.as_str())),
        );

        Ok(Catalog {
            instants,
            contingencies,
            states,
            cnecs,
            network_actions,
            range_actions,
            groups,
            country_graph,
            state_index,
            cnecs_by_state,
            group_of,
            instant_by_name,
            contingency_by_name,
            cnec_by_name,
            network_action_by_name,
            range_action_by_name,
        })
    }

    fn build_instants(&self) -> RaoResult<Vec<Instant>> {
        let preventive = self
            .instants
            .iter()
            .filter(|i| i.kind == InstantKind::Preventive)
            .count();
        if preventive != 1 {
            return Err(invalid(format!(
                "exactly one preventive instant is required, found {preventive}"
            )));
        }
        if self.instants.iter().filter(|i| i.kind == InstantKind::Outage).count() > 1 {
            return Err(invalid("at most one outage instant is allowed"));
        }
        let mut order: Vec<usize> = (0..self.instants.len()).collect();
        order.sort_by_key(|i| self.instants[*i].kind);
        let mut instants: Vec<Instant> = self
            .instants
            .iter()
            .map(|def| Instant {
                id: def.id.clone(),
                kind: def.kind,
                order: 0,
            })
            .collect();
        for (position, idx) in order.into_iter().enumerate() {
            instants[idx].order = position;
        }
        // keep the preventive instant first so the preventive state is slot 0
        instants.sort_by_key(|i| i.order);
        Ok(instants)
    }

    fn build_groups(
        &self,
        range_actions: &mut [RangeAction],
        range_action_by_name: &HashMap<String, RangeActionId>,
    ) -> RaoResult<(Vec<RangeActionGroup>, HashMap<RangeActionId, usize>)> {
        let mut members: BTreeMap<String, Vec<RangeActionId>> = BTreeMap::new();
        for group in &self.range_action_groups {
            if group.members.is_empty() {
                return Err(invalid(format!("range action group '{}' is empty", group.id)));
            }
            let entry = members.entry(group.id.clone()).or_default();
            for member in &group.members {
                let id = range_action_by_name.get(member).copied().ok_or_else(|| {
                    invalid(format!(
                        "range action group '{}' references unknown range action '{member}'",
                        group.id
                    ))
                })?;
                if !entry.contains(&id) {
                    entry.push(id);
                }
            }
        }
        for (i, action) in range_actions.iter().enumerate() {
            if let Some(group_id) = &action.group_id {
                let entry = members.entry(group_id.clone()).or_default();
                if !entry.contains(&RangeActionId::new(i)) {
                    entry.push(RangeActionId::new(i));
                }
            }
        }

        let mut groups = Vec::new();
        let mut group_of = HashMap::new();
        for (id, mut ids) in members {
            ids.sort();
            let kind = range_actions[ids[0].value()].kind.as_str();
            for member in &ids {
                let action = &mut range_actions[member.value()];
                if action.kind.as_str() != kind {
                    return Err(invalid(format!(
                        "range action group '{id}' mixes {kind} and {} actions",
                        action.kind.as_str()
                    )));
                }
                if group_of.insert(*member, groups.len()).is_some() {
                    return Err(invalid(format!(
                        "range action '{}' belongs to several groups",
                        action.id
                    )));
                }
                action.group_id = Some(id.clone());
            }
            groups.push(RangeActionGroup { id, members: ids });
        }
        Ok((groups, group_of))
    }
}

fn build_states(
    instants: &[Instant],
    contingency_count: usize,
) -> (Vec<State>, HashMap<(InstantId, Option<ContingencyId>), StateId>) {
    let mut states = Vec::new();
    let mut index = HashMap::new();
    for (i, instant) in instants.iter().enumerate() {
        if instant.is_preventive() {
            index.insert((InstantId::new(i), None), StateId::new(states.len()));
            states.push(State {
                instant: InstantId::new(i),
                contingency: None,
            });
        }
    }
    for c in 0..contingency_count {
        for (i, instant) in instants.iter().enumerate() {
            if instant.is_preventive() {
                continue;
            }
            let contingency = Some(ContingencyId::new(c));
            index.insert((InstantId::new(i), contingency), StateId::new(states.len()));
            states.push(State {
                instant: InstantId::new(i),
                contingency,
            });
        }
    }
    (states, index)
}

fn build_cnec(def: &CnecDefinition, resolver: &Resolver<'_>) -> RaoResult<Cnec> {
    let context = format!("cnec '{}'", def.id);
    let state = resolver.state(&def.instant, def.contingency.as_deref(), &context)?;
    if def.thresholds.is_empty() {
        return Err(invalid(format!("{context}: no threshold")));
    }
    let imax_a = [def.imax, def.imax_side_two.or(def.imax)];
    for threshold in &def.thresholds {
        if threshold.min.is_none() && threshold.max.is_none() {
            return Err(invalid(format!("{context}: threshold without min or max")));
        }
        if let (Some(min), Some(max)) = (threshold.min, threshold.max) {
            if min > max {
                return Err(invalid(format!("{context}: threshold min {min} above max {max}")));
            }
        }
        if threshold.unit == Unit::PercentImax && imax_a[threshold.side.index()].is_none() {
            return Err(invalid(format!(
                "{context}: percent threshold on side {:?} without imax",
                threshold.side
            )));
        }
    }
    let nominal_voltage_kv = [
        def.nominal_voltage_kv,
        def.nominal_voltage_kv_side_two.unwrap_or(def.nominal_voltage_kv),
    ];
    if nominal_voltage_kv.iter().any(|v| *v <= 0.0) {
        return Err(invalid(format!("{context}: nominal voltage must be positive")));
    }
    Ok(Cnec {
        id: def.id.clone(),
        name: def.name.clone().unwrap_or_else(|| def.id.clone()),
        network_element: def.network_element.clone(),
        state,
        thresholds: def.thresholds.clone(),
        optimized: def.optimized,
        monitored: def.monitored,
        reliability_margin: def.reliability_margin,
        nominal_voltage_kv,
        imax_a,
        operator: def.operator.clone(),
        location: def.location.clone(),
        loop_flow_threshold_mw: def.loop_flow_threshold,
    })
}

fn build_network_action(def: &NetworkActionDefinition, resolver: &Resolver<'_>) -> RaoResult<NetworkAction> {
    let context = format!("network action '{}'", def.id);
    if def.elementary_actions.is_empty() {
        return Err(invalid(format!("{context}: no elementary action")));
    }
    let mut touched = HashSet::new();
    for element in def.elementary_actions.iter().flat_map(ElementaryAction::elements) {
        if !touched.insert(element) {
            return Err(invalid(format!("{context}: element '{element}' changed twice")));
        }
    }
    Ok(NetworkAction {
        id: def.id.clone(),
        name: def.name.clone().unwrap_or_else(|| def.id.clone()),
        operator: def.operator.clone(),
        location: def.location.clone(),
        elementary_actions: def.elementary_actions.clone(),
        usage_rules: resolver.usage_rules(&def.usage_rules, &context)?,
    })
}

fn build_range_action(def: &RangeActionDefinition, resolver: &Resolver<'_>) -> RaoResult<RangeAction> {
    let context = format!("range action '{}'", def.id);
    for range in &def.ranges {
        if range.min > range.max {
            return Err(invalid(format!(
                "{context}: range min {} above max {}",
                range.min, range.max
            )));
        }
    }
    if let RangeActionKind::PstTap { taps } = &def.kind {
        if taps.is_empty() {
            return Err(invalid(format!("{context}: empty tap table")));
        }
    }
    Ok(RangeAction {
        id: def.id.clone(),
        name: def.name.clone().unwrap_or_else(|| def.id.clone()),
        operator: def.operator.clone(),
        location: def.location.clone(),
        network_element: def.network_element.clone(),
        kind: def.kind.clone(),
        ranges: def.ranges.clone(),
        initial_setpoint: def.initial_setpoint,
        group_id: def.group_id.clone(),
        usage_rules: resolver.usage_rules(&def.usage_rules, &context)?,
    })
}
