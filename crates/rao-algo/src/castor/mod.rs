//! Sequencing of a full remedial action optimisation.
//!
//! The preventive perimeter is optimised first. Every contingency scenario
//! then starts from a fork of the post-preventive snapshot and optimises its
//! auto and curative states in chronological order; scenarios run in
//! parallel. An optional second preventive pass re-optimises the preventive
//! actions knowing which curative actions the first pass selected.

pub mod state_tree;

use std::collections::{BTreeMap, BTreeSet};

use rao_core::{
    AppliedRemedialActions, Catalog, CnecId, GridSnapshot, NetworkActionId, Perimeter, RaoError, RaoResult,
    SensitivityProvider, SensitivityResult, StateId, UsageMethod, UsageRule,
};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::budget::Budget;
use crate::objective::margin::cnec_margin;
use crate::objective::ObjectiveFunction;
use crate::parameters::{RaoParameters, SecondPreventiveCondition};
use crate::result::{ComputationStatus, GlobalResult, PerimeterResult};
use crate::search_tree::SearchTree;

pub use state_tree::{ContingencyScenario, OptimizedState, StateTree};

const SENSITIVITY_FAILURE_COST: &str = "sensitivity-failure-cost";

/// Result of one perimeter with the snapshot it leaves behind.
struct PerimeterOutcome<S> {
    result: PerimeterResult,
    snapshot: S,
    applied: AppliedRemedialActions,
}

struct ScenarioOutcome {
    results: Vec<PerimeterResult>,
    applied: AppliedRemedialActions,
}

/// One preventive optimisation followed by every contingency scenario.
struct Pass {
    global: GlobalResult,
    /// Actions selected in auto and curative states.
    post_contingency: AppliedRemedialActions,
}

/// Whether an action has an available (not forced) rule in `state`.
fn is_available(catalog: &Catalog, rules: &[UsageRule], state: StateId) -> bool {
    let available: Vec<UsageRule> = rules
        .iter()
        .copied()
        .filter(|rule| rule.method() == UsageMethod::Available)
        .collect();
    let any_cnec = |_: CnecId| true;
    catalog.usage_method(&available, state, &any_cnec).is_some()
}

/// Remedial action optimiser over a whole catalog.
pub struct Castor<'a, P: ?Sized> {
    catalog: &'a Catalog,
    parameters: &'a RaoParameters,
    provider: &'a P,
    budget: Budget,
    tree: StateTree,
}

impl<'a, P: ?Sized> Castor<'a, P> {
    /// Validates the parameters against the catalog; nothing is computed yet.
    pub fn new(catalog: &'a Catalog, parameters: &'a RaoParameters, provider: &'a P) -> RaoResult<Self> {
        parameters.validate()?;
        parameters.validate_against(catalog)?;
        Ok(Castor {
            catalog,
            parameters,
            provider,
            budget: Budget::new(&parameters.budget),
            tree: StateTree::build(catalog),
        })
    }

    pub fn state_tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Optimises every perimeter starting from `snapshot`, which is left
    /// untouched.
    pub fn run<S>(&self, snapshot: &S) -> RaoResult<GlobalResult>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        info!(
            provider = self.provider.id(),
            cnecs = self.catalog.cnecs().count(),
            scenarios = self.tree.scenarios.len(),
            "starting remedial action optimisation"
        );
        let initial = self.initial_computation(snapshot);

        let first = self.run_pass(
            snapshot,
            &initial,
            &self.tree.preventive.cnec_states,
            AppliedRemedialActions::new(),
        )?;
        info!(
            cost = first.global.cost(),
            status = first.global.status.as_str(),
            "preventive and post-contingency optimisation finished"
        );

        if !self.should_run_second_preventive(&first.global) {
            return Ok(self.finish(first.global));
        }
        if self.budget.is_exhausted() {
            warn!("computation budget exhausted, second preventive optimisation skipped");
            let mut global = first.global;
            global.status = global.status.worst(ComputationStatus::BudgetLimited);
            return Ok(self.finish(global));
        }

        info!("running second preventive optimisation");
        let second = self.run_pass(
            snapshot,
            &initial,
            &self.tree.all_states(),
            first.post_contingency.clone(),
        )?;
        if second.global.cost() < first.global.cost() {
            let mut global = second.global;
            global.second_preventive = true;
            Ok(self.finish(global))
        } else {
            info!(
                first = first.global.cost(),
                second = second.global.cost(),
                "second preventive optimisation did not improve, keeping first pass"
            );
            Ok(self.finish(first.global))
        }
    }

    fn finish(&self, global: GlobalResult) -> GlobalResult {
        info!(
            cost = global.cost(),
            functional = global.functional_cost,
            virtual_cost = global.virtual_cost(),
            status = global.status.as_str(),
            leaves = self.budget.leaf_evaluations(),
            elapsed_ms = self.budget.elapsed().as_millis() as u64,
            "remedial action optimisation finished"
        );
        global
    }

    /// Flows of every CNEC before any remedial action. Virtual costs are
    /// measured against this situation.
    fn initial_computation<S>(&self, snapshot: &S) -> SensitivityResult
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        let mut perimeter = Perimeter::new(self.catalog.preventive_state());
        perimeter.cnecs = self.catalog.cnecs().map(|(id, _)| id).collect();
        match self.provider.compute(snapshot, &perimeter, self.catalog) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "initial sensitivity computation failed");
                SensitivityResult::failed(self.catalog.states().map(|(id, _)| id))
            }
        }
    }

    fn should_run_second_preventive(&self, first: &GlobalResult) -> bool {
        if self.tree.scenarios.is_empty() {
            return false;
        }
        let preventive = self.tree.preventive.state;
        match self.parameters.second_preventive_rao.execution_condition {
            SecondPreventiveCondition::Disabled => false,
            SecondPreventiveCondition::PossibleCurativeImprovement => first
                .perimeters
                .values()
                .filter(|p| p.state != preventive && p.status != ComputationStatus::Failure)
                .any(|p| p.cost() > 0.0),
            SecondPreventiveCondition::CostIncrease => first
                .perimeter(preventive)
                .is_some_and(|p| first.cost() > p.cost()),
        }
    }

    fn run_pass<S>(
        &self,
        snapshot: &S,
        initial: &SensitivityResult,
        preventive_states: &BTreeSet<StateId>,
        post_contingency: AppliedRemedialActions,
    ) -> RaoResult<Pass>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        let preventive = self.optimize_perimeter(
            snapshot.clone(),
            self.tree.preventive.state,
            preventive_states,
            post_contingency,
            initial,
        )?;
        let preventive_failed = preventive.result.status == ComputationStatus::Failure;
        let scenarios = self.optimize_scenarios(&preventive.snapshot, initial)?;

        let mut applied = AppliedRemedialActions::new();
        let mut results = vec![preventive.result];
        for scenario in scenarios {
            applied.extend(&scenario.applied);
            results.extend(scenario.results);
        }
        let mut global = GlobalResult::aggregate(results);
        // a failed contingency degrades the run without failing it
        if !preventive_failed && global.status == ComputationStatus::Failure {
            global.status = ComputationStatus::PartialFailure;
        }
        Ok(Pass {
            global,
            post_contingency: applied,
        })
    }

    fn optimize_scenarios<S>(&self, post_preventive: &S, initial: &SensitivityResult) -> RaoResult<Vec<ScenarioOutcome>>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        if self.tree.scenarios.is_empty() {
            return Ok(Vec::new());
        }
        let threads = self.parameters.multithreading.contingency_scenarios_in_parallel.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| RaoError::Other(format!("failed to build contingency thread pool: {err}")))?;
        pool.install(|| {
            self.tree
                .scenarios
                .par_iter()
                .map(|scenario| self.optimize_scenario(post_preventive, scenario, initial))
                .collect()
        })
    }

    fn optimize_scenario<S>(
        &self,
        post_preventive: &S,
        scenario: &ContingencyScenario,
        initial: &SensitivityResult,
    ) -> RaoResult<ScenarioOutcome>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        debug!(
            contingency = %self.catalog.contingency(scenario.contingency).id,
            perimeters = scenario.perimeters.len(),
            "optimising contingency scenario"
        );
        let mut snapshot = post_preventive.clone();
        let mut results = Vec::with_capacity(scenario.perimeters.len());
        let mut applied = AppliedRemedialActions::new();
        for optimized in &scenario.perimeters {
            let outcome = self.optimize_perimeter(
                snapshot,
                optimized.state,
                &optimized.cnec_states,
                AppliedRemedialActions::new(),
                initial,
            )?;
            applied.extend(&outcome.applied);
            results.push(outcome.result);
            snapshot = outcome.snapshot;
        }
        Ok(ScenarioOutcome { results, applied })
    }

    fn optimize_perimeter<S>(
        &self,
        mut snapshot: S,
        state: StateId,
        cnec_states: &BTreeSet<StateId>,
        applied: AppliedRemedialActions,
        initial: &SensitivityResult,
    ) -> RaoResult<PerimeterOutcome<S>>
    where
        S: GridSnapshot,
        P: SensitivityProvider<S>,
    {
        let catalog = self.catalog;
        let instant = catalog.state_instant(state);
        let state_name = catalog.state_name(state);

        let mut perimeter = Perimeter::new(state);
        perimeter.cnecs = cnec_states
            .iter()
            .flat_map(|s| catalog.cnecs_in_state(*s).iter().copied())
            .collect();
        perimeter.applied = applied;

        // forced and on-constraint usage is decided on the margins before optimisation
        let unit = self.parameters.objective_function.unit;
        let before = match self.provider.compute(&snapshot, &perimeter, catalog) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(state = %state_name, error = %err, "sensitivity computation failed before optimisation");
                None
            }
        };
        let is_constrained = |cnec: CnecId| {
            before
                .as_ref()
                .and_then(|result| cnec_margin(catalog, &result.flows, cnec, unit))
                .is_some_and(|margin| margin < 0.0)
        };

        let mut forced: BTreeSet<NetworkActionId> = BTreeSet::new();
        let mut forced_applied: BTreeSet<NetworkActionId> = BTreeSet::new();
        for (id, action) in catalog.network_actions() {
            if catalog.usage_method(&action.usage_rules, state, &is_constrained) != Some(UsageMethod::Forced) {
                continue;
            }
            forced.insert(id);
            if snapshot.apply_network_action(action) {
                info!(state = %state_name, action = %action.id, "forced network action applied");
                forced_applied.insert(id);
            }
        }
        perimeter.network_actions = catalog
            .network_actions()
            .filter(|(id, action)| !forced.contains(id) && is_available(catalog, &action.usage_rules, state))
            .map(|(id, _)| id)
            .collect();
        perimeter.range_actions = catalog
            .range_actions()
            .filter(|(_, action)| catalog.usage_method(&action.usage_rules, state, &is_constrained).is_some())
            .map(|(id, _)| id)
            .collect();

        let topo = &self.parameters.topological_actions_optimization;
        let threads = &self.parameters.multithreading;
        let (max_depth, leaves_in_parallel) = if instant.is_preventive() {
            (topo.max_preventive_search_tree_depth, threads.preventive_leaves_in_parallel)
        } else if instant.is_auto() {
            (topo.max_auto_search_tree_depth, threads.curative_leaves_in_parallel)
        } else {
            (topo.max_curative_search_tree_depth, threads.curative_leaves_in_parallel)
        };
        info!(
            state = %state_name,
            cnecs = perimeter.cnecs.len(),
            network_actions = perimeter.network_actions.len(),
            range_actions = perimeter.range_actions.len(),
            max_depth,
            "optimising perimeter"
        );

        let objective = ObjectiveFunction::build(catalog, &perimeter, self.parameters, initial);
        let checkpoint = snapshot.checkpoint();
        let search = SearchTree::new(
            catalog,
            self.parameters,
            self.provider,
            &self.budget,
            &perimeter,
            &objective,
            max_depth,
            leaves_in_parallel,
        )
        .run(snapshot)?;

        let mut result = search.perimeter_result(&perimeter);
        let root_cost = search.root_cost;
        let mut snapshot = search.best.into_snapshot();

        let min_improvement = self.parameters.objective_function.curative_min_obj_improvement;
        if instant.is_curative()
            && min_improvement > 0.0
            && root_cost.is_finite()
            && result.cost() < root_cost
            && result.cost() > root_cost - min_improvement
        {
            info!(
                state = %state_name,
                gain = root_cost - result.cost(),
                min_improvement,
                "curative actions do not improve enough, dropping them"
            );
            snapshot.restore(&checkpoint);
            let reevaluated = self
                .provider
                .compute(&snapshot, &perimeter, catalog)
                .unwrap_or_else(|_| SensitivityResult::failed(perimeter.states(catalog)));
            let evaluation = objective.evaluate(catalog, &reevaluated);
            result.functional_cost = evaluation.functional_cost;
            result.virtual_costs = evaluation.virtual_costs;
            result.margins = evaluation.margins;
            result.limiting_elements = evaluation.limiting_elements;
            result.network_actions = BTreeSet::new();
            result.range_actions = perimeter
                .range_actions
                .iter()
                .map(|id| (*id, snapshot.range_action_setpoint(catalog.range_action(*id))))
                .collect::<BTreeMap<_, _>>();
        }

        result.network_actions.extend(forced_applied);
        if result.status == ComputationStatus::Failure {
            let overcost = self.parameters.objective_function.sensitivity_failure_overcost;
            if overcost > 0.0 {
                result.virtual_costs.insert(SENSITIVITY_FAILURE_COST.to_string(), overcost);
            }
            warn!(state = %state_name, "perimeter could not be computed");
        }

        let mut state_actions = AppliedRemedialActions::new();
        for id in &result.network_actions {
            state_actions.add_network_action(state, *id);
        }
        for (id, setpoint) in &result.range_actions {
            state_actions.set_range_action(state, *id, *setpoint);
        }

        Ok(PerimeterOutcome {
            result,
            snapshot,
            applied: state_actions,
        })
    }
}

/// Runs a complete optimisation of `catalog` from `snapshot`.
pub fn run_rao<S, P>(
    catalog: &Catalog,
    parameters: &RaoParameters,
    snapshot: &S,
    provider: &P,
) -> RaoResult<GlobalResult>
where
    S: GridSnapshot,
    P: SensitivityProvider<S> + ?Sized,
{
    Castor::new(catalog, parameters, provider)?.run(snapshot)
}
