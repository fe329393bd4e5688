//! Optimisation parameters.
//!
//! Parameters are grouped in sections mirroring the stages of the optimiser
//! and can be read from TOML or JSON. Every field has a default, so a file
//! only needs the values it overrides.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use rao_core::{Catalog, RaoError, RaoResult, Unit};
use serde::{Deserialize, Serialize};

use crate::linear::backend::LpBackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectiveType {
    /// Maximise the smallest margin.
    MaxMinMargin,
    /// Maximise the smallest margin divided by the CNEC's zonal PTDF sum.
    MaxMinRelativeMargin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopCriterion {
    /// Explore until no improvement is found.
    MinObjective,
    /// Stop as soon as the cost drops below `target_objective_value`.
    AtTargetObjectiveValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectiveFunctionParameters {
    pub objective_type: ObjectiveType,
    pub unit: Unit,
    pub stop_criterion: StopCriterion,
    pub target_objective_value: f64,
    /// Curative results are kept only if they beat the pre-curative cost by this much.
    pub curative_min_obj_improvement: f64,
    pub ptdf_sum_lower_bound: f64,
    /// Contingencies left out of the functional cost.
    pub excluded_contingencies: Vec<String>,
    /// Virtual cost added per state whose sensitivity computation failed.
    pub sensitivity_failure_overcost: f64,
}

impl Default for ObjectiveFunctionParameters {
    fn default() -> Self {
        Self {
            objective_type: ObjectiveType::MaxMinMargin,
            unit: Unit::Megawatt,
            stop_criterion: StopCriterion::MinObjective,
            target_objective_value: 0.0,
            curative_min_obj_improvement: 0.0,
            ptdf_sum_lower_bound: 0.01,
            excluded_contingencies: Vec::new(),
            sensitivity_failure_overcost: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PstModel {
    /// Angles optimised continuously, then rounded to the best tap.
    Continuous,
    /// Taps modelled as integer variables around the current tap (MIP).
    ApproximatedIntegers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangeActionsOptimizationParameters {
    pub max_mip_iterations: usize,
    pub pst_model: PstModel,
    /// Cost per degree of PST movement.
    pub pst_penalty_cost: f64,
    pub pst_sensitivity_threshold: f64,
    /// Cost per MW of HVDC setpoint movement.
    pub hvdc_penalty_cost: f64,
    pub hvdc_sensitivity_threshold: f64,
    pub injection_penalty_cost: f64,
    pub injection_sensitivity_threshold: f64,
    /// Narrow each setpoint's admissible window between iterations.
    pub range_shrinking: bool,
    pub solver: LpBackendKind,
    pub solver_time_limit_seconds: f64,
    /// Minimum cost decrease for an iteration to be accepted.
    pub min_iteration_improvement: f64,
}

impl Default for RangeActionsOptimizationParameters {
    fn default() -> Self {
        Self {
            max_mip_iterations: 10,
            pst_model: PstModel::Continuous,
            pst_penalty_cost: 0.01,
            pst_sensitivity_threshold: 1e-6,
            hvdc_penalty_cost: 0.001,
            hvdc_sensitivity_threshold: 1e-6,
            injection_penalty_cost: 0.001,
            injection_sensitivity_threshold: 1e-6,
            range_shrinking: false,
            solver: LpBackendKind::default(),
            solver_time_limit_seconds: 60.0,
            min_iteration_improvement: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopoOptimizationParameters {
    pub max_preventive_search_tree_depth: usize,
    pub max_auto_search_tree_depth: usize,
    pub max_curative_search_tree_depth: usize,
    /// Fraction of the previous cost a new depth must gain.
    pub relative_minimum_impact_threshold: f64,
    /// Absolute cost a new depth must gain.
    pub absolute_minimum_impact_threshold: f64,
    /// Leaves within this cost of the best are considered tied.
    pub tie_tolerance: f64,
    pub skip_actions_far_from_most_limiting_element: bool,
    pub max_number_of_boundaries_for_skipping_actions: usize,
}

impl Default for TopoOptimizationParameters {
    fn default() -> Self {
        Self {
            max_preventive_search_tree_depth: 2,
            max_auto_search_tree_depth: 2,
            max_curative_search_tree_depth: 2,
            relative_minimum_impact_threshold: 0.0,
            absolute_minimum_impact_threshold: 0.0,
            tie_tolerance: 1e-6,
            skip_actions_far_from_most_limiting_element: false,
            max_number_of_boundaries_for_skipping_actions: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecondPreventiveCondition {
    Disabled,
    /// Run when a curative perimeter still ends with a positive cost.
    PossibleCurativeImprovement,
    /// Run when the cost after curative optimisation exceeds the preventive cost.
    CostIncrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecondPreventiveRaoParameters {
    pub execution_condition: SecondPreventiveCondition,
}

impl Default for SecondPreventiveRaoParameters {
    fn default() -> Self {
        Self {
            execution_condition: SecondPreventiveCondition::Disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotOptimizedCnecsParameters {
    /// Operators whose CNECs are only kept from getting worse than initially.
    pub operators_not_to_optimize: Vec<String>,
    /// Cost per unit of margin decrease on those CNECs.
    pub margin_decrease_cost: f64,
}

impl Default for NotOptimizedCnecsParameters {
    fn default() -> Self {
        Self {
            operators_not_to_optimize: Vec::new(),
            margin_decrease_cost: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MnecParameters {
    pub acceptable_margin_decrease: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopFlowParameters {
    pub enabled: bool,
    pub acceptable_increase: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            acceptable_increase: 0.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

/// Limits on the number of remedial actions per state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaUsageLimits {
    pub max_ra: Option<usize>,
    pub max_tso: Option<usize>,
    pub max_topo_per_tso: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultithreadingParameters {
    pub contingency_scenarios_in_parallel: usize,
    pub preventive_leaves_in_parallel: usize,
    pub curative_leaves_in_parallel: usize,
}

impl Default for MultithreadingParameters {
    fn default() -> Self {
        Self {
            contingency_scenarios_in_parallel: 1,
            preventive_leaves_in_parallel: 1,
            curative_leaves_in_parallel: 1,
        }
    }
}

/// Global computation budget shared by every perimeter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetParameters {
    pub max_duration_seconds: Option<f64>,
    pub max_leaf_evaluations: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaoParameters {
    pub objective_function: ObjectiveFunctionParameters,
    pub range_actions_optimization: RangeActionsOptimizationParameters,
    pub topological_actions_optimization: TopoOptimizationParameters,
    pub second_preventive_rao: SecondPreventiveRaoParameters,
    pub not_optimized_cnecs: NotOptimizedCnecsParameters,
    pub mnec: MnecParameters,
    pub loop_flow: LoopFlowParameters,
    pub ra_usage_limits: RaUsageLimits,
    pub multithreading: MultithreadingParameters,
    pub budget: BudgetParameters,
}

/// File formats parameters can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParametersFormat {
    Toml,
    Json,
}

impl FromStr for ParametersFormat {
    type Err = RaoError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "toml" => Ok(ParametersFormat::Toml),
            "json" => Ok(ParametersFormat::Json),
            other => Err(RaoError::Configuration(format!(
                "unknown parameters format '{other}'; supported values: {}",
                Self::available().join(", ")
            ))),
        }
    }
}

impl ParametersFormat {
    pub fn from_path(path: &Path) -> RaoResult<Self> {
        path.extension().and_then(|e| e.to_str()).unwrap_or_default().parse()
    }

    pub fn available() -> &'static [&'static str] {
        &["toml", "json"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParametersFormat::Toml => "toml",
            ParametersFormat::Json => "json",
        }
    }
}

fn configuration(message: impl Into<String>) -> RaoError {
    RaoError::Configuration(message.into())
}

impl RaoParameters {
    pub fn parse(text: &str, format: ParametersFormat) -> RaoResult<Self> {
        match format {
            ParametersFormat::Toml => toml::from_str(text).map_err(|e| RaoError::Parse(e.to_string())),
            ParametersFormat::Json => Ok(serde_json::from_str(text)?),
        }
    }

    /// Reads and validates parameters; the format follows the file extension.
    pub fn from_path(path: &Path) -> RaoResult<Self> {
        let format = ParametersFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        let parameters = Self::parse(&text, format)?;
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn render(&self, format: ParametersFormat) -> RaoResult<String> {
        match format {
            ParametersFormat::Toml => toml::to_string_pretty(self).map_err(|e| RaoError::Parse(e.to_string())),
            ParametersFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// Checks value ranges and solver capabilities.
    pub fn validate(&self) -> RaoResult<()> {
        let objective = &self.objective_function;
        if objective.unit == Unit::PercentImax {
            return Err(configuration("objective unit must be megawatt or ampere"));
        }
        if objective.ptdf_sum_lower_bound <= 0.0 {
            return Err(configuration("ptdf_sum_lower_bound must be positive"));
        }
        if objective.curative_min_obj_improvement < 0.0 || objective.sensitivity_failure_overcost < 0.0 {
            return Err(configuration("objective improvements and overcosts must be non-negative"));
        }

        let ra = &self.range_actions_optimization;
        if ra.max_mip_iterations == 0 {
            return Err(configuration("max_mip_iterations must be at least 1"));
        }
        let non_negative = [
            ra.pst_penalty_cost,
            ra.hvdc_penalty_cost,
            ra.injection_penalty_cost,
            ra.pst_sensitivity_threshold,
            ra.hvdc_sensitivity_threshold,
            ra.injection_sensitivity_threshold,
            ra.min_iteration_improvement,
        ];
        if non_negative.iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(configuration("penalty costs and sensitivity thresholds must be non-negative"));
        }
        if ra.solver_time_limit_seconds <= 0.0 {
            return Err(configuration("solver_time_limit_seconds must be positive"));
        }
        if !ra.solver.is_available() {
            return Err(configuration(format!(
                "solver '{}' is not compiled in; available: {}",
                ra.solver.as_str(),
                LpBackendKind::available().join(", ")
            )));
        }
        if ra.pst_model == PstModel::ApproximatedIntegers && !ra.solver.supports_integers() {
            return Err(configuration(format!(
                "pst_model approximated-integers needs a MIP solver; '{}' only solves continuous problems",
                ra.solver.as_str()
            )));
        }

        let topo = &self.topological_actions_optimization;
        if !(0.0..=1.0).contains(&topo.relative_minimum_impact_threshold) {
            return Err(configuration("relative_minimum_impact_threshold must lie in [0, 1]"));
        }
        if topo.absolute_minimum_impact_threshold < 0.0 || topo.tie_tolerance < 0.0 {
            return Err(configuration("impact thresholds and tie tolerance must be non-negative"));
        }

        let threads = &self.multithreading;
        if threads.contingency_scenarios_in_parallel == 0
            || threads.preventive_leaves_in_parallel == 0
            || threads.curative_leaves_in_parallel == 0
        {
            return Err(configuration("multithreading counts must be at least 1"));
        }

        if let Some(duration) = self.budget.max_duration_seconds {
            if duration <= 0.0 {
                return Err(configuration("max_duration_seconds must be positive"));
            }
        }
        if self.mnec.acceptable_margin_decrease < 0.0 || self.mnec.violation_cost < 0.0 {
            return Err(configuration("mnec parameters must be non-negative"));
        }
        if self.loop_flow.violation_cost < 0.0 || self.not_optimized_cnecs.margin_decrease_cost < 0.0 {
            return Err(configuration("virtual costs must be non-negative"));
        }
        Ok(())
    }

    /// Checks references to catalog entities.
    pub fn validate_against(&self, catalog: &Catalog) -> RaoResult<()> {
        for name in &self.objective_function.excluded_contingencies {
            if catalog.contingency_id(name).is_none() {
                return Err(configuration(format!("excluded contingency '{name}' is not in the catalog")));
            }
        }
        Ok(())
    }
}
