//! Problem fillers.
//!
//! Each filler writes one concern into the [`LinearProblem`]: setpoint and
//! flow variables, the min-margin objective, or one of the virtual-cost
//! penalties. The problem is linearised around the current setpoints using
//! the sensitivities of the last computation.

use std::collections::BTreeMap;

use rao_core::{
    Catalog, CnecId, Perimeter, RangeAction, RangeActionId, RangeActionKind, RaoResult, SensitivityResult,
    Side, Unit,
};

use super::problem::{LinearProblem, VarId, VarRole};
use crate::objective::virtual_cost::VirtualCost;
use crate::objective::ObjectiveFunction;
use crate::parameters::{PstModel, RangeActionsOptimizationParameters, RaoParameters};

/// Admissible windows shrink by this factor at each iteration when range
/// shrinking is enabled.
pub const RANGE_SHRINK_RATE: f64 = 0.667;

/// Everything a filler may read.
pub struct FillContext<'a> {
    pub catalog: &'a Catalog,
    pub perimeter: &'a Perimeter,
    pub parameters: &'a RaoParameters,
    pub objective: &'a ObjectiveFunction,
    /// Flows and sensitivities at the linearisation point.
    pub sensitivity: &'a SensitivityResult,
    /// Setpoints at the linearisation point.
    pub setpoints: &'a BTreeMap<RangeActionId, f64>,
    /// Setpoints at the start of the perimeter; movements are measured from here.
    pub reference_setpoints: &'a BTreeMap<RangeActionId, f64>,
    pub iteration: usize,
}

impl FillContext<'_> {
    fn setpoint(&self, id: RangeActionId) -> f64 {
        self.setpoints
            .get(&id)
            .or_else(|| self.reference_setpoints.get(&id))
            .copied()
            .unwrap_or_else(|| self.catalog.range_action(id).initial_setpoint)
    }

    fn reference_setpoint(&self, id: RangeActionId) -> f64 {
        self.reference_setpoints
            .get(&id)
            .copied()
            .unwrap_or_else(|| self.catalog.range_action(id).initial_setpoint)
    }

    fn unit(&self) -> Unit {
        self.objective.unit()
    }

    fn flow(&self, id: CnecId, side: Side) -> Option<f64> {
        self.sensitivity
            .flows
            .flow(id, self.catalog.cnec(id), side, self.unit())
    }
}

pub trait ProblemFiller: Send + Sync {
    /// Unique identifier (e.g., "core", "max-min-margin")
    fn id(&self) -> &str;

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()>;
}

pub fn penalty_cost(params: &RangeActionsOptimizationParameters, action: &RangeAction) -> f64 {
    match action.kind {
        RangeActionKind::PstTap { .. } => params.pst_penalty_cost,
        RangeActionKind::Hvdc => params.hvdc_penalty_cost,
        RangeActionKind::Injection | RangeActionKind::Standard => params.injection_penalty_cost,
    }
}

pub fn sensitivity_threshold(params: &RangeActionsOptimizationParameters, action: &RangeAction) -> f64 {
    match action.kind {
        RangeActionKind::PstTap { .. } => params.pst_sensitivity_threshold,
        RangeActionKind::Hvdc => params.hvdc_sensitivity_threshold,
        RangeActionKind::Injection | RangeActionKind::Standard => params.injection_sensitivity_threshold,
    }
}

// ============================================================================
// Core: setpoints, variations, flows, group alignment
// ============================================================================

pub struct CoreFiller;

impl ProblemFiller for CoreFiller {
    fn id(&self) -> &str {
        "core"
    }

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let ra_params = &ctx.parameters.range_actions_optimization;
        for &id in &ctx.perimeter.range_actions {
            let action = ctx.catalog.range_action(id);
            let reference = ctx.reference_setpoint(id);
            let current = ctx.setpoint(id);
            let (mut lo, mut hi) = action.admissible_range(reference);
            if ra_params.range_shrinking && ctx.iteration > 0 && (hi - lo).is_finite() {
                let window = (hi - lo) * RANGE_SHRINK_RATE.powi(ctx.iteration as i32);
                lo = lo.max(current - window);
                hi = hi.min(current + window);
            }
            if lo > hi {
                let pinned = current.clamp(hi, lo);
                lo = pinned;
                hi = pinned;
            }
            let setpoint = lp.add_variable(VarRole::Setpoint(id), format!("setpoint_{}", action.id), lo, hi);
            let variation = lp.add_variable(
                VarRole::AbsoluteVariation(id),
                format!("variation_{}", action.id),
                0.0,
                f64::INFINITY,
            );
            lp.add_constraint(
                format!("variation_up_{}", action.id),
                vec![(variation, 1.0), (setpoint, -1.0)],
                -reference,
                f64::INFINITY,
            );
            lp.add_constraint(
                format!("variation_down_{}", action.id),
                vec![(variation, 1.0), (setpoint, 1.0)],
                reference,
                f64::INFINITY,
            );
            lp.add_objective_term(variation, -penalty_cost(ra_params, action));
        }

        for &id in &ctx.perimeter.cnecs {
            let cnec = ctx.catalog.cnec(id);
            for side in cnec.monitored_sides() {
                let Some(reference_flow) = ctx.flow(id, side) else { continue };
                let flow = lp.add_variable(
                    VarRole::Flow(id, side),
                    format!("flow_{}_{:?}", cnec.id, side),
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                );
                let mut terms = vec![(flow, 1.0)];
                let mut rhs = reference_flow;
                for &ra in &ctx.perimeter.range_actions {
                    let action = ctx.catalog.range_action(ra);
                    let sensitivity = ctx.sensitivity.sensitivity(id, cnec, side, ra, ctx.unit());
                    if sensitivity.abs() < sensitivity_threshold(ra_params, action) {
                        continue;
                    }
                    if let Some(setpoint) = lp.var(VarRole::Setpoint(ra)) {
                        terms.push((setpoint, -sensitivity));
                        rhs -= sensitivity * ctx.setpoint(ra);
                    }
                }
                lp.add_constraint(format!("flow_def_{}_{:?}", cnec.id, side), terms, rhs, rhs);
            }
        }

        for group in ctx.catalog.groups() {
            let members: Vec<VarId> = group
                .members
                .iter()
                .filter(|m| ctx.perimeter.range_actions.contains(m))
                .filter_map(|m| lp.var(VarRole::Setpoint(*m)))
                .collect();
            for pair in members.windows(2) {
                lp.add_constraint(
                    format!("group_{}", group.id),
                    vec![(pair[0], 1.0), (pair[1], -1.0)],
                    0.0,
                    0.0,
                );
            }
        }
        Ok(())
    }
}

/// Bound terms `(coefficient on flow, rhs)` such that each bound reads
/// `scale * m + coefficient * flow <= rhs`.
fn bound_rows(lower: Option<f64>, upper: Option<f64>) -> Vec<(f64, f64)> {
    let mut rows = Vec::new();
    if let Some(ub) = upper {
        rows.push((1.0, ub));
    }
    if let Some(lb) = lower {
        rows.push((-1.0, -lb));
    }
    rows
}

// ============================================================================
// Max-min margin
// ============================================================================

pub struct MaxMinMarginFiller;

impl ProblemFiller for MaxMinMarginFiller {
    fn id(&self) -> &str {
        "max-min-margin"
    }

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let min_margin = lp.add_variable(VarRole::MinMargin, "min_margin", f64::NEG_INFINITY, f64::INFINITY);
        lp.add_objective_term(min_margin, 1.0);
        let unit = ctx.unit();
        let mut rows = 0;
        for &id in ctx.objective.functional_cnecs() {
            let cnec = ctx.catalog.cnec(id);
            for (side, lower, upper) in cnec.bounds(unit) {
                let Some(flow) = lp.var(VarRole::Flow(id, side)) else { continue };
                // relative margins are linearised: only CNECs with a positive
                // margin at the current point are divided by their PTDF sum
                let scale = match (ctx.objective.relative_lower_bound(), ctx.flow(id, side)) {
                    (Some(floor), Some(current)) if cnec.margin(current, side, unit) > 0.0 => ctx
                        .sensitivity
                        .flows
                        .ptdf_zonal_sum(id, side)
                        .map_or(1.0, |sum| sum.max(floor)),
                    _ => 1.0,
                };
                for (coefficient, rhs) in bound_rows(lower, upper) {
                    lp.add_constraint(
                        format!("min_margin_{}_{:?}", cnec.id, side),
                        vec![(min_margin, scale), (flow, coefficient)],
                        f64::NEG_INFINITY,
                        rhs,
                    );
                    rows += 1;
                }
            }
        }
        if rows == 0 {
            // nothing limits the margin: keep the problem bounded
            lp.tighten_bounds(min_margin, f64::NEG_INFINITY, 0.0);
        }
        Ok(())
    }
}

// ============================================================================
// Virtual costs
// ============================================================================

pub struct MnecFiller;

impl ProblemFiller for MnecFiller {
    fn id(&self) -> &str {
        "mnec"
    }

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let adjustment = ctx.parameters.mnec.constraint_adjustment_coefficient;
        for cost in ctx.objective.virtual_costs() {
            let VirtualCost::Mnec(mnec) = cost else { continue };
            for (&id, &floor) in &mnec.floors {
                let cnec = ctx.catalog.cnec(id);
                let violation = lp.add_variable(
                    VarRole::MnecViolation(id),
                    format!("mnec_violation_{}", cnec.id),
                    0.0,
                    f64::INFINITY,
                );
                lp.add_objective_term(violation, -mnec.cost);
                for (side, lower, upper) in cnec.bounds(mnec.unit) {
                    let Some(flow) = lp.var(VarRole::Flow(id, side)) else { continue };
                    // margin >= floor - violation, tightened by the adjustment
                    for (coefficient, rhs) in bound_rows(lower, upper) {
                        lp.add_constraint(
                            format!("mnec_{}_{:?}", cnec.id, side),
                            vec![(flow, coefficient), (violation, -1.0)],
                            f64::NEG_INFINITY,
                            rhs - floor - adjustment,
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct LoopFlowFiller;

impl ProblemFiller for LoopFlowFiller {
    fn id(&self) -> &str {
        "loop-flow"
    }

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let adjustment = ctx.parameters.loop_flow.constraint_adjustment_coefficient;
        for cost in ctx.objective.virtual_costs() {
            let VirtualCost::LoopFlow(loop_flow) = cost else { continue };
            for (&(id, side), &limit) in &loop_flow.limits {
                let Some(flow) = lp.var(VarRole::Flow(id, side)) else { continue };
                let Some(&commercial) = loop_flow.commercial_flows.get(&(id, side)) else { continue };
                let cnec = ctx.catalog.cnec(id);
                // flow variables live in the objective unit, loop flows in MW
                let to_mw = 1.0
                    / cnec
                        .convert(1.0, side, Unit::Megawatt, ctx.unit())
                        .unwrap_or(1.0);
                let violation = lp.add_variable(
                    VarRole::LoopFlowViolation(id, side),
                    format!("loop_flow_violation_{}_{:?}", cnec.id, side),
                    0.0,
                    f64::INFINITY,
                );
                lp.add_objective_term(violation, -loop_flow.cost);
                let limit = limit - adjustment;
                lp.add_constraint(
                    format!("loop_flow_up_{}_{:?}", cnec.id, side),
                    vec![(flow, to_mw), (violation, -1.0)],
                    f64::NEG_INFINITY,
                    commercial + limit,
                );
                lp.add_constraint(
                    format!("loop_flow_down_{}_{:?}", cnec.id, side),
                    vec![(flow, to_mw), (violation, 1.0)],
                    commercial - limit,
                    f64::INFINITY,
                );
            }
        }
        Ok(())
    }
}

pub struct MarginDecreaseFiller;

impl ProblemFiller for MarginDecreaseFiller {
    fn id(&self) -> &str {
        "margin-decrease"
    }

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        for cost in ctx.objective.virtual_costs() {
            let VirtualCost::MarginDecrease(decrease) = cost else { continue };
            for (&id, &initial_margin) in &decrease.initial_margins {
                let cnec = ctx.catalog.cnec(id);
                let lost = lp.add_variable(
                    VarRole::MarginDecrease(id),
                    format!("margin_decrease_{}", cnec.id),
                    0.0,
                    f64::INFINITY,
                );
                lp.add_objective_term(lost, -decrease.cost);
                for (side, lower, upper) in cnec.bounds(decrease.unit) {
                    let Some(flow) = lp.var(VarRole::Flow(id, side)) else { continue };
                    for (coefficient, rhs) in bound_rows(lower, upper) {
                        lp.add_constraint(
                            format!("margin_decrease_{}_{:?}", cnec.id, side),
                            vec![(flow, coefficient), (lost, -1.0)],
                            f64::NEG_INFINITY,
                            rhs - initial_margin,
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Discrete taps
// ============================================================================

/// Ties each PST angle to an integer tap through the local angle step.
pub struct DiscreteTapFiller;

impl ProblemFiller for DiscreteTapFiller {
    fn id(&self) -> &str {
        "discrete-tap"
    }

    fn fill(&self, lp: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        for &id in &ctx.perimeter.range_actions {
            let action = ctx.catalog.range_action(id);
            let Some(table) = action.tap_table() else { continue };
            let Some(setpoint) = lp.var(VarRole::Setpoint(id)) else { continue };
            let (Some(min_tap), Some(max_tap)) = (table.min_tap(), table.max_tap()) else { continue };
            let Some(current_tap) = table.closest_tap(ctx.setpoint(id)) else { continue };
            let step = table.step_around(current_tap);
            if step == 0.0 {
                continue;
            }
            let current_angle = table.angle(current_tap).unwrap_or_default();
            let tap = lp.add_integer_variable(
                VarRole::Tap(id),
                format!("tap_{}", action.id),
                f64::from(min_tap),
                f64::from(max_tap),
            );
            let rhs = current_angle - step * f64::from(current_tap);
            lp.add_constraint(
                format!("tap_to_angle_{}", action.id),
                vec![(setpoint, 1.0), (tap, -step)],
                rhs,
                rhs,
            );
        }
        Ok(())
    }
}

/// Fillers needed for the given parameters, in filling order.
pub fn fillers_for(parameters: &RaoParameters, objective: &ObjectiveFunction) -> Vec<Box<dyn ProblemFiller>> {
    let mut fillers: Vec<Box<dyn ProblemFiller>> = vec![Box::new(CoreFiller), Box::new(MaxMinMarginFiller)];
    for cost in objective.virtual_costs() {
        match cost {
            VirtualCost::Mnec(_) => fillers.push(Box::new(MnecFiller)),
            VirtualCost::LoopFlow(_) => fillers.push(Box::new(LoopFlowFiller)),
            VirtualCost::MarginDecrease(_) => fillers.push(Box::new(MarginDecreaseFiller)),
            VirtualCost::SensitivityFailure { .. } => {}
        }
    }
    if parameters.range_actions_optimization.pst_model == PstModel::ApproximatedIntegers {
        fillers.push(Box::new(DiscreteTapFiller));
    }
    fillers
}

pub fn build_problem(fillers: &[Box<dyn ProblemFiller>], ctx: &FillContext<'_>) -> RaoResult<LinearProblem> {
    let mut lp = LinearProblem::new();
    for filler in fillers {
        filler.fill(&mut lp, ctx)?;
        tracing::trace!(filler = filler.id(), variables = lp.variables().len(), "problem filled");
    }
    Ok(lp)
}
