//! Rounding of LP setpoints to values a range action can take.
//!
//! PST angles go to one of the two bracketing taps, whichever gives the
//! larger linearised minimum margin. Other kinds are rounded to integers.
//! Members of an aligned group are rounded jointly and receive the exact
//! same value.

use std::collections::{BTreeMap, BTreeSet};

use rao_core::{Catalog, Perimeter, RangeActionId, SensitivityResult};

use super::backend::LpSolution;
use super::problem::{LinearProblem, VarRole};
use crate::objective::ObjectiveFunction;

/// Setpoints read from an LP solution, before rounding.
pub fn solution_setpoints(problem: &LinearProblem, solution: &LpSolution, perimeter: &Perimeter) -> BTreeMap<RangeActionId, f64> {
    perimeter
        .range_actions
        .iter()
        .filter_map(|id| {
            let var = problem.var(VarRole::Setpoint(*id))?;
            Some((*id, *solution.values.get(var.index())?))
        })
        .collect()
}

/// Tap angles read from the integer tap variables of a MIP solution.
pub fn solution_tap_angles(
    catalog: &Catalog,
    problem: &LinearProblem,
    solution: &LpSolution,
    perimeter: &Perimeter,
) -> BTreeMap<RangeActionId, f64> {
    perimeter
        .range_actions
        .iter()
        .filter_map(|id| {
            let var = problem.var(VarRole::Tap(*id))?;
            let tap = solution.values.get(var.index())?.round() as i32;
            Some((*id, catalog.range_action(*id).tap_table()?.angle(tap)?))
        })
        .collect()
}

/// Minimum margin over the functional CNECs, with flows extrapolated from
/// the linearisation point to `setpoints`.
fn linearised_min_margin(
    catalog: &Catalog,
    objective: &ObjectiveFunction,
    sensitivity: &SensitivityResult,
    origin: &BTreeMap<RangeActionId, f64>,
    setpoints: &BTreeMap<RangeActionId, f64>,
) -> f64 {
    let unit = objective.unit();
    let mut worst = f64::INFINITY;
    for &id in objective.functional_cnecs() {
        let cnec = catalog.cnec(id);
        for side in cnec.monitored_sides() {
            let Some(mut flow) = sensitivity.flows.flow(id, cnec, side, unit) else { continue };
            for (action, setpoint) in setpoints {
                let start = origin
                    .get(action)
                    .copied()
                    .unwrap_or(catalog.range_action(*action).initial_setpoint);
                flow += sensitivity.sensitivity(id, cnec, side, *action, unit) * (setpoint - start);
            }
            worst = worst.min(cnec.margin(flow, side, unit));
        }
    }
    worst
}

/// Rounds `proposed` setpoints. `origin` holds the setpoints the
/// sensitivities were computed at; `tap_angles` overrides PST angles when
/// integer taps were optimised directly.
pub fn round_setpoints(
    catalog: &Catalog,
    objective: &ObjectiveFunction,
    sensitivity: &SensitivityResult,
    origin: &BTreeMap<RangeActionId, f64>,
    proposed: &BTreeMap<RangeActionId, f64>,
    tap_angles: &BTreeMap<RangeActionId, f64>,
) -> BTreeMap<RangeActionId, f64> {
    let mut rounded = proposed.clone();
    let mut done = BTreeSet::new();

    // units of rounding: whole groups, then lone actions
    let mut units: Vec<Vec<RangeActionId>> = Vec::new();
    for group in catalog.groups() {
        let members: Vec<RangeActionId> = group.members.iter().copied().filter(|m| proposed.contains_key(m)).collect();
        if !members.is_empty() {
            done.extend(members.iter().copied());
            units.push(members);
        }
    }
    units.extend(proposed.keys().filter(|id| !done.contains(*id)).map(|id| vec![*id]));

    for members in units {
        let leader = members[0];
        let action = catalog.range_action(leader);
        let value = if let Some(angle) = tap_angles.get(&leader) {
            *angle
        } else if let Some(table) = action.tap_table() {
            let target = proposed[&leader];
            let candidates = table.surrounding_angles(target);
            let mut best: Option<(f64, f64)> = None;
            for candidate in candidates {
                let mut trial = rounded.clone();
                for member in &members {
                    trial.insert(*member, candidate);
                }
                let margin = linearised_min_margin(catalog, objective, sensitivity, origin, &trial);
                let better = match best {
                    None => true,
                    Some((best_angle, best_margin)) => {
                        margin > best_margin
                            || (margin == best_margin && (candidate - target).abs() < (best_angle - target).abs())
                    }
                };
                if better {
                    best = Some((candidate, margin));
                }
            }
            best.map_or_else(|| action.round_setpoint(target), |(angle, _)| angle)
        } else {
            action.round_setpoint(proposed[&leader])
        };
        for member in members {
            rounded.insert(member, value);
        }
    }
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::RaoParameters;
    use crate::test_utils::{catalog_from_json, flows};
    use rao_core::Side;

    fn catalog() -> Catalog {
        catalog_from_json(
            r#"{
                "instants": [{"id": "preventive", "kind": "preventive"}],
                "cnecs": [
                    {"id": "a", "network_element": "l1", "instant": "preventive",
                     "thresholds": [{"unit": "megawatt", "min": -100.0, "max": 100.0}]}
                ],
                "range_actions": [
                    {"id": "pst-1", "network_element": "pst-a", "kind": "pst-tap", "group_id": "g",
                     "taps": [{"tap": 0, "angle": 0.0}, {"tap": 1, "angle": 1.5}, {"tap": 2, "angle": 3.0}]},
                    {"id": "pst-2", "network_element": "pst-b", "kind": "pst-tap", "group_id": "g",
                     "taps": [{"tap": 0, "angle": 0.0}, {"tap": 1, "angle": 1.5}, {"tap": 2, "angle": 3.0}]},
                    {"id": "hvdc", "network_element": "dc", "kind": "hvdc",
                     "ranges": [{"min": -500.0, "max": 500.0}]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn group_members_share_best_tap_and_others_round_to_integers() {
        let catalog = catalog();
        let mut perimeter = Perimeter::new(catalog.preventive_state());
        perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
        perimeter.range_actions = catalog.range_actions().map(|(id, _)| id).collect();
        let params = RaoParameters::default();
        let mut sensitivity = flows(&catalog, &[("a", 120.0)]);
        let a = catalog.cnec_id("a").unwrap();
        // each PST pulls 10 MW per degree off the line
        sensitivity.set_sensitivity(a, Side::One, RangeActionId::new(0), -10.0);
        sensitivity.set_sensitivity(a, Side::One, RangeActionId::new(1), -10.0);
        let objective = ObjectiveFunction::build(&catalog, &perimeter, &params, &sensitivity);

        let origin = BTreeMap::new();
        let proposed: BTreeMap<RangeActionId, f64> = [
            (RangeActionId::new(0), 1.1),
            (RangeActionId::new(1), 1.1000000001),
            (RangeActionId::new(2), 42.6),
        ]
        .into();
        let rounded = round_setpoints(&catalog, &objective, &sensitivity, &origin, &proposed, &BTreeMap::new());
        // 1.5 degrees on both: 120 - 30 = 90 MW beats 0 degrees at 120 MW
        assert_eq!(rounded[&RangeActionId::new(0)].to_bits(), rounded[&RangeActionId::new(1)].to_bits());
        assert_eq!(rounded[&RangeActionId::new(0)], 1.5);
        assert_eq!(rounded[&RangeActionId::new(2)], 43.0);
    }

    #[test]
    fn integer_taps_override_rounding() {
        let catalog = catalog();
        let mut perimeter = Perimeter::new(catalog.preventive_state());
        perimeter.cnecs = catalog.cnecs().map(|(id, _)| id).collect();
        let params = RaoParameters::default();
        let sensitivity = flows(&catalog, &[("a", 0.0)]);
        let objective = ObjectiveFunction::build(&catalog, &perimeter, &params, &sensitivity);
        let proposed: BTreeMap<RangeActionId, f64> = [(RangeActionId::new(0), 2.9), (RangeActionId::new(1), 2.9)].into();
        let taps: BTreeMap<RangeActionId, f64> = [(RangeActionId::new(0), 3.0), (RangeActionId::new(1), 3.0)].into();
        let rounded = round_setpoints(&catalog, &objective, &sensitivity, &BTreeMap::new(), &proposed, &taps);
        assert_eq!(rounded[&RangeActionId::new(1)], 3.0);
    }
}
