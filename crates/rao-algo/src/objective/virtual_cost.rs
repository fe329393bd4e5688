//! Penalty terms added on top of the functional cost.

use std::collections::BTreeMap;

use rao_core::{Catalog, CnecId, SensitivityResult, Side, Unit};

use super::margin::cnec_margin;

/// Keeps monitored elements from losing more than an allowed margin.
#[derive(Debug, Clone, PartialEq)]
pub struct MnecCost {
    /// Lowest acceptable margin per element: `min(0, initial - allowance)`.
    pub floors: BTreeMap<CnecId, f64>,
    pub cost: f64,
    pub unit: Unit,
}

/// Penalises loop flows above their threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopFlowCost {
    /// Effective loop-flow limit in MW: `max(threshold, |initial| + allowance)`.
    pub limits: BTreeMap<(CnecId, Side), f64>,
    /// Commercial flows in MW, frozen at the initial situation.
    pub commercial_flows: BTreeMap<(CnecId, Side), f64>,
    pub cost: f64,
}

/// Penalises margin lost on elements of operators that are not optimised.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginDecreaseCost {
    pub initial_margins: BTreeMap<CnecId, f64>,
    pub cost: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VirtualCost {
    Mnec(MnecCost),
    LoopFlow(LoopFlowCost),
    MarginDecrease(MarginDecreaseCost),
    /// Fixed overcost per state whose sensitivity computation failed.
    SensitivityFailure { overcost: f64 },
}

impl VirtualCost {
    pub fn name(&self) -> &'static str {
        match self {
            VirtualCost::Mnec(_) => "mnec-cost",
            VirtualCost::LoopFlow(_) => "loop-flow-cost",
            VirtualCost::MarginDecrease(_) => "margin-decrease-cost",
            VirtualCost::SensitivityFailure { .. } => "sensitivity-failure-cost",
        }
    }

    pub fn evaluate(&self, catalog: &Catalog, result: &SensitivityResult) -> f64 {
        match self {
            VirtualCost::Mnec(mnec) => {
                let violation: f64 = mnec
                    .floors
                    .iter()
                    .filter_map(|(id, floor)| {
                        let margin = cnec_margin(catalog, &result.flows, *id, mnec.unit)?;
                        Some((floor - margin).max(0.0))
                    })
                    .sum();
                violation * mnec.cost
            }
            VirtualCost::LoopFlow(loop_flow) => {
                let excess: f64 = loop_flow
                    .limits
                    .iter()
                    .filter_map(|((id, side), limit)| {
                        let flow = result.flows.flow_mw(*id, *side)?;
                        let commercial = loop_flow.commercial_flows.get(&(*id, *side))?;
                        Some(((flow - commercial).abs() - limit).max(0.0))
                    })
                    .sum();
                excess * loop_flow.cost
            }
            VirtualCost::MarginDecrease(decrease) => {
                let lost: f64 = decrease
                    .initial_margins
                    .iter()
                    .filter_map(|(id, initial)| {
                        let margin = cnec_margin(catalog, &result.flows, *id, decrease.unit)?;
                        Some((initial - margin).max(0.0))
                    })
                    .sum();
                lost * decrease.cost
            }
            VirtualCost::SensitivityFailure { overcost } => {
                result.failed_states().count() as f64 * overcost
            }
        }
    }
}
