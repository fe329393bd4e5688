//! Flows and sensitivities produced by a [`SensitivityProvider`](crate::SensitivityProvider).
//!
//! Everything is stored in MW; conversions to other units go through the
//! CNEC's nominal voltage.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::cnec::{Cnec, Side, Unit};
use crate::{CnecId, RangeActionId, StateId};

/// Outcome of a sensitivity computation for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensitivityStatus {
    Success,
    PartialFailure,
    Failure,
}

/// Flows on CNEC sides at one operating point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowResult {
    flows: HashMap<(CnecId, Side), f64>,
    currents: HashMap<(CnecId, Side), f64>,
    ptdf_zonal_sums: HashMap<(CnecId, Side), f64>,
    commercial_flows: HashMap<(CnecId, Side), f64>,
}

impl FlowResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flow(&mut self, cnec: CnecId, side: Side, flow_mw: f64) {
        self.flows.insert((cnec, side), flow_mw);
    }

    pub fn set_current(&mut self, cnec: CnecId, side: Side, current_a: f64) {
        self.currents.insert((cnec, side), current_a);
    }

    pub fn set_ptdf_zonal_sum(&mut self, cnec: CnecId, side: Side, sum: f64) {
        self.ptdf_zonal_sums.insert((cnec, side), sum);
    }

    pub fn set_commercial_flow(&mut self, cnec: CnecId, side: Side, flow_mw: f64) {
        self.commercial_flows.insert((cnec, side), flow_mw);
    }

    pub fn has_flow(&self, cnec: CnecId, side: Side) -> bool {
        self.flows.contains_key(&(cnec, side))
    }

    pub fn flow_mw(&self, cnec: CnecId, side: Side) -> Option<f64> {
        self.flows.get(&(cnec, side)).copied()
    }

    /// Flow of `cnec` on `side` expressed in `unit`. Measured currents take
    /// precedence over converted active flows.
    pub fn flow(&self, id: CnecId, cnec: &Cnec, side: Side, unit: Unit) -> Option<f64> {
        let mw = self.flow_mw(id, side)?;
        match unit {
            Unit::Megawatt => Some(mw),
            Unit::Ampere | Unit::PercentImax => {
                let amperes = match self.currents.get(&(id, side)) {
                    Some(current) => *current,
                    None => cnec.convert(mw, side, Unit::Megawatt, Unit::Ampere)?,
                };
                cnec.convert(amperes, side, Unit::Ampere, unit)
            }
        }
    }

    /// Sum of absolute zonal PTDFs; `None` when the provider did not compute it.
    pub fn ptdf_zonal_sum(&self, cnec: CnecId, side: Side) -> Option<f64> {
        self.ptdf_zonal_sums.get(&(cnec, side)).copied()
    }

    pub fn commercial_flow(&self, cnec: CnecId, side: Side) -> Option<f64> {
        self.commercial_flows.get(&(cnec, side)).copied()
    }

    /// Physical flow minus commercial flow, in MW.
    pub fn loop_flow(&self, cnec: CnecId, side: Side) -> Option<f64> {
        Some(self.flow_mw(cnec, side)? - self.commercial_flow(cnec, side)?)
    }
}

/// Flows plus their first-order sensitivity to range-action setpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensitivityResult {
    pub flows: FlowResult,
    sensitivities: HashMap<(CnecId, Side, RangeActionId), f64>,
    statuses: BTreeMap<StateId, SensitivityStatus>,
}

impl SensitivityResult {
    pub fn new(flows: FlowResult) -> Self {
        SensitivityResult {
            flows,
            sensitivities: HashMap::new(),
            statuses: BTreeMap::new(),
        }
    }

    /// A result where every listed state failed.
    pub fn failed(states: impl IntoIterator<Item = StateId>) -> Self {
        let mut result = SensitivityResult::default();
        for state in states {
            result.set_status(state, SensitivityStatus::Failure);
        }
        result
    }

    pub fn set_sensitivity(&mut self, cnec: CnecId, side: Side, action: RangeActionId, mw_per_unit: f64) {
        self.sensitivities.insert((cnec, side, action), mw_per_unit);
    }

    /// dFlow/dSetpoint in MW per setpoint unit, zero when not computed.
    pub fn sensitivity_mw(&self, cnec: CnecId, side: Side, action: RangeActionId) -> f64 {
        self.sensitivities.get(&(cnec, side, action)).copied().unwrap_or(0.0)
    }

    /// Sensitivity expressed in `unit` per setpoint unit.
    pub fn sensitivity(
        &self,
        id: CnecId,
        cnec: &Cnec,
        side: Side,
        action: RangeActionId,
        unit: Unit,
    ) -> f64 {
        let mw = self.sensitivity_mw(id, side, action);
        cnec.convert(mw, side, Unit::Megawatt, unit).unwrap_or(mw)
    }

    pub fn set_status(&mut self, state: StateId, status: SensitivityStatus) {
        self.statuses.insert(state, status);
    }

    /// Status of a state; states the provider did not report are successful.
    pub fn status(&self, state: StateId) -> SensitivityStatus {
        self.statuses.get(&state).copied().unwrap_or(SensitivityStatus::Success)
    }

    pub fn failed_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == SensitivityStatus::Failure)
            .map(|(state, _)| *state)
    }

    /// Failure when every reported state failed, partial failure when some
    /// did, success otherwise.
    pub fn global_status(&self) -> SensitivityStatus {
        if self.statuses.is_empty() {
            return SensitivityStatus::Success;
        }
        if self.statuses.values().all(|s| *s == SensitivityStatus::Failure) {
            SensitivityStatus::Failure
        } else if self.statuses.values().any(|s| *s != SensitivityStatus::Success) {
            SensitivityStatus::PartialFailure
        } else {
            SensitivityStatus::Success
        }
    }
}
