//! Critical network elements under contingency and their thresholds.
//!
//! Flows are handled in MW internally. Thresholds may be expressed in MW,
//! amperes or percent of the element's maximum admissible current, and are
//! converted on demand with `P = I * U * sqrt(3) / 1000`.

use serde::{Deserialize, Serialize};

use crate::StateId;

/// Side of a branch a threshold or a flow refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::One, Side::Two];

    #[inline]
    pub fn index(&self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unit {
    Megawatt,
    Ampere,
    PercentImax,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Megawatt => "MW",
            Unit::Ampere => "A",
            Unit::PercentImax => "%Imax",
        }
    }
}

/// A one- or two-sided limit on the flow of one side of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default = "default_side")]
    pub side: Side,
    pub unit: Unit,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

fn default_side() -> Side {
    Side::One
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cnec {
    pub id: String,
    pub name: String,
    pub network_element: String,
    pub state: StateId,
    pub thresholds: Vec<Threshold>,
    /// Takes part in the min-margin objective.
    pub optimized: bool,
    /// Must not deteriorate beyond the MNEC allowance.
    pub monitored: bool,
    /// Subtracted from every threshold, in MW.
    pub reliability_margin: f64,
    /// Nominal voltage per side, in kV.
    pub nominal_voltage_kv: [f64; 2],
    /// Maximum admissible current per side, in A.
    pub imax_a: [Option<f64>; 2],
    pub operator: Option<String>,
    /// Countries the element is located in.
    pub location: Vec<String>,
    /// Loop-flow threshold in MW, when the element is loop-flow constrained.
    pub loop_flow_threshold_mw: Option<f64>,
}

impl Cnec {
    /// Sides carrying at least one threshold, in side order.
    pub fn monitored_sides(&self) -> Vec<Side> {
        Side::ALL
            .into_iter()
            .filter(|side| self.thresholds.iter().any(|t| t.side == *side))
            .collect()
    }

    /// Converts a value on `side` between units. Returns `None` when a
    /// percent conversion is requested and the side has no Imax.
    pub fn convert(&self, value: f64, side: Side, from: Unit, to: Unit) -> Option<f64> {
        if from == to {
            return Some(value);
        }
        let voltage = self.nominal_voltage_kv[side.index()];
        let amperes = match from {
            Unit::Ampere => value,
            Unit::Megawatt => value * 1000.0 / (voltage * 3f64.sqrt()),
            Unit::PercentImax => value / 100.0 * self.imax_a[side.index()]?,
        };
        match to {
            Unit::Ampere => Some(amperes),
            Unit::Megawatt => Some(amperes * voltage * 3f64.sqrt() / 1000.0),
            Unit::PercentImax => self.imax_a[side.index()].map(|imax| amperes * 100.0 / imax),
        }
    }

    fn reliability_margin_in(&self, side: Side, unit: Unit) -> f64 {
        self.convert(self.reliability_margin, side, Unit::Megawatt, unit)
            .unwrap_or(0.0)
    }

    /// Tightest upper limit on `side`, reliability margin deducted.
    pub fn upper_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        let bound = self
            .thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| t.max.and_then(|max| self.convert(max, side, t.unit, unit)))
            .reduce(f64::min)?;
        Some(bound - self.reliability_margin_in(side, unit))
    }

    /// Tightest lower limit on `side`, reliability margin deducted.
    pub fn lower_bound(&self, side: Side, unit: Unit) -> Option<f64> {
        let bound = self
            .thresholds
            .iter()
            .filter(|t| t.side == side)
            .filter_map(|t| t.min.and_then(|min| self.convert(min, side, t.unit, unit)))
            .reduce(f64::max)?;
        Some(bound + self.reliability_margin_in(side, unit))
    }

    /// Distance from `flow` (in `unit`) to the nearest bound of `side`.
    /// Negative when a bound is violated, infinite when the side is unbounded.
    pub fn margin(&self, flow: f64, side: Side, unit: Unit) -> f64 {
        let upper = self.upper_bound(side, unit).map_or(f64::INFINITY, |ub| ub - flow);
        let lower = self.lower_bound(side, unit).map_or(f64::INFINITY, |lb| flow - lb);
        upper.min(lower)
    }

    /// Largest absolute bound over all sides, used as a fallback cost when no
    /// element limits the objective.
    pub fn highest_threshold(&self, unit: Unit) -> f64 {
        self.monitored_sides()
            .into_iter()
            .flat_map(|side| [self.upper_bound(side, unit), self.lower_bound(side, unit)])
            .flatten()
            .map(f64::abs)
            .fold(0.0, f64::max)
    }

    /// Monitored sides paired with their `(lower, upper)` bounds in `unit`.
    pub fn bounds(&self, unit: Unit) -> Vec<(Side, Option<f64>, Option<f64>)> {
        self.monitored_sides()
            .into_iter()
            .map(|side| (side, self.lower_bound(side, unit), self.upper_bound(side, unit)))
            .collect()
    }

    pub fn has_operator(&self, operator: &str) -> bool {
        self.operator.as_deref() == Some(operator)
    }
}
