//! Network actions, range actions and the rules deciding where they apply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CnecId, InstantId, RangeActionId, StateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageMethod {
    /// The optimiser may choose the action.
    Available,
    /// The action is applied unconditionally once its rule matches.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageRule {
    OnInstant {
        instant: InstantId,
        method: UsageMethod,
    },
    OnContingencyState {
        state: StateId,
        method: UsageMethod,
    },
    /// Usable only while the given CNEC is overloaded.
    OnConstraint {
        instant: InstantId,
        cnec: CnecId,
        method: UsageMethod,
    },
}

impl UsageRule {
    pub fn method(&self) -> UsageMethod {
        match self {
            UsageRule::OnInstant { method, .. }
            | UsageRule::OnContingencyState { method, .. }
            | UsageRule::OnConstraint { method, .. } => *method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyAction {
    Open,
    Close,
}

/// One atomic change applied by a network action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElementaryAction {
    Topology { element: String, action: TopologyAction },
    PstSetpoint { element: String, tap: i32 },
    InjectionSetpoint { element: String, setpoint: f64 },
    SwitchPair { open: String, close: String },
}

impl ElementaryAction {
    pub fn elements(&self) -> Vec<&str> {
        match self {
            ElementaryAction::Topology { element, .. }
            | ElementaryAction::PstSetpoint { element, .. }
            | ElementaryAction::InjectionSetpoint { element, .. } => vec![element.as_str()],
            ElementaryAction::SwitchPair { open, close } => vec![open.as_str(), close.as_str()],
        }
    }
}

/// A discrete change of topology or fixed setpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkAction {
    pub id: String,
    pub name: String,
    pub operator: Option<String>,
    pub location: Vec<String>,
    pub elementary_actions: Vec<ElementaryAction>,
    pub usage_rules: Vec<UsageRule>,
}

impl NetworkAction {
    pub fn network_elements(&self) -> Vec<&str> {
        self.elementary_actions
            .iter()
            .flat_map(ElementaryAction::elements)
            .collect()
    }
}

/// Tap position to phase-shift angle (degrees) of a phase shifting transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TapEntry>", into = "Vec<TapEntry>")]
pub struct TapTable {
    taps: BTreeMap<i32, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapEntry {
    pub tap: i32,
    pub angle: f64,
}

impl From<Vec<TapEntry>> for TapTable {
    fn from(entries: Vec<TapEntry>) -> Self {
        TapTable::new(entries.into_iter().map(|e| (e.tap, e.angle)).collect())
    }
}

impl From<TapTable> for Vec<TapEntry> {
    fn from(table: TapTable) -> Self {
        table
            .taps
            .into_iter()
            .map(|(tap, angle)| TapEntry { tap, angle })
            .collect()
    }
}

impl TapTable {
    pub fn new(taps: BTreeMap<i32, f64>) -> Self {
        TapTable { taps }
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn min_tap(&self) -> Option<i32> {
        self.taps.keys().next().copied()
    }

    pub fn max_tap(&self) -> Option<i32> {
        self.taps.keys().next_back().copied()
    }

    pub fn angle(&self, tap: i32) -> Option<f64> {
        self.taps.get(&tap).copied()
    }

    /// Tap whose angle is closest to `angle`; lowest tap on ties.
    pub fn closest_tap(&self, angle: f64) -> Option<i32> {
        self.taps
            .iter()
            .min_by(|a, b| (a.1 - angle).abs().total_cmp(&(b.1 - angle).abs()).then(a.0.cmp(b.0)))
            .map(|(tap, _)| *tap)
    }

    /// Angles of the taps bracketing `angle`, deduplicated when `angle`
    /// coincides with a tap or lies outside the table.
    pub fn surrounding_angles(&self, angle: f64) -> Vec<f64> {
        let below = self.taps.values().copied().filter(|a| *a <= angle).reduce(f64::max);
        let above = self.taps.values().copied().filter(|a| *a >= angle).reduce(f64::min);
        let mut angles: Vec<f64> = [below, above].into_iter().flatten().collect();
        angles.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        angles
    }

    /// Mean angle step per tap around `tap`.
    pub fn step_around(&self, tap: i32) -> f64 {
        let below = self.taps.range(..tap).next_back();
        let above = self.taps.range(tap + 1..).next();
        let current = self.taps.get(&tap).copied().unwrap_or(0.0);
        match (below, above) {
            (Some((t0, a0)), Some((t1, a1))) => (a1 - a0) / f64::from(t1 - t0),
            (Some((t0, a0)), None) => (current - a0) / f64::from(tap - t0),
            (None, Some((t1, a1))) => (a1 - current) / f64::from(t1 - tap),
            (None, None) => 0.0,
        }
    }

    fn angle_bounds(&self) -> (f64, f64) {
        let min = self.taps.values().copied().fold(f64::INFINITY, f64::min);
        let max = self.taps.values().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RangeActionKind {
    PstTap { taps: TapTable },
    Hvdc,
    Injection,
    Standard,
}

impl RangeActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeActionKind::PstTap { .. } => "pst",
            RangeActionKind::Hvdc => "hvdc",
            RangeActionKind::Injection => "injection",
            RangeActionKind::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeType {
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
}

/// Admissible interval. For PSTs the bounds are taps, otherwise setpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "type", default = "default_range_type")]
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

fn default_range_type() -> RangeType {
    RangeType::Absolute
}

/// A continuously adjustable setpoint within admissible ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeAction {
    pub id: String,
    pub name: String,
    pub operator: Option<String>,
    pub location: Vec<String>,
    pub network_element: String,
    pub kind: RangeActionKind,
    pub ranges: Vec<Range>,
    /// Setpoint in the initial network (angle in degrees for PSTs).
    pub initial_setpoint: f64,
    pub group_id: Option<String>,
    pub usage_rules: Vec<UsageRule>,
}

impl RangeAction {
    pub fn is_pst(&self) -> bool {
        matches!(self.kind, RangeActionKind::PstTap { .. })
    }

    pub fn tap_table(&self) -> Option<&TapTable> {
        match &self.kind {
            RangeActionKind::PstTap { taps } => Some(taps),
            _ => None,
        }
    }

    /// Intersection of every range, given the setpoint at the previous instant.
    /// Returns `(min, max)` in setpoint units.
    pub fn admissible_range(&self, previous_setpoint: f64) -> (f64, f64) {
        match self.tap_table() {
            Some(table) => self.admissible_pst_range(table, previous_setpoint),
            None => self.ranges.iter().fold(
                (f64::NEG_INFINITY, f64::INFINITY),
                |(lo, hi), range| {
                    let offset = match range.range_type {
                        RangeType::Absolute => 0.0,
                        RangeType::RelativeToInitialNetwork => self.initial_setpoint,
                        RangeType::RelativeToPreviousInstant => previous_setpoint,
                    };
                    (lo.max(range.min + offset), hi.min(range.max + offset))
                },
            ),
        }
    }

    fn admissible_pst_range(&self, table: &TapTable, previous_setpoint: f64) -> (f64, f64) {
        let initial_tap = table.closest_tap(self.initial_setpoint).unwrap_or(0);
        let previous_tap = table.closest_tap(previous_setpoint).unwrap_or(initial_tap);
        let (mut min_tap, mut max_tap) = match (table.min_tap(), table.max_tap()) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return (self.initial_setpoint, self.initial_setpoint),
        };
        for range in &self.ranges {
            let offset = match range.range_type {
                RangeType::Absolute => 0,
                RangeType::RelativeToInitialNetwork => initial_tap,
                RangeType::RelativeToPreviousInstant => previous_tap,
            };
            min_tap = min_tap.max(range.min.ceil() as i32 + offset);
            max_tap = max_tap.min(range.max.floor() as i32 + offset);
        }
        let angles: Vec<f64> = (min_tap..=max_tap).filter_map(|tap| table.angle(tap)).collect();
        if angles.is_empty() {
            let (lo, hi) = table.angle_bounds();
            return (lo.max(hi.min(previous_setpoint)), lo.max(hi.min(previous_setpoint)));
        }
        let lo = angles.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = angles.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }

    /// Nearest setpoint that can actually be applied: a tap angle for PSTs,
    /// an integer otherwise.
    pub fn round_setpoint(&self, setpoint: f64) -> f64 {
        match self.tap_table() {
            Some(table) => table
                .closest_tap(setpoint)
                .and_then(|tap| table.angle(tap))
                .unwrap_or(setpoint),
            None => setpoint.round(),
        }
    }
}

/// Range actions constrained to share one setpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeActionGroup {
    pub id: String,
    pub members: Vec<RangeActionId>,
}
