//! Instants, contingencies and the states they combine into.

use serde::{Deserialize, Serialize};

use crate::{ContingencyId, InstantId};

/// Kind of an instant. The derived ordering is the chronological one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstantKind {
    Preventive,
    Outage,
    Auto,
    Curative,
}

impl InstantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstantKind::Preventive => "preventive",
            InstantKind::Outage => "outage",
            InstantKind::Auto => "auto",
            InstantKind::Curative => "curative",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instant {
    pub id: String,
    pub kind: InstantKind,
    /// Position in the chronological sequence (0 = preventive).
    pub order: usize,
}

impl Instant {
    pub fn is_preventive(&self) -> bool {
        self.kind == InstantKind::Preventive
    }

    pub fn is_outage(&self) -> bool {
        self.kind == InstantKind::Outage
    }

    pub fn is_auto(&self) -> bool {
        self.kind == InstantKind::Auto
    }

    pub fn is_curative(&self) -> bool {
        self.kind == InstantKind::Curative
    }

    pub fn comes_before(&self, other: &Instant) -> bool {
        self.order < other.order
    }
}

/// A set of network elements tripped together.
#[derive(Debug, Clone, PartialEq)]
pub struct Contingency {
    pub id: String,
    pub name: Option<String>,
    pub elements: Vec<String>,
}

/// An (instant, contingency) pair. The preventive state is the only one
/// without a contingency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    pub instant: InstantId,
    pub contingency: Option<ContingencyId>,
}

impl State {
    pub fn is_preventive(&self) -> bool {
        self.contingency.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_kinds_are_chronological() {
        assert!(InstantKind::Preventive < InstantKind::Outage);
        assert!(InstantKind::Outage < InstantKind::Auto);
        assert!(InstantKind::Auto < InstantKind::Curative);
    }

    #[test]
    fn comes_before_uses_order() {
        let prev = Instant { id: "preventive".into(), kind: InstantKind::Preventive, order: 0 };
        let cur = Instant { id: "curative".into(), kind: InstantKind::Curative, order: 3 };
        assert!(prev.comes_before(&cur));
        assert!(!cur.comes_before(&prev));
        assert!(cur.is_curative());
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&InstantKind::Curative).unwrap();
        assert_eq!(json, "\"curative\"");
    }
}
