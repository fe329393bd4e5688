//! # rao-core: Remedial Action Catalog Model
//!
//! Data structures shared by every stage of the remedial action optimiser:
//! the instants and states of a study, the critical network elements under
//! contingency (CNECs) that are monitored in those states, and the network
//! and range actions an operator may use to relieve them.
//!
//! ## Core Data Structures
//!
//! - [`Catalog`] - Immutable arena holding every instant, state, CNEC and action
//! - [`CatalogDefinition`] - Name-based, serde-friendly description validated into a [`Catalog`]
//! - [`Perimeter`] - The slice of the catalog one optimisation works on
//! - [`GridSnapshot`] / [`SensitivityProvider`] - Collaborators the optimiser drives
//! - [`LinearGridSnapshot`] / [`LinearSensitivityProvider`] - Tabulated reference grid
//!
//! ## ID System
//!
//! Every catalog entity is addressed by a newtype wrapper around its arena
//! index. IDs are assigned in definition order, which makes iteration over
//! them deterministic.

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod cnec;
pub mod country_graph;
pub mod error;
pub mod flow;
pub mod instant;
pub mod linear_grid;
pub mod perimeter;
pub mod remedial_action;
pub mod snapshot;

pub use catalog::{Catalog, CatalogDefinition};
pub use cnec::{Cnec, Side, Threshold, Unit};
pub use country_graph::CountryGraph;
pub use error::{RaoError, RaoResult};
pub use flow::{FlowResult, SensitivityResult, SensitivityStatus};
pub use instant::{Contingency, Instant, InstantKind, State};
pub use linear_grid::{LinearGridModel, LinearGridSnapshot, LinearSensitivityProvider};
pub use perimeter::{AppliedRemedialActions, Perimeter};
pub use remedial_action::{
    ElementaryAction, NetworkAction, RangeAction, RangeActionGroup, RangeActionKind, UsageMethod,
    UsageRule,
};
pub use snapshot::{GridSnapshot, SensitivityProvider};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub fn new(value: usize) -> Self {
                $name(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(
    /// Index of an [`Instant`] in the catalog.
    InstantId
);
arena_id!(
    /// Index of a [`Contingency`] in the catalog.
    ContingencyId
);
arena_id!(
    /// Index of a [`State`] (instant, optional contingency) in the catalog.
    StateId
);
arena_id!(
    /// Index of a [`Cnec`] in the catalog.
    CnecId
);
arena_id!(
    /// Index of a [`NetworkAction`] in the catalog.
    NetworkActionId
);
arena_id!(
    /// Index of a [`RangeAction`] in the catalog.
    RangeActionId
);

/// Either kind of remedial action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RemedialActionId {
    Network(NetworkActionId),
    Range(RangeActionId),
}
