//! Collaborator traits driven by the optimiser.
//!
//! The optimiser never inspects a grid directly: it applies actions to a
//! [`GridSnapshot`] and asks a [`SensitivityProvider`] for flows and
//! sensitivities. Any power-flow engine can sit behind these two traits.

use crate::catalog::Catalog;
use crate::flow::SensitivityResult;
use crate::perimeter::Perimeter;
use crate::remedial_action::{NetworkAction, RangeAction};
use crate::RaoResult;

/// A mutable view of the grid. Cloning forks an independent copy that
/// parallel search-tree workers can modify without interfering.
pub trait GridSnapshot: Clone + Send + Sync {
    /// Saved state that [`restore`](GridSnapshot::restore) rolls back to.
    type Checkpoint: Clone + Send + Sync;

    /// Applies a network action. Returns `false` when it changed nothing,
    /// e.g. opening an already open line.
    fn apply_network_action(&mut self, action: &NetworkAction) -> bool;

    fn apply_range_action(&mut self, action: &RangeAction, setpoint: f64);

    /// Current setpoint of the element driven by `action`.
    fn range_action_setpoint(&self, action: &RangeAction) -> f64;

    fn checkpoint(&self) -> Self::Checkpoint;

    fn restore(&mut self, checkpoint: &Self::Checkpoint);

    /// Hash of the electrical state. Equal signatures mean equivalent grids,
    /// which lets the search tree skip redundant combinations.
    fn state_signature(&self) -> u64;
}

/// Computes flows and sensitivities for every CNEC of a perimeter.
pub trait SensitivityProvider<S: GridSnapshot>: Send + Sync {
    /// Unique identifier (e.g., "linear")
    fn id(&self) -> &str;

    /// Computes the perimeter's flows and their sensitivity to every range
    /// action of the perimeter. A state that cannot be computed is reported
    /// through its [`SensitivityStatus`](crate::SensitivityStatus); `Err` is
    /// reserved for failures of the whole computation.
    fn compute(&self, snapshot: &S, perimeter: &Perimeter, catalog: &Catalog) -> RaoResult<SensitivityResult>;
}
