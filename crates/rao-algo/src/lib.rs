//! # rao-algo: Remedial Action Optimisation Algorithms
//!
//! This crate finds the combination of remedial actions that maximises the
//! smallest margin of the monitored network elements, preventively and
//! after each contingency.
//!
//! ## Pipeline
//!
//! | Stage | Module | Role |
//! |-------|--------|------|
//! | Cost | [`objective`] | Functional cost (minus the worst margin) plus virtual costs |
//! | Range actions | [`linear`] | Iterated LP/MIP over linearised flows, with rounding |
//! | Network actions | [`search_tree`] | Depth-by-depth search over action combinations |
//! | Sequencing | [`castor`] | Preventive, auto and curative perimeters, second preventive pass |
//!
//! ### Architecture
//!
//! The optimiser never reads a grid itself. It drives two collaborators
//! defined in `rao-core`:
//!
//! - **[`rao_core::GridSnapshot`]**: applies actions, forks and restores cheaply
//! - **[`rao_core::SensitivityProvider`]**: computes flows and sensitivities
//!
//! The LP is written as a solver-independent [`linear::LinearProblem`] by
//! composable [`linear::ProblemFiller`]s and solved through `good_lp`.
//!
//! ## Example
//!
//! ```ignore
//! use rao_algo::{run_rao, RaoParameters};
//! use rao_core::{CatalogDefinition, LinearGridModel};
//!
//! let catalog = definition.build()?;
//! let (snapshot, provider) = grid.build(&catalog)?;
//! let result = run_rao(&catalog, &RaoParameters::default(), &snapshot, &provider)?;
//! println!("cost: {:.2}", result.cost());
//! ```

pub mod budget;
pub mod castor;
pub mod linear;
pub mod objective;
pub mod parameters;
pub mod result;
pub mod search_tree;
pub mod test_utils;

pub use budget::Budget;
pub use castor::{run_rao, Castor, StateTree};
pub use linear::{IteratingLinearOptimizer, LinearOptimizationResult, LinearProblemStatus, LpBackendKind};
pub use objective::{ObjectiveFunction, ObjectiveFunctionResult};
pub use parameters::{
    BudgetParameters, ObjectiveType, ParametersFormat, PstModel, RaoParameters, SecondPreventiveCondition,
    StopCriterion,
};
pub use result::{ComputationStatus, GlobalResult, PerimeterReport, PerimeterResult, RaoReport};
pub use search_tree::{Leaf, LeafStatus, SearchTree, SearchTreeResult};
