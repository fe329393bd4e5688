//! Linear optimisation of range actions.
//!
//! [`fillers`] write a solver-independent [`LinearProblem`], [`backend`]
//! solves it through `good_lp`, [`rounding`] turns the solution into
//! applicable setpoints and [`iterating`] re-linearises until convergence.

pub mod backend;
pub mod fillers;
pub mod iterating;
pub mod problem;
pub mod rounding;

pub use backend::{solve, LinearProblemStatus, LpBackendKind, LpSolution};
pub use fillers::{build_problem, fillers_for, FillContext, ProblemFiller};
pub use iterating::{IteratingLinearOptimizer, LinearOptimizationResult};
pub use problem::{LinearProblem, VarId, VarRole};
