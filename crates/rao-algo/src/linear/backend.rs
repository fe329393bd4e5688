//! LP/MIP backends.
//!
//! A [`LinearProblem`] is translated into a `good_lp` model for the
//! selected backend. Clarabel is always compiled in and solves continuous
//! problems; HiGHS (feature `solver-highs`) also handles integer variables.

use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "solver-clarabel")]
use good_lp::solvers::clarabel::clarabel as clarabel_solver;
#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as highs_solver;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use rao_core::{RaoError, RaoResult};
use serde::{Deserialize, Serialize};
use web_time::Instant;

use super::problem::LinearProblem;

/// Outcome of one LP solve or of a whole iterating optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinearProblemStatus {
    Optimal,
    /// A usable but not proven optimal solution.
    Feasible,
    Infeasible,
    Unbounded,
    TimeLimit,
    Error,
    MaxIterationReached,
    SensitivityComputationFailed,
    BudgetExhausted,
}

impl LinearProblemStatus {
    /// Whether the solver produced setpoints that can be used.
    pub fn has_solution(&self) -> bool {
        matches!(self, LinearProblemStatus::Optimal | LinearProblemStatus::Feasible)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpBackendKind {
    #[default]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

const AVAILABLE_LP_BACKENDS: &[&str] = &[
    #[cfg(feature = "solver-clarabel")]
    "clarabel",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_backend_error(label: &str) -> RaoError {
    RaoError::Configuration(format!(
        "unknown lp solver '{}'; supported values: {}",
        label,
        LpBackendKind::available().join(", ")
    ))
}

impl LpBackendKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_LP_BACKENDS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LpBackendKind::Clarabel => "clarabel",
            #[cfg(feature = "solver-highs")]
            LpBackendKind::Highs => "highs",
        }
    }

    pub fn is_available(&self) -> bool {
        Self::available().contains(&self.as_str())
    }

    pub fn supports_integers(&self) -> bool {
        match self {
            LpBackendKind::Clarabel => false,
            #[cfg(feature = "solver-highs")]
            LpBackendKind::Highs => true,
        }
    }
}

impl FromStr for LpBackendKind {
    type Err = RaoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "clarabel" if cfg!(feature = "solver-clarabel") => Ok(LpBackendKind::Clarabel),
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(LpBackendKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            other => Err(unknown_backend_error(other)),
        }
    }
}

/// Variable values (indexed like the problem's variables) and solve status.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub status: LinearProblemStatus,
    pub values: Vec<f64>,
}

impl LpSolution {
    fn failed(status: LinearProblemStatus) -> Self {
        LpSolution {
            status,
            values: Vec::new(),
        }
    }
}

fn status_from_error(err: &ResolutionError, timed_out: bool) -> LinearProblemStatus {
    match err {
        ResolutionError::Infeasible => LinearProblemStatus::Infeasible,
        ResolutionError::Unbounded => LinearProblemStatus::Unbounded,
        _ if timed_out => LinearProblemStatus::TimeLimit,
        _ => LinearProblemStatus::Error,
    }
}

fn add_constraints<M>(mut model: M, problem: &LinearProblem, handles: &[Variable]) -> M
where
    M: SolverModel,
{
    for c in problem.constraints() {
        let expr = c
            .terms
            .iter()
            .fold(Expression::from(0.0), |acc, (var, coef)| acc + *coef * handles[var.index()]);
        if c.lower == c.upper {
            model = model.with(constraint!(expr == c.lower));
            continue;
        }
        if c.lower.is_finite() {
            model = model.with(constraint!(expr.clone() >= c.lower));
        }
        if c.upper.is_finite() {
            model = model.with(constraint!(expr <= c.upper));
        }
    }
    model
}

fn extract_values<S: Solution>(solution: &S, handles: &[Variable]) -> Vec<f64> {
    handles.iter().map(|var| solution.value(*var)).collect()
}

/// Solves `problem` (a maximisation) with `backend`.
///
/// Backend failures are reported through the returned status; `Err` only
/// signals a configuration problem such as integers on a continuous solver.
pub fn solve(problem: &LinearProblem, backend: LpBackendKind, time_limit: Duration) -> RaoResult<LpSolution> {
    if !backend.is_available() {
        return Err(unknown_backend_error(backend.as_str()));
    }
    if problem.has_integers() && !backend.supports_integers() {
        return Err(RaoError::Configuration(format!(
            "lp solver '{}' cannot handle integer variables",
            backend.as_str()
        )));
    }

    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = problem
        .variables()
        .iter()
        .map(|v| {
            let mut def = variable();
            if v.lower.is_finite() {
                def = def.min(v.lower);
            }
            if v.upper.is_finite() {
                def = def.max(v.upper);
            }
            if v.integer {
                def = def.integer();
            }
            vars.add(def)
        })
        .collect();
    let objective = problem
        .objective()
        .iter()
        .fold(Expression::from(0.0), |acc, (var, coef)| acc + *coef * handles[var.index()]);

    let started = Instant::now();
    let unsolved = vars.maximise(objective);
    let outcome = match backend {
        LpBackendKind::Clarabel => {
            #[cfg(feature = "solver-clarabel")]
            {
                let model = add_constraints(unsolved.using(clarabel_solver), problem, &handles);
                model.solve().map(|s| extract_values(&s, &handles))
            }
            #[cfg(not(feature = "solver-clarabel"))]
            {
                drop(unsolved);
                return Err(unknown_backend_error("clarabel"));
            }
        }
        #[cfg(feature = "solver-highs")]
        LpBackendKind::Highs => {
            let model = unsolved
                .using(highs_solver)
                .set_time_limit(time_limit.as_secs_f64());
            let model = add_constraints(model, problem, &handles);
            model.solve().map(|s| extract_values(&s, &handles))
        }
    };
    let timed_out = started.elapsed() >= time_limit;

    Ok(match outcome {
        Ok(values) => LpSolution {
            status: if timed_out {
                LinearProblemStatus::Feasible
            } else {
                LinearProblemStatus::Optimal
            },
            values,
        },
        Err(err) => {
            tracing::debug!(error = %err, solver = backend.as_str(), "linear problem not solved");
            LpSolution::failed(status_from_error(&err, timed_out))
        }
    })
}
