//! Solver-independent linear problem.
//!
//! Fillers write variables and constraints here; the backend translates the
//! finished problem into a `good_lp` model. Keeping our own representation
//! lets the problem be inspected in tests and handed to any backend.

use std::collections::HashMap;

use rao_core::{CnecId, RangeActionId, Side};

/// Index of a variable in a [`LinearProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LpVariable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub integer: bool,
}

/// `lower <= sum(coef * var) <= upper`
#[derive(Debug, Clone, PartialEq)]
pub struct LpConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub lower: f64,
    pub upper: f64,
}

/// Roles a variable can play, used to find variables again after solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarRole {
    Flow(CnecId, Side),
    Setpoint(RangeActionId),
    AbsoluteVariation(RangeActionId),
    Tap(RangeActionId),
    MinMargin,
    MnecViolation(CnecId),
    LoopFlowViolation(CnecId, Side),
    MarginDecrease(CnecId),
}

/// A maximisation problem over continuous and integer variables.
#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    variables: Vec<LpVariable>,
    constraints: Vec<LpConstraint>,
    objective: Vec<(VarId, f64)>,
    roles: HashMap<VarRole, VarId>,
}

impl LinearProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, role: VarRole, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(LpVariable {
            name: name.into(),
            lower,
            upper,
            integer: false,
        });
        self.roles.insert(role, id);
        id
    }

    pub fn add_integer_variable(&mut self, role: VarRole, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        let id = self.add_variable(role, name, lower, upper);
        self.variables[id.0].integer = true;
        id
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, terms: Vec<(VarId, f64)>, lower: f64, upper: f64) {
        self.constraints.push(LpConstraint {
            name: name.into(),
            terms,
            lower,
            upper,
        });
    }

    /// Adds `coefficient * var` to the maximised objective.
    pub fn add_objective_term(&mut self, var: VarId, coefficient: f64) {
        self.objective.push((var, coefficient));
    }

    pub fn tighten_bounds(&mut self, var: VarId, lower: f64, upper: f64) {
        let v = &mut self.variables[var.0];
        v.lower = v.lower.max(lower);
        v.upper = v.upper.min(upper);
    }

    pub fn var(&self, role: VarRole) -> Option<VarId> {
        self.roles.get(&role).copied()
    }

    pub fn variable(&self, var: VarId) -> &LpVariable {
        &self.variables[var.0]
    }

    pub fn variables(&self) -> &[LpVariable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LpConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[(VarId, f64)] {
        &self.objective
    }

    pub fn has_integers(&self) -> bool {
        self.variables.iter().any(|v| v.integer)
    }
}
