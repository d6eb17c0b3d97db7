//! Solver-independent representation of the assembled optimisation program.
//!
//! Blocks never talk to a solver directly. They register named variables and
//! named rows through a [`ProgramBuilder`]; the finished [`Program`] is then
//! handed to whichever backend the configuration selects.

pub mod builder;
pub mod check;
pub mod expr;

pub use builder::ProgramBuilder;
pub use check::{Violation, ViolationKind};
pub use expr::{LinearExpr, QuadraticExpr, VarId};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Relation {
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
}

/// Row body, always compared against zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Linear(LinearExpr),
    Quadratic(QuadraticExpr),
}

impl Body {
    pub fn eval(&self, values: &[f64]) -> f64 {
        match self {
            Body::Linear(e) => e.eval(values),
            Body::Quadratic(q) => q.eval(values),
        }
    }
}

/// Shape of a quadratic row, used to decide which backends may take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curvature {
    Linear,
    /// `Σ squares ≤ u·v` with `u, v ≥ 0`: a rotated second-order cone.
    Conic,
    /// Quadratic equalities and general bilinear rows.
    Nonconvex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub body: Body,
    pub relation: Relation,
    pub curvature: Curvature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone)]
pub struct Program {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
    sense: Sense,
    by_name: HashMap<String, VarId>,
}

impl Program {
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn has_integers(&self) -> bool {
        self.variables.iter().any(|v| v.kind != VarKind::Continuous)
    }

    /// First row that is neither linear nor a convex cone, if any.
    pub fn first_nonconvex(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| c.curvature == Curvature::Nonconvex)
    }

    pub fn first_quadratic(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| matches!(c.body, Body::Quadratic(_)))
    }

    /// Objective value at a full assignment.
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.eval(values)
    }

    /// Number of variables and rows whose name starts with `prefix`.
    pub fn block_size(&self, prefix: &str) -> (usize, usize) {
        let vars = self
            .variables
            .iter()
            .filter(|v| v.name.starts_with(prefix))
            .count();
        let rows = self
            .constraints
            .iter()
            .filter(|c| c.name.starts_with(prefix))
            .count();
        (vars, rows)
    }
}
