use std::collections::{HashMap, HashSet};

use super::{
    Body, Constraint, Curvature, LinearExpr, Program, QuadraticExpr, Relation, Sense, VarId,
    VarKind, Variable,
};
use crate::error::ModelError;

/// Append-only collector of named variables and rows.
///
/// Names are `block.asset.quantity[index]` and must be unique within their
/// namespace (variables and rows are checked separately).
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
    sense: Option<Sense>,
    by_name: HashMap<String, VarId>,
    row_names: HashSet<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(
        &mut self,
        name: impl Into<String>,
        kind: VarKind,
        lower: f64,
        upper: f64,
    ) -> Result<VarId, ModelError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ModelError::DuplicateName(name));
        }
        let (lower, upper) = match kind {
            VarKind::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };
        let id = VarId(self.variables.len());
        self.by_name.insert(name.clone(), id);
        self.variables.push(Variable {
            name,
            kind,
            lower,
            upper,
        });
        Ok(id)
    }

    /// Continuous variable in `[0, +inf)`.
    pub fn nonneg(&mut self, name: impl Into<String>) -> Result<VarId, ModelError> {
        self.var(name, VarKind::Continuous, 0.0, f64::INFINITY)
    }

    pub fn bounded(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> Result<VarId, ModelError> {
        self.var(name, VarKind::Continuous, lower, upper)
    }

    pub fn free(&mut self, name: impl Into<String>) -> Result<VarId, ModelError> {
        self.var(name, VarKind::Continuous, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn binary(&mut self, name: impl Into<String>) -> Result<VarId, ModelError> {
        self.var(name, VarKind::Binary, 0.0, 1.0)
    }

    pub fn integer(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> Result<VarId, ModelError> {
        self.var(name, VarKind::Integer, lower, upper)
    }

    /// Pins a variable to a single value through its bounds.
    pub fn fix(&mut self, var: VarId, value: f64) {
        let v = &mut self.variables[var.0];
        v.lower = value;
        v.upper = value;
    }

    pub fn bounds(&self, var: VarId) -> (f64, f64) {
        let v = &self.variables[var.0];
        (v.lower, v.upper)
    }

    /// Largest value `expr` can take given the current variable bounds.
    pub fn upper_bound(&self, expr: &LinearExpr) -> f64 {
        expr.terms
            .iter()
            .map(|(v, c)| {
                let (lo, hi) = self.bounds(*v);
                if *c == 0.0 {
                    0.0
                } else if *c > 0.0 {
                    c * hi
                } else {
                    c * lo
                }
            })
            .sum::<f64>()
            + expr.constant
    }

    fn push_row(
        &mut self,
        name: String,
        body: Body,
        relation: Relation,
        curvature: Curvature,
    ) -> Result<(), ModelError> {
        if !self.row_names.insert(name.clone()) {
            return Err(ModelError::DuplicateName(name));
        }
        self.constraints.push(Constraint {
            name,
            body,
            relation,
            curvature,
        });
        Ok(())
    }

    /// Registers `lhs (rel) rhs` as the row `lhs - rhs (rel) 0`.
    pub fn constrain(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        relation: Relation,
        rhs: impl Into<LinearExpr>,
    ) -> Result<(), ModelError> {
        let body = lhs.into() - rhs.into();
        self.push_row(name.into(), Body::Linear(body), relation, Curvature::Linear)
    }

    pub fn le(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> Result<(), ModelError> {
        self.constrain(name, lhs, Relation::Le, rhs)
    }

    pub fn ge(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> Result<(), ModelError> {
        self.constrain(name, lhs, Relation::Ge, rhs)
    }

    pub fn eq(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> Result<(), ModelError> {
        self.constrain(name, lhs, Relation::Eq, rhs)
    }

    /// `Σ squares² (rel) u·v`. With `Le` this is a rotated second-order cone;
    /// with `Eq` it is the nonconvex surface of that cone.
    pub fn rotated_cone(
        &mut self,
        name: impl Into<String>,
        squares: Vec<LinearExpr>,
        u: impl Into<LinearExpr>,
        v: impl Into<LinearExpr>,
        relation: Relation,
    ) -> Result<(), ModelError> {
        let mut body = squares
            .into_iter()
            .fold(QuadraticExpr::new(), |q, s| q.square(s));
        body = body.product(-1.0, u, v);
        let curvature = match relation {
            Relation::Le => Curvature::Conic,
            _ => Curvature::Nonconvex,
        };
        self.push_row(name.into(), Body::Quadratic(body), relation, curvature)
    }

    /// General bilinear row `body (rel) 0`; always nonconvex.
    pub fn bilinear(
        &mut self,
        name: impl Into<String>,
        body: QuadraticExpr,
        relation: Relation,
    ) -> Result<(), ModelError> {
        self.push_row(
            name.into(),
            Body::Quadratic(body),
            relation,
            Curvature::Nonconvex,
        )
    }

    pub fn minimize(&mut self, objective: impl Into<LinearExpr>) {
        self.objective = objective.into();
        self.sense = Some(Sense::Minimize);
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn build(self) -> Program {
        Program {
            variables: self.variables,
            constraints: self.constraints,
            objective: self.objective,
            sense: self.sense.unwrap_or(Sense::Minimize),
            by_name: self.by_name,
        }
    }
}

/// `base[index]`.
pub fn indexed(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}
