//! Linear and quadratic expressions over program variables.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Index of a variable inside a [`super::Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// `Σ coef·x + constant`. Repeated variables are allowed and summed on evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub(crate) terms: Vec<(VarId, f64)>,
    pub(crate) constant: f64,
}

impl LinearExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    /// True when the expression has no variable terms.
    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(_, c)| *c == 0.0)
    }

    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values[v.0])
            .sum::<f64>()
            + self.constant
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        for (_, c) in &mut self.terms {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        LinearExpr::term(var, 1.0)
    }
}

impl From<f64> for LinearExpr {
    fn from(value: f64) -> Self {
        LinearExpr::constant(value)
    }
}

impl<T: Into<LinearExpr>> AddAssign<T> for LinearExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinearExpr>> SubAssign<T> for LinearExpr {
    fn sub_assign(&mut self, rhs: T) {
        *self += rhs.into().scaled(-1.0);
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> LinearExpr {
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(mut self, rhs: T) -> LinearExpr {
        self -= rhs;
        self
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(self, rhs: f64) -> LinearExpr {
        self.scaled(rhs)
    }
}

impl Mul<LinearExpr> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: LinearExpr) -> LinearExpr {
        rhs.scaled(self)
    }
}

impl Mul<VarId> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: VarId) -> LinearExpr {
        LinearExpr::term(rhs, self)
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        self.scaled(-1.0)
    }
}

impl<T: Into<LinearExpr>> std::iter::Sum<T> for LinearExpr {
    fn sum<I: Iterator<Item = T>>(iter: I) -> Self {
        iter.fold(LinearExpr::zero(), |acc, e| acc + e)
    }
}

/// `Σ coef·(a·x)(b·x) + linear`.
///
/// Products of affine expressions are kept unexpanded so a conic backend can
/// recognise `‖(p, q)‖² ≤ u·v` shapes directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuadraticExpr {
    pub(crate) products: Vec<(f64, LinearExpr, LinearExpr)>,
    pub(crate) linear: LinearExpr,
}

impl QuadraticExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(mut self, coef: f64, a: impl Into<LinearExpr>, b: impl Into<LinearExpr>) -> Self {
        self.products.push((coef, a.into(), b.into()));
        self
    }

    pub fn square(self, a: impl Into<LinearExpr>) -> Self {
        let a = a.into();
        self.product(1.0, a.clone(), a)
    }

    pub fn plus(mut self, linear: impl Into<LinearExpr>) -> Self {
        self.linear += linear;
        self
    }

    pub fn products(&self) -> &[(f64, LinearExpr, LinearExpr)] {
        &self.products
    }

    pub fn linear(&self) -> &LinearExpr {
        &self.linear
    }

    /// Splits `Σ c·a² − k·u·v` (every `c, k > 0`, no linear part) into the
    /// cone operands `(√c·a, u, k·v)`, so that the row reads
    /// `Σ squares² ≤ u·v` once `≤ 0` is applied.
    pub fn as_rotated_cone(&self) -> Option<(Vec<LinearExpr>, LinearExpr, LinearExpr)> {
        if !self.linear.is_constant() || self.linear.constant != 0.0 {
            return None;
        }
        let mut squares = Vec::with_capacity(self.products.len());
        let mut hyperbolic = None;
        for (c, a, b) in &self.products {
            if *c > 0.0 && a == b {
                squares.push(a.clone().scaled(c.sqrt()));
            } else if *c < 0.0 && hyperbolic.is_none() {
                hyperbolic = Some((a.clone(), b.clone().scaled(-c)));
            } else {
                return None;
            }
        }
        let (u, v) = hyperbolic?;
        Some((squares, u, v))
    }

    pub fn eval(&self, values: &[f64]) -> f64 {
        self.products
            .iter()
            .map(|(c, a, b)| c * a.eval(values) * b.eval(values))
            .sum::<f64>()
            + self.linear.eval(values)
    }
}
