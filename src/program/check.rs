//! Evaluation of a full assignment against every row, bound and integrality
//! requirement of a [`Program`].

use serde::Serialize;

use super::{Program, Relation, VarKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    Row,
    Bound,
    Integrality,
    /// `values` does not hold one entry per variable; nothing else is checked.
    Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub name: String,
    pub kind: ViolationKind,
    pub amount: f64,
}

impl Program {
    /// Returns every violation larger than `tol`. `values` is indexed by
    /// [`super::VarId`] and must cover all variables.
    pub fn check(&self, values: &[f64], tol: f64) -> Vec<Violation> {
        if values.len() != self.num_vars() {
            return vec![Violation {
                name: format!("{} values for {} variables", values.len(), self.num_vars()),
                kind: ViolationKind::Assignment,
                amount: values.len().abs_diff(self.num_vars()) as f64,
            }];
        }
        let mut out = Vec::new();

        for (var, &x) in self.variables().iter().zip(values) {
            let below = var.lower - x;
            let above = x - var.upper;
            let amount = below.max(above);
            if amount > tol {
                out.push(Violation {
                    name: var.name.clone(),
                    kind: ViolationKind::Bound,
                    amount,
                });
            }
            if var.kind != VarKind::Continuous {
                let frac = (x - x.round()).abs();
                if frac > tol {
                    out.push(Violation {
                        name: var.name.clone(),
                        kind: ViolationKind::Integrality,
                        amount: frac,
                    });
                }
            }
        }

        for row in self.constraints() {
            let v = row.body.eval(values);
            let amount = match row.relation {
                Relation::Le => v,
                Relation::Ge => -v,
                Relation::Eq => v.abs(),
            };
            if amount > tol {
                out.push(Violation {
                    name: row.name.clone(),
                    kind: ViolationKind::Row,
                    amount,
                });
            }
        }
        out
    }

    /// Violations restricted to rows whose name starts with `prefix`. A
    /// malformed assignment is always reported.
    pub fn check_rows(&self, prefix: &str, values: &[f64], tol: f64) -> Vec<Violation> {
        self.check(values, tol)
            .into_iter()
            .filter(|v| match v.kind {
                ViolationKind::Row => v.name.starts_with(prefix),
                ViolationKind::Assignment => true,
                _ => false,
            })
            .collect()
    }
}
