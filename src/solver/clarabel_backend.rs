//! Interior-point conic backend: `clarabel` over LP and SOCP programs.
//!
//! Rotated cones `Σ a² ≤ u·v` are handed over as standard second-order cones
//! `‖(2a, u − v)‖ ≤ u + v`. Clarabel does not branch, so integer variables
//! are accepted only when their bounds already pin them to one value.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use tracing::debug;

use super::{constant_row_holds, SolveOutcome, SolverBackend, SolverOptions};
use crate::error::SolveError;
use crate::program::{Body, Curvature, LinearExpr, Program, Relation, VarId, VarKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelBackend;

/// `A·x + s = b` with `s` in a product of cones, accumulated column-wise.
struct ConeRows {
    columns: Vec<Vec<(usize, f64)>>,
    rhs: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
}

impl ConeRows {
    fn new(num_vars: usize) -> Self {
        Self {
            columns: vec![Vec::new(); num_vars],
            rhs: Vec::new(),
            cones: Vec::new(),
        }
    }

    /// One row whose slack equals `expr`.
    fn push_slack(&mut self, expr: &LinearExpr) {
        let row = self.rhs.len();
        for (v, c) in expr.terms() {
            if *c != 0.0 {
                self.columns[v.index()].push((row, -c));
            }
        }
        self.rhs.push(expr.constant_part());
    }

    /// `expr = 0`.
    fn zero(&mut self, expr: &LinearExpr) {
        self.push_slack(expr);
        match self.cones.last_mut() {
            Some(SupportedConeT::ZeroConeT(n)) => *n += 1,
            _ => self.cones.push(SupportedConeT::ZeroConeT(1)),
        }
    }

    /// `expr ≥ 0`.
    fn nonneg(&mut self, expr: &LinearExpr) {
        self.push_slack(expr);
        match self.cones.last_mut() {
            Some(SupportedConeT::NonnegativeConeT(n)) => *n += 1,
            _ => self.cones.push(SupportedConeT::NonnegativeConeT(1)),
        }
    }

    /// `Σ squares² ≤ u·v` as `(u + v, 2·squares, u − v) ∈ SOC`.
    fn rotated(&mut self, squares: &[LinearExpr], u: &LinearExpr, v: &LinearExpr) {
        self.push_slack(&(u.clone() + v.clone()));
        for s in squares {
            self.push_slack(&s.clone().scaled(2.0));
        }
        self.push_slack(&(u.clone() - v.clone()));
        self.cones
            .push(SupportedConeT::SecondOrderConeT(squares.len() + 2));
    }

    fn into_parts(self) -> (CscMatrix<f64>, Vec<f64>, Vec<SupportedConeT<f64>>) {
        let num_rows = self.rhs.len();
        let num_vars = self.columns.len();
        let mut col_ptr = Vec::with_capacity(num_vars + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        for mut column in self.columns {
            let start = row_idx.len();
            col_ptr.push(start);
            column.sort_by_key(|(r, _)| *r);
            for (r, v) in column {
                // Repeated variables in one expression land on the same row.
                if row_idx.len() > start && row_idx.last() == Some(&r) {
                    if let Some(acc) = values.last_mut() {
                        *acc += v;
                    }
                    continue;
                }
                row_idx.push(r);
                values.push(v);
            }
        }
        col_ptr.push(row_idx.len());
        (
            CscMatrix::new(num_rows, num_vars, col_ptr, row_idx, values),
            self.rhs,
            self.cones,
        )
    }
}

impl ClarabelBackend {
    fn unsupported(&self, constraint: &str) -> SolveError {
        SolveError::Unsupported {
            backend: self.name().to_string(),
            constraint: constraint.to_string(),
        }
    }
}

impl SolverBackend for ClarabelBackend {
    fn name(&self) -> &'static str {
        "clarabel"
    }

    fn supports_quadratic(&self) -> bool {
        true
    }

    fn solve(&self, program: &Program, options: &SolverOptions) -> Result<SolveOutcome, SolveError> {
        let num_vars = program.num_vars();
        let mut rows = ConeRows::new(num_vars);

        for (i, v) in program.variables().iter().enumerate() {
            let x = LinearExpr::from(VarId(i));
            if v.lower == v.upper {
                rows.zero(&(x - v.lower));
                continue;
            }
            if v.kind != VarKind::Continuous {
                return Err(SolveError::IntegerUnsupported {
                    backend: self.name().to_string(),
                    variable: v.name.clone(),
                });
            }
            if v.lower.is_finite() {
                rows.nonneg(&(x.clone() - v.lower));
            }
            if v.upper.is_finite() {
                rows.nonneg(&(LinearExpr::constant(v.upper) - x));
            }
        }

        let mut cones = 0usize;
        for row in program.constraints() {
            match (&row.body, row.curvature, row.relation) {
                (Body::Linear(body), _, relation) => {
                    if body.is_constant() {
                        if !constant_row_holds(body.constant_part(), relation) {
                            return Ok(SolveOutcome::infeasible(format!(
                                "row '{}' has no variables and cannot hold",
                                row.name
                            )));
                        }
                        continue;
                    }
                    match relation {
                        Relation::Eq => rows.zero(body),
                        Relation::Ge => rows.nonneg(body),
                        Relation::Le => rows.nonneg(&-body.clone()),
                    }
                }
                (Body::Quadratic(q), Curvature::Conic, Relation::Le) => {
                    let (squares, u, v) = q
                        .as_rotated_cone()
                        .ok_or_else(|| self.unsupported(&row.name))?;
                    rows.rotated(&squares, &u, &v);
                    cones += 1;
                }
                _ => return Err(self.unsupported(&row.name)),
            }
        }

        let mut q = vec![0.0; num_vars];
        for (v, c) in program.objective().terms() {
            q[v.index()] += c;
        }
        let p = CscMatrix::new(num_vars, num_vars, vec![0; num_vars + 1], Vec::new(), Vec::new());
        let (a, b, cone_spec) = rows.into_parts();
        debug!(vars = num_vars, rows = b.len(), cones, "clarabel model built");

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .time_limit(options.time_limit.map_or(f64::INFINITY, |d| d.as_secs_f64()))
            .build()
            .map_err(|e| SolveError::Backend(format!("clarabel settings: {e:?}")))?;
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cone_spec, settings)
            .map_err(|e| SolveError::Backend(format!("clarabel setup: {e:?}")))?;
        solver.solve();

        let solution = solver.solution;
        match solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                let values = solution
                    .x
                    .iter()
                    .zip(program.variables())
                    .map(|(x, v)| if v.lower == v.upper { v.lower } else { *x })
                    .collect();
                Ok(SolveOutcome::optimal(program, values))
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => Ok(
                SolveOutcome::infeasible(format!("clarabel reported {:?}", solution.status)),
            ),
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                Ok(SolveOutcome::unbounded())
            }
            SolverStatus::MaxTime => Err(SolveError::Timeout(options.time_limit.unwrap_or_default())),
            other => Err(SolveError::Backend(format!("clarabel stopped with {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramBuilder;
    use crate::solver::SolveStatus;

    fn solve(program: &Program) -> Result<SolveOutcome, SolveError> {
        ClarabelBackend.solve(program, &SolverOptions::default())
    }

    #[test]
    fn linear_program_reaches_its_optimum() {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 1.5).unwrap();
        let y = b.nonneg("y").unwrap();
        b.ge("demand", LinearExpr::from(x) + y, 2.0).unwrap();
        b.minimize(LinearExpr::from(x) + LinearExpr::term(y, 3.0));
        let program = b.build();

        let outcome = solve(&program).unwrap().into_optimal().unwrap();
        assert!((outcome.values[x.index()] - 1.5).abs() < 1e-6);
        assert!((outcome.objective.unwrap() - 3.0).abs() < 1e-6);
        assert!(program.check(&outcome.values, 1e-6).is_empty());
    }

    #[test]
    fn rotated_cone_binds_at_the_optimum() {
        // min u  s.t.  x² ≤ u·v, x = 2, v = 1  ->  u = 4
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 2.0, 2.0).unwrap();
        let u = b.nonneg("u").unwrap();
        let v = b.bounded("v", 1.0, 1.0).unwrap();
        b.rotated_cone("cone", vec![x.into()], u, v, Relation::Le)
            .unwrap();
        b.minimize(u);
        let program = b.build();

        let outcome = solve(&program).unwrap().into_optimal().unwrap();
        assert!((outcome.values[u.index()] - 4.0).abs() < 1e-5);
        assert!(program.check(&outcome.values, 1e-5).is_empty());
    }

    #[test]
    fn only_pinned_integers_are_accepted() {
        let mut b = ProgramBuilder::new();
        let k = b.integer("k", 0.0, 3.0).unwrap();
        let x = b.nonneg("x").unwrap();
        b.ge("floor", LinearExpr::from(x) + k, 1.0).unwrap();
        b.minimize(x);
        b.fix(k, 1.0);
        let outcome = solve(&b.build()).unwrap();
        assert!(outcome.is_optimal());
        assert_eq!(outcome.values[k.index()], 1.0);

        let mut b = ProgramBuilder::new();
        b.binary("switch").unwrap();
        assert_eq!(
            solve(&b.build()).unwrap_err(),
            SolveError::IntegerUnsupported {
                backend: "clarabel".into(),
                variable: "switch".into()
            }
        );
    }

    #[test]
    fn cone_equalities_are_refused() {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 1.0).unwrap();
        let u = b.nonneg("u").unwrap();
        b.rotated_cone("surface", vec![x.into()], u, u, Relation::Eq)
            .unwrap();
        assert!(matches!(
            solve(&b.build()),
            Err(SolveError::Unsupported { constraint, .. }) if constraint == "surface"
        ));
    }

    #[test]
    fn infeasible_rows_are_reported() {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 10.0).unwrap();
        b.ge("low", x, 6.0).unwrap();
        b.le("high", x, 4.0).unwrap();
        b.minimize(x);
        let outcome = solve(&b.build()).unwrap();
        assert!(matches!(outcome.status, SolveStatus::Infeasible(_)));
    }
}
