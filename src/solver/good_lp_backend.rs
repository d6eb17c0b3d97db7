//! Pure-Rust MILP backend: `good_lp` driving `microlp`.
//!
//! Only linear rows are accepted. `microlp` has no native time limit; the
//! limit in [`SolverOptions`] is enforced by [`super::submit`].

use good_lp::constraint::{eq, geq, leq};
use good_lp::{
    microlp, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use tracing::debug;

use super::{constant_row_holds, SolveOutcome, SolverBackend, SolverOptions};
use crate::error::SolveError;
use crate::program::{Body, LinearExpr, Program, Relation, VarKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpBackend;

fn expression(expr: &LinearExpr, vars: &[Variable]) -> Expression {
    let mut out = Expression::with_capacity(expr.terms().len());
    out += expr.constant_part();
    for (v, coef) in expr.terms() {
        out += *coef * vars[v.index()];
    }
    out
}

impl SolverBackend for MicrolpBackend {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn supports_quadratic(&self) -> bool {
        false
    }

    fn solve(&self, program: &Program, _options: &SolverOptions) -> Result<SolveOutcome, SolveError> {
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = program
            .variables()
            .iter()
            .map(|v| {
                let mut def = variable().name(v.name.clone());
                if v.lower.is_finite() {
                    def = def.min(v.lower);
                }
                if v.upper.is_finite() {
                    def = def.max(v.upper);
                }
                if v.kind != VarKind::Continuous {
                    def = def.integer();
                }
                problem.add(def)
            })
            .collect();

        let objective = expression(program.objective(), &vars);
        let mut model = problem.minimise(objective).using(microlp);

        let mut skipped = 0usize;
        for row in program.constraints() {
            let Body::Linear(body) = &row.body else {
                return Err(SolveError::Unsupported {
                    backend: self.name().to_string(),
                    constraint: row.name.clone(),
                });
            };
            if body.is_constant() {
                let v = body.constant_part();
                if !constant_row_holds(v, row.relation) {
                    return Ok(SolveOutcome::infeasible(format!(
                        "row '{}' has no variables and cannot hold ({} {} 0)",
                        row.name, v, row.relation
                    )));
                }
                skipped += 1;
                continue;
            }
            let lhs = expression(body, &vars);
            let c = match row.relation {
                Relation::Le => leq(lhs, 0.0),
                Relation::Ge => geq(lhs, 0.0),
                Relation::Eq => eq(lhs, 0.0),
            };
            model = model.with(c);
        }
        debug!(
            vars = vars.len(),
            rows = program.num_constraints() - skipped,
            skipped,
            "microlp model built"
        );

        match model.solve() {
            Ok(solution) => {
                let values = vars.iter().map(|v| solution.value(*v)).collect();
                Ok(SolveOutcome::optimal(program, values))
            }
            Err(ResolutionError::Infeasible) => Ok(SolveOutcome::infeasible(
                "microlp reported the problem infeasible",
            )),
            Err(ResolutionError::Unbounded) => Ok(SolveOutcome::unbounded()),
            Err(e) => Err(SolveError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramBuilder;

    #[test]
    fn small_milp_solves_to_optimum() {
        // max 3x + 2y  s.t. x + y <= 4, x + 3y <= 6, x <= 3, x integer
        let mut b = ProgramBuilder::new();
        let x = b.integer("x", 0.0, 3.0).unwrap();
        let y = b.nonneg("y").unwrap();
        b.le("sum", LinearExpr::from(x) + y, 4.0).unwrap();
        b.le("mix", LinearExpr::from(x) + LinearExpr::term(y, 3.0), 6.0)
            .unwrap();
        b.minimize(LinearExpr::term(x, -3.0) + LinearExpr::term(y, -2.0));
        let program = b.build();

        let outcome = MicrolpBackend
            .solve(&program, &SolverOptions::default())
            .unwrap()
            .into_optimal()
            .unwrap();
        assert!((outcome.values[x.index()] - 3.0).abs() < 1e-6);
        assert!((outcome.values[y.index()] - 1.0).abs() < 1e-6);
        assert!((outcome.objective.unwrap() + 11.0).abs() < 1e-6);
        assert!(program.check(&outcome.values, 1e-6).is_empty());
    }

    #[test]
    fn contradictory_rows_are_infeasible() {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 10.0).unwrap();
        b.ge("low", x, 6.0).unwrap();
        b.le("high", x, 4.0).unwrap();
        b.minimize(x);
        let outcome = MicrolpBackend
            .solve(&b.build(), &SolverOptions::default())
            .unwrap();
        assert!(matches!(outcome.status, super::super::SolveStatus::Infeasible(_)));
    }

    #[test]
    fn constant_rows_are_checked_locally() {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 1.0).unwrap();
        b.le("trivial", LinearExpr::constant(-1.0), 0.0).unwrap();
        b.minimize(x);
        let outcome = MicrolpBackend
            .solve(&b.build(), &SolverOptions::default())
            .unwrap();
        assert!(outcome.is_optimal());

        let mut b = ProgramBuilder::new();
        b.bounded("x", 0.0, 1.0).unwrap();
        b.eq("impossible", LinearExpr::constant(2.0), 1.0).unwrap();
        let outcome = MicrolpBackend
            .solve(&b.build(), &SolverOptions::default())
            .unwrap();
        assert!(matches!(
            outcome.status,
            super::super::SolveStatus::Infeasible(ref m) if m.contains("impossible")
        ));
    }
}
