//! Solver adapter: one submit, one result read-back.
//!
//! Backends implement [`SolverBackend`] over the solver-independent
//! [`Program`]. [`submit`] performs the capability checks, then runs the
//! blocking solve on tokio's blocking pool under an optional time limit.

#[cfg(feature = "conic")]
pub mod clarabel_backend;
#[cfg(feature = "optimization")]
pub mod good_lp_backend;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::SolveError;
use crate::program::{Program, Relation};

#[cfg(feature = "conic")]
pub use clarabel_backend::ClarabelBackend;
#[cfg(feature = "optimization")]
pub use good_lp_backend::MicrolpBackend;

/// Rows without variables are checked locally against this tolerance.
const CONSTANT_ROW_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverOptions {
    /// `None` waits for the backend indefinitely.
    pub time_limit: Option<Duration>,
    /// Accept rows marked nonconvex (exact SOCP coupling, ROI/payback).
    pub allow_nonconvex: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible(String),
    Unbounded,
}

/// Terminal result of a solve. `values` is indexed by
/// [`crate::program::VarId`] and is empty unless the status is optimal.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub values: Vec<f64>,
}

impl SolveOutcome {
    pub fn optimal(program: &Program, values: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective: Some(program.objective_value(&values)),
            values,
        }
    }

    pub fn infeasible(message: impl Into<String>) -> Self {
        Self {
            status: SolveStatus::Infeasible(message.into()),
            objective: None,
            values: Vec::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            status: SolveStatus::Unbounded,
            objective: None,
            values: Vec::new(),
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    /// Turns any non-optimal status into the matching [`SolveError`].
    pub fn into_optimal(self) -> Result<Self, SolveError> {
        match &self.status {
            SolveStatus::Optimal => Ok(self),
            SolveStatus::Infeasible(msg) => Err(SolveError::Infeasible(msg.clone())),
            SolveStatus::Unbounded => Err(SolveError::Unbounded),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether quadratic (conic or bilinear) rows can be passed through.
    fn supports_quadratic(&self) -> bool;

    /// Blocking solve.
    fn solve(&self, program: &Program, options: &SolverOptions) -> Result<SolveOutcome, SolveError>;
}

pub fn backend_by_name(name: &str) -> Result<Arc<dyn SolverBackend>, SolveError> {
    match name.to_ascii_lowercase().as_str() {
        #[cfg(feature = "optimization")]
        "microlp" | "good_lp" => Ok(Arc::new(MicrolpBackend::default())),
        #[cfg(feature = "conic")]
        "clarabel" => Ok(Arc::new(ClarabelBackend)),
        _ => Err(SolveError::UnknownBackend(name.to_string())),
    }
}

/// Whether a row whose body reduced to `value` holds without any variables.
pub(crate) fn constant_row_holds(value: f64, relation: Relation) -> bool {
    match relation {
        Relation::Le => value <= CONSTANT_ROW_TOLERANCE,
        Relation::Ge => value >= -CONSTANT_ROW_TOLERANCE,
        Relation::Eq => value.abs() <= CONSTANT_ROW_TOLERANCE,
    }
}

/// Rejects programs the backend (or the options) cannot accept.
pub fn preflight(
    program: &Program,
    backend: &dyn SolverBackend,
    options: &SolverOptions,
) -> Result<(), SolveError> {
    if let (Some(row), false) = (program.first_nonconvex(), options.allow_nonconvex) {
        return Err(SolveError::NonconvexNotEnabled {
            constraint: row.name.clone(),
        });
    }
    if let (Some(row), false) = (program.first_quadratic(), backend.supports_quadratic()) {
        return Err(SolveError::Unsupported {
            backend: backend.name().to_string(),
            constraint: row.name.clone(),
        });
    }
    Ok(())
}

pub async fn submit(
    program: Arc<Program>,
    backend: Arc<dyn SolverBackend>,
    options: SolverOptions,
) -> Result<SolveOutcome, SolveError> {
    preflight(&program, backend.as_ref(), &options)?;

    let backend_name = backend.name();
    let limit = options.time_limit;
    info!(
        backend = backend_name,
        vars = program.num_vars(),
        rows = program.num_constraints(),
        time_limit = ?limit,
        "submitting program"
    );
    let started = Instant::now();
    let task = tokio::task::spawn_blocking(move || backend.solve(&program, &options));

    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(backend = backend_name, ?limit, "solver timed out");
                return Err(SolveError::Timeout(limit));
            }
        },
        None => task.await,
    };
    let outcome = joined.map_err(|e| SolveError::Backend(format!("solver task failed: {e}")))??;

    info!(
        backend = backend_name,
        status = ?outcome.status,
        objective = ?outcome.objective,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "solve finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ProgramBuilder, QuadraticExpr};

    fn linear_program() -> Program {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 4.0).unwrap();
        b.ge("floor", x, 1.0).unwrap();
        b.minimize(x);
        b.build()
    }

    fn mock(quadratic: bool) -> MockSolverBackend {
        let mut m = MockSolverBackend::new();
        m.expect_name().return_const("mock");
        m.expect_supports_quadratic().return_const(quadratic);
        m
    }

    #[tokio::test]
    async fn timeout_is_a_distinct_outcome() {
        let mut backend = mock(false);
        backend.expect_solve().returning(|p, _| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(SolveOutcome::optimal(p, vec![1.0]))
        });
        let options = SolverOptions {
            time_limit: Some(Duration::from_millis(20)),
            allow_nonconvex: false,
        };
        let err = submit(Arc::new(linear_program()), Arc::new(backend), options)
            .await
            .unwrap_err();
        assert_eq!(err, SolveError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn infeasibility_passes_through_verbatim() {
        let mut backend = mock(false);
        backend
            .expect_solve()
            .times(1)
            .returning(|_, _| Ok(SolveOutcome::infeasible("row 'floor' cannot hold")));
        let outcome = submit(
            Arc::new(linear_program()),
            Arc::new(backend),
            SolverOptions::default(),
        )
        .await
        .unwrap();
        assert!(!outcome.is_optimal());
        assert_eq!(
            outcome.into_optimal().unwrap_err(),
            SolveError::Infeasible("row 'floor' cannot hold".into())
        );
    }

    #[tokio::test]
    async fn nonconvex_rows_need_opt_in() {
        let mut b = ProgramBuilder::new();
        let x = b.bounded("x", 0.0, 1.0).unwrap();
        let y = b.bounded("y", 0.0, 1.0).unwrap();
        b.bilinear("xy", QuadraticExpr::new().product(1.0, x, y).plus(-0.5), Relation::Eq)
            .unwrap();
        let program = Arc::new(b.build());

        let mut backend = mock(true);
        backend.expect_solve().never();
        let err = submit(program.clone(), Arc::new(backend), SolverOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SolveError::NonconvexNotEnabled {
                constraint: "xy".into()
            }
        );

        // Allowed, but the backend cannot take quadratic rows.
        let mut backend = mock(false);
        backend.expect_solve().never();
        let options = SolverOptions {
            allow_nonconvex: true,
            ..SolverOptions::default()
        };
        let err = submit(program, Arc::new(backend), options).await.unwrap_err();
        assert!(matches!(err, SolveError::Unsupported { .. }));
    }

    #[test]
    fn constant_rows_are_judged_by_relation() {
        assert!(constant_row_holds(-1.0, Relation::Le));
        assert!(!constant_row_holds(0.5, Relation::Le));
        assert!(constant_row_holds(1e-12, Relation::Eq));
        assert!(!constant_row_holds(-0.5, Relation::Ge));
    }

    #[cfg(feature = "conic")]
    #[test]
    fn conic_backend_is_selectable() {
        let backend = backend_by_name("Clarabel").unwrap();
        assert_eq!(backend.name(), "clarabel");
        assert!(backend.supports_quadratic());
    }

    #[test]
    fn unknown_backend_is_reported() {
        assert!(matches!(
            backend_by_name("cplex"),
            Err(SolveError::UnknownBackend(name)) if name == "cplex"
        ));
    }
}
