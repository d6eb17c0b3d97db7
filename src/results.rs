//! Solution report handed to the reporting layer: flat values keyed by
//! variable name, headline KPIs and the post-solve audit.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::blocks::economic::INVESTMENT_THRESHOLD;
use crate::domain::SystemParams;
use crate::model::ModelLayout;
use crate::program::{Program, Violation};
use crate::solver::{SolveOutcome, SolveStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_investment: f64,
    pub annual_cost: f64,
    /// Ex-post ROI in %, `None` without investment.
    pub roi_percent: Option<f64>,
    /// Years to recover the investment, `None` when nothing is saved.
    pub payback_years: Option<f64>,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub unserved_kwh: f64,
    pub pv_added_kw: BTreeMap<String, f64>,
    pub battery_added_units: BTreeMap<String, f64>,
}

impl Kpis {
    pub fn from_values(layout: &ModelLayout, system: &SystemParams, x: &[f64]) -> Self {
        let at = |v: crate::program::VarId| x[v.index()];
        let dt = layout.step_hours;
        let investment = at(layout.economics.investment);
        let annual = at(layout.economics.annual);
        let saving = system.annual_cost_reference.unwrap_or(0.0) - annual;

        let (import, export) = layout
            .grid
            .as_ref()
            .map(|g| {
                let import: f64 = (0..layout.horizon).map(|t| g.import(t).eval(x)).sum();
                let export: f64 = g.sell.iter().map(|v| at(*v)).sum();
                (import * dt, export * dt)
            })
            .unwrap_or((0.0, 0.0));

        Self {
            total_investment: investment,
            annual_cost: annual,
            roi_percent: (investment >= INVESTMENT_THRESHOLD)
                .then(|| saving / investment * 100.0),
            payback_years: (saving > 0.0).then(|| investment / saving),
            grid_import_kwh: import,
            grid_export_kwh: export,
            unserved_kwh: layout.unserved.iter().flatten().map(|v| at(*v)).sum::<f64>() * dt,
            pv_added_kw: layout
                .pv
                .iter()
                .map(|p| (p.id.clone(), at(p.added_kw)))
                .collect(),
            battery_added_units: layout
                .batteries
                .iter()
                .map(|b| (b.id.clone(), at(b.added_units).round()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionReport {
    pub status: SolveStatus,
    pub formulation: String,
    pub objective: Option<f64>,
    pub kpis: Option<Kpis>,
    pub values: BTreeMap<String, f64>,
    /// Rows and bounds the returned point breaks by more than the tolerance.
    pub violations: Vec<Violation>,
}

impl SolutionReport {
    pub fn new(
        program: &Program,
        layout: &ModelLayout,
        system: &SystemParams,
        outcome: &SolveOutcome,
        tolerance: f64,
    ) -> Self {
        if !outcome.is_optimal() {
            return Self {
                status: outcome.status.clone(),
                formulation: layout.formulation.to_string(),
                objective: None,
                kpis: None,
                values: BTreeMap::new(),
                violations: Vec::new(),
            };
        }

        let values = program
            .variables()
            .iter()
            .zip(&outcome.values)
            .map(|(v, x)| (v.name.clone(), *x))
            .collect();
        let violations = program.check(&outcome.values, tolerance);
        if !violations.is_empty() {
            warn!(
                count = violations.len(),
                first = %violations[0].name,
                "solution breaks the program beyond tolerance"
            );
        }

        Self {
            status: outcome.status.clone(),
            formulation: layout.formulation.to_string(),
            objective: outcome.objective,
            kpis: Some(Kpis::from_values(layout, system, &outcome.values)),
            values,
            violations,
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}
