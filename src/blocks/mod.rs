//! Asset, network and economic blocks.
//!
//! Every block receives the immutable [`ModelContext`] plus its own slice of
//! the input, registers its variables and rows through the shared
//! [`ProgramBuilder`], and reports what it contributes to the bus balances
//! and to the cost ledger. An empty asset list is valid and contributes
//! nothing.

pub mod battery;
pub mod economic;
pub mod ev;
pub mod grid;
pub mod network;
pub mod pv;

use validator::Validate;

use crate::config::ModelSettings;
use crate::domain::{Calendar, SystemParams};
use crate::error::ModelError;
use crate::program::LinearExpr;

pub use network::NetworkModel;

/// Read-only view shared by all blocks.
#[derive(Debug, Clone, Copy)]
pub struct ModelContext<'a> {
    pub horizon: usize,
    pub step_hours: f64,
    pub calendar: &'a Calendar,
    pub system: &'a SystemParams,
    pub settings: &'a ModelSettings,
    pub network: &'a NetworkModel,
}

impl ModelContext<'_> {
    pub fn bus(&self, context: &str, id: &str) -> Result<usize, ModelError> {
        self.network.bus_index(context, id)
    }

    pub fn check_series(&self, context: &str, series: &[f64]) -> Result<(), ModelError> {
        if series.len() != self.horizon {
            return Err(ModelError::SeriesLength {
                context: context.to_string(),
                expected: self.horizon,
                found: series.len(),
            });
        }
        Ok(())
    }
}

/// Runs `validator` rules on a record, attaching the record's context.
pub(crate) fn validate_record<T: Validate>(context: &str, record: &T) -> Result<(), ModelError> {
    record
        .validate()
        .map_err(|e| ModelError::config(context, e.to_string()))
}

/// Net supply per bus and step in kW (kvar for reactive). Demand enters
/// with a negative sign.
#[derive(Debug, Clone)]
pub struct Balance {
    active: Vec<Vec<LinearExpr>>,
    reactive: Vec<Vec<LinearExpr>>,
}

impl Balance {
    pub fn new(buses: usize, horizon: usize) -> Self {
        Self {
            active: vec![vec![LinearExpr::zero(); horizon]; buses],
            reactive: vec![vec![LinearExpr::zero(); horizon]; buses],
        }
    }

    pub fn supply(&mut self, bus: usize, t: usize, expr: impl Into<LinearExpr>) {
        self.active[bus][t] += expr;
    }

    pub fn withdraw(&mut self, bus: usize, t: usize, expr: impl Into<LinearExpr>) {
        self.active[bus][t] -= expr;
    }

    pub fn supply_reactive(&mut self, bus: usize, t: usize, expr: impl Into<LinearExpr>) {
        self.reactive[bus][t] += expr;
    }

    pub fn withdraw_reactive(&mut self, bus: usize, t: usize, expr: impl Into<LinearExpr>) {
        self.reactive[bus][t] -= expr;
    }

    pub fn active(&self, bus: usize, t: usize) -> &LinearExpr {
        &self.active[bus][t]
    }

    pub fn reactive(&self, bus: usize, t: usize) -> &LinearExpr {
        &self.reactive[bus][t]
    }
}

/// Cost expressions collected from the asset blocks.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    /// capex - incentives + discounted replacements, per asset.
    pub investment: Vec<LinearExpr>,
    /// Yearly operating terms, per asset.
    pub annual: Vec<LinearExpr>,
    /// Upper bound of the total investment, used to size its big-M.
    pub max_investment: f64,
}

impl CostLedger {
    pub fn total_investment(&self) -> LinearExpr {
        self.investment.iter().cloned().sum()
    }

    pub fn total_annual(&self) -> LinearExpr {
        self.annual.iter().cloned().sum()
    }
}
