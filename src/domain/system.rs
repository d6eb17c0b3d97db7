//! Project-wide economic and policy parameters.

use serde::{Deserialize, Serialize};
use strum::Display;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SystemParams {
    #[validate(range(min = 1))]
    pub project_lifetime_years: u32,
    #[validate(range(min = 0.0))]
    pub discount_rate: f64,
    /// Annual cost of the status-quo system; absent counts as zero.
    #[serde(default)]
    pub annual_cost_reference: Option<f64>,
    /// €/kWh of demand left unserved.
    #[validate(range(min = 0.0))]
    pub unserved_energy_cost: f64,
    /// €/kg of CO2 emitted through grid imports.
    #[serde(default)]
    pub emission_cost: f64,
    /// Minimum share of demand covered by renewable energy, 0-1.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_renewable_share: f64,
    /// Reference annual emissions (kg). Absent means no cap.
    #[serde(default)]
    pub emissions_reference_kg: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub emissions_reduction: f64,
}

impl SystemParams {
    /// `Σ_{y=1}^{L-1} (1+r)^-y`, the factor applied to annual costs in the
    /// objective.
    pub fn annuity_factor(&self) -> f64 {
        (1..self.project_lifetime_years)
            .map(|y| (1.0 + self.discount_rate).powi(-(y as i32)))
            .sum()
    }

    /// Discount factors of replacements every `lifetime` years, excluding one
    /// falling exactly on the project horizon.
    pub fn replacement_factor(&self, lifetime: u32) -> f64 {
        if lifetime == 0 {
            return 0.0;
        }
        (1..)
            .map(|k| k * lifetime)
            .take_while(|y| *y < self.project_lifetime_years)
            .map(|y| (1.0 + self.discount_rate).powi(-(y as i32)))
            .sum()
    }

    pub fn max_emissions_kg(&self) -> Option<f64> {
        self.emissions_reference_kg
            .map(|r| r * (1.0 - self.emissions_reduction))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EconomicVariable {
    Roi,
    Payback,
    Investment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

/// User-supplied bound on an economic indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicConstraint {
    pub enabled: bool,
    pub variable: EconomicVariable,
    pub operator: Comparison,
    pub value: f64,
}

#[cfg(test)]
pub(crate) fn sample_system() -> SystemParams {
    SystemParams {
        project_lifetime_years: 2,
        discount_rate: 0.0,
        annual_cost_reference: None,
        unserved_energy_cost: 10.0,
        emission_cost: 0.0,
        min_renewable_share: 0.0,
        emissions_reference_kg: None,
        emissions_reduction: 0.0,
    }
}
