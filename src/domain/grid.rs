//! Grid connection parameters and price curves.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ModelError;
use crate::tariff::{PeriodSchedule, TariffSchedule};

/// Energy purchase price before access costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuyPrice {
    Fixed { value: f64 },
    /// One price per energy period.
    ByPeriod { values: Vec<f64> },
    /// Wholesale series in €/MWh plus a retail fee in €/kWh.
    Market { eur_per_mwh: Vec<f64>, fee: f64 },
    Series { values: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SellPrice {
    Fixed { value: f64 },
    /// One price per energy period.
    ByPeriod { values: Vec<f64> },
    Market { eur_per_mwh: Vec<f64>, fee: f64 },
    Series { values: Vec<f64> },
}

fn check_len(context: &str, series: &[f64], expected: usize) -> Result<(), ModelError> {
    if series.len() != expected {
        return Err(ModelError::SeriesLength {
            context: context.to_string(),
            expected,
            found: series.len(),
        });
    }
    Ok(())
}

/// Spreads one value per energy period over the horizon.
fn by_period(
    context: &str,
    values: &[f64],
    energy: &PeriodSchedule,
) -> Result<Vec<f64>, ModelError> {
    check_len(context, values, energy.periods())?;
    Ok((0..energy.horizon())
        .map(|t| energy.period_of(t).map(|p| values[p]).unwrap_or(0.0))
        .collect())
}

impl BuyPrice {
    /// Price per step in €/kWh, access costs of the energy period included.
    pub fn resolve(
        &self,
        context: &str,
        energy: &PeriodSchedule,
        access_cost: &[f64],
    ) -> Result<Vec<f64>, ModelError> {
        let horizon = energy.horizon();
        let base: Vec<f64> = match self {
            BuyPrice::Fixed { value } => vec![*value; horizon],
            BuyPrice::ByPeriod { values } => by_period(context, values, energy)?,
            BuyPrice::Market { eur_per_mwh, fee } => {
                check_len(context, eur_per_mwh, horizon)?;
                eur_per_mwh.iter().map(|p| p / 1000.0 + fee).collect()
            }
            BuyPrice::Series { values } => {
                check_len(context, values, horizon)?;
                values.clone()
            }
        };
        if access_cost.is_empty() {
            return Ok(base);
        }
        let access = by_period(&format!("{context} access_cost"), access_cost, energy)?;
        Ok(base.iter().zip(&access).map(|(p, a)| p + a).collect())
    }
}

impl SellPrice {
    /// Sale price per step in €/kWh. No access cost applies to exports.
    pub fn resolve(&self, context: &str, energy: &PeriodSchedule) -> Result<Vec<f64>, ModelError> {
        let horizon = energy.horizon();
        match self {
            SellPrice::Fixed { value } => Ok(vec![*value; horizon]),
            SellPrice::ByPeriod { values } => by_period(context, values, energy),
            SellPrice::Market { eur_per_mwh, fee } => {
                check_len(context, eur_per_mwh, horizon)?;
                Ok(eur_per_mwh.iter().map(|p| p / 1000.0 - fee).collect())
            }
            SellPrice::Series { values } => {
                check_len(context, values, horizon)?;
                Ok(values.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GridParams {
    pub id: String,
    pub bus: String,
    /// Access tariff code, e.g. `2.0TD` or `6.1TD`.
    pub tariff: String,
    pub territory: String,
    /// Metering class 1-5; selects the excess-power penalty formula.
    #[validate(range(min = 1, max = 5))]
    pub meter_class: u8,

    /// €/kW per power period.
    #[serde(default)]
    pub hired_power_cost: Vec<f64>,
    /// Pins hired power per power period instead of optimising it.
    #[serde(default)]
    pub fixed_hired_kw: Option<Vec<f64>>,
    /// Excess penalty coefficient per power period (meter classes 1-3).
    #[serde(default)]
    pub power_period_coefficients: Vec<f64>,
    #[serde(default)]
    pub excess_cost_123: f64,
    #[serde(default)]
    pub excess_cost_45: f64,

    pub buy_price: BuyPrice,
    pub sell_price: SellPrice,
    /// €/kWh per energy period, added to the buy price. Empty means the
    /// price already includes access.
    #[serde(default)]
    pub access_cost: Vec<f64>,
    /// kgCO2 per kWh imported, length T.
    #[serde(default)]
    pub emission_factor: Option<Vec<f64>>,
    /// Renewable share of imported energy, length T.
    #[serde(default)]
    pub renewable_factor: Option<Vec<f64>>,

    #[serde(default)]
    pub injection_willing: bool,
    /// Installed generation above which injection is not allowed (kW).
    /// Required when `injection_willing` is set.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub injection_threshold_kw: Option<f64>,
    /// Physical limit on import and export (kW). Absent means no limit.
    #[serde(default)]
    pub hard_limit_kw: Option<f64>,
}

impl GridParams {
    /// Checks every per-period vector against the encoded tariff. Nothing
    /// falls back to a default for a missing period.
    pub fn check_periods(&self, context: &str, schedule: &TariffSchedule) -> Result<(), ModelError> {
        let power = schedule.power.periods();
        check_len(&format!("{context} hired_power_cost"), &self.hired_power_cost, power)?;
        if let Some(fixed) = &self.fixed_hired_kw {
            check_len(&format!("{context} fixed_hired_kw"), fixed, power)?;
        }
        if self.meter_class <= 3 && !schedule.is_flat() {
            check_len(
                &format!("{context} power_period_coefficients"),
                &self.power_period_coefficients,
                power,
            )?;
        }
        if !self.access_cost.is_empty() {
            check_len(
                &format!("{context} access_cost"),
                &self.access_cost,
                schedule.energy.periods(),
            )?;
        }
        if self.injection_willing && self.injection_threshold_kw.is_none() {
            return Err(ModelError::config(
                context,
                "injection_threshold_kw is required when injection_willing is set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_grid(bus: &str, tariff: &str) -> GridParams {
    GridParams {
        id: "main".into(),
        bus: bus.into(),
        tariff: tariff.into(),
        territory: "peninsula".into(),
        meter_class: 5,
        hired_power_cost: vec![0.0; if tariff == "2.0TD" { 2 } else { 6 }],
        fixed_hired_kw: None,
        power_period_coefficients: Vec::new(),
        excess_cost_123: 0.0,
        excess_cost_45: 0.0,
        buy_price: BuyPrice::Fixed { value: 0.2 },
        sell_price: SellPrice::Fixed { value: 0.05 },
        access_cost: Vec::new(),
        emission_factor: None,
        renewable_factor: None,
        injection_willing: false,
        injection_threshold_kw: None,
        hard_limit_kw: None,
    }
}
