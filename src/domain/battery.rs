//! Battery storage parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::calendar::HOURS_PER_YEAR;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatteryParams {
    pub id: String,
    pub bus: String,

    /// Units already installed.
    #[serde(default)]
    pub existing_units: u32,
    /// When false the number of added units is pinned to `fixed_units`.
    #[serde(default = "default_true")]
    pub sizing: bool,
    #[serde(default)]
    pub fixed_units: u32,
    /// Upper bound on added units when sizing.
    #[serde(default = "default_max_units")]
    pub max_new_units: u32,

    /// Per-unit ratings
    #[validate(range(min = 0.0))]
    pub unit_energy_kwh: f64,
    #[validate(range(min = 0.0))]
    pub unit_charge_kw: f64,
    #[validate(range(min = 0.0))]
    pub unit_discharge_kw: f64,

    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub charge_efficiency: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub discharge_efficiency: f64,
    /// Fraction of stored energy lost per step.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub self_discharge: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_min: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_max: f64,
    /// Fraction of `soc_max` lost to calendar aging over one year.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub annual_aging: f64,
    /// SOC fraction pinned at the first step in emergency mode.
    #[serde(default = "default_initial_soc")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc: f64,

    #[validate(range(min = 1))]
    pub lifetime_years: u32,
    /// Rated lifetime discharge throughput per unit (kWh). Absent means no cap.
    #[serde(default)]
    pub throughput_kwh_per_unit: Option<f64>,

    /// Costs
    #[serde(default)]
    pub capex_per_unit: f64,
    /// Incentive per kWh of added capacity.
    #[serde(default)]
    pub incentive_per_kwh: f64,
    #[serde(default)]
    pub opex_per_unit: f64,
    #[serde(default)]
    pub replacement_per_unit: f64,
    #[serde(default)]
    pub degradation_per_kwh: f64,
}

impl BatteryParams {
    /// SOC ceiling for every step, decaying linearly with calendar aging and
    /// never dropping below the floor.
    pub fn soc_ceiling(&self, horizon: usize, step_hours: f64) -> Vec<f64> {
        let decrement = self.soc_max * self.annual_aging / HOURS_PER_YEAR as f64 * step_hours;
        (0..horizon)
            .map(|t| (self.soc_max - decrement * t as f64).max(self.soc_min.min(self.soc_max)))
            .collect()
    }

    /// Added units when sizing is disabled.
    pub fn pinned_units(&self) -> Option<u32> {
        (!self.sizing).then_some(self.fixed_units)
    }

    pub fn max_added_units(&self) -> u32 {
        self.pinned_units().unwrap_or(self.max_new_units)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_units() -> u32 {
    100
}

fn default_initial_soc() -> f64 {
    0.5
}

#[cfg(test)]
pub(crate) fn sample_battery(id: &str, bus: &str) -> BatteryParams {
    BatteryParams {
        id: id.into(),
        bus: bus.into(),
        existing_units: 0,
        sizing: false,
        fixed_units: 1,
        max_new_units: 10,
        unit_energy_kwh: 10.0,
        unit_charge_kw: 5.0,
        unit_discharge_kw: 5.0,
        charge_efficiency: 0.95,
        discharge_efficiency: 0.95,
        self_discharge: 0.0,
        soc_min: 0.1,
        soc_max: 0.95,
        annual_aging: 0.0,
        initial_soc: 0.5,
        lifetime_years: 10,
        throughput_kwh_per_unit: None,
        capex_per_unit: 0.0,
        incentive_per_kwh: 0.0,
        opex_per_unit: 0.0,
        replacement_per_unit: 0.0,
        degradation_per_kwh: 0.0,
    }
}
