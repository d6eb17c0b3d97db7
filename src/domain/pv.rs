//! Photovoltaic generation parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PvParams {
    pub id: String,
    pub bus: String,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub existing_kw: f64,
    #[serde(default = "default_true")]
    pub sizing: bool,
    /// Added kW when sizing is disabled.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub fixed_kw: f64,
    #[validate(range(min = 0.0))]
    pub max_new_kw: f64,
    /// Available output per installed kW, length T.
    pub capacity_factor: Vec<f64>,
    #[validate(range(min = 1))]
    pub lifetime_years: u32,
    #[serde(default)]
    pub capex_per_kw: f64,
    #[serde(default)]
    pub incentive_per_kw: f64,
    #[serde(default)]
    pub opex_per_kw: f64,
    #[serde(default)]
    pub replacement_per_kw: f64,
    /// Surface use per installed kW, with the surface available for it.
    #[serde(default)]
    pub m2_per_kw: Option<f64>,
    #[serde(default)]
    pub available_surface_m2: Option<f64>,
}

impl PvParams {
    pub fn max_added_kw(&self) -> f64 {
        if self.sizing {
            self.max_new_kw
        } else {
            self.fixed_kw
        }
    }
}

fn default_true() -> bool {
    true
}
