//! Electric-vehicle charging input.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::network::BusLoad;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvCharging {
    /// Vehicles charge as soon as they plug in; the profile is a fixed load.
    Immediate { loads: Vec<BusLoad> },
    /// Sessions are scheduled by the optimiser within their availability.
    Smart {
        stations: Vec<EvStation>,
        sessions: Vec<EvSession>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvStation {
    pub id: String,
    pub bus: String,
    #[validate(range(min = 0.0))]
    pub max_kw: f64,
}

/// One vehicle-day charging opportunity. `availability` and `baseline_kw`
/// cover the window starting at `start_step`; outside it the vehicle is away.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvSession {
    pub id: String,
    pub station: String,
    pub start_step: usize,
    /// Fraction of `max_kw` available per step of the window.
    pub availability: Vec<f64>,
    /// Power the vehicle would draw with immediate charging.
    pub baseline_kw: Vec<f64>,
    #[validate(range(min = 0.0))]
    pub max_kw: f64,
    #[validate(range(min = 0.0))]
    pub energy_kwh: f64,
    /// Paid to the user whenever the schedule departs from the baseline.
    #[serde(default)]
    pub flexibility_price: f64,
}

impl EvSession {
    pub fn window(&self) -> std::ops::Range<usize> {
        self.start_step..self.start_step + self.availability.len()
    }

    /// Power cap at absolute step `t`.
    pub fn cap_at(&self, t: usize) -> f64 {
        t.checked_sub(self.start_step)
            .and_then(|i| self.availability.get(i))
            .map(|a| a * self.max_kw)
            .unwrap_or(0.0)
    }

    pub fn baseline_at(&self, t: usize) -> f64 {
        t.checked_sub(self.start_step)
            .and_then(|i| self.baseline_kw.get(i))
            .copied()
            .unwrap_or(0.0)
    }
}
