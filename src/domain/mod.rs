//! Input records consumed by the model assembler.
//!
//! Everything here is plain data resolved upstream by the ingestion layer.
//! Optional fields model "not applicable": an absent limit omits the
//! constraint, it never means zero.

pub mod battery;
pub mod calendar;
pub mod ev;
pub mod grid;
pub mod network;
pub mod pv;
pub mod system;

pub use battery::*;
pub use calendar::*;
pub use ev::*;
pub use grid::*;
pub use network::*;
pub use pv::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Complete scenario handed to the assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInput {
    pub system: SystemParams,
    pub calendar: Calendar,
    pub network: NetworkData,
    #[serde(default)]
    pub loads: Vec<BusLoad>,
    #[serde(default)]
    pub pv: Vec<PvParams>,
    #[serde(default)]
    pub batteries: Vec<BatteryParams>,
    #[serde(default)]
    pub grid: Option<GridParams>,
    #[serde(default)]
    pub ev: Option<EvCharging>,
    #[serde(default)]
    pub economic_constraints: Vec<EconomicConstraint>,
}

impl ModelInput {
    pub fn horizon(&self) -> usize {
        self.calendar.len()
    }
}
