//! Bus and line records of the electrical network.

use serde::{Deserialize, Serialize};
use strum::Display;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BusKind {
    #[default]
    Ac,
    Dc,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Bus {
    pub id: String,
    #[serde(default)]
    pub kind: BusKind,
    /// Base voltage in kV, used for per-unit conversion of attached lines.
    #[serde(default = "default_base_kv")]
    #[validate(range(exclusive_min = 0.0))]
    pub base_kv: f64,
    /// Voltage magnitude limits in per-unit.
    #[serde(default = "default_vmin")]
    #[validate(range(min = 0.0))]
    pub vmin: f64,
    #[serde(default = "default_vmax")]
    #[validate(range(min = 0.0))]
    pub vmax: f64,
    #[serde(default)]
    pub slack: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Line {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Series resistance, in ohm (or per-unit when `per_unit` is set).
    #[validate(range(min = 0.0))]
    pub r: f64,
    /// Series reactance, in ohm (or per-unit).
    pub x: f64,
    /// Total shunt susceptance, in siemens (or per-unit).
    #[serde(default)]
    pub b: f64,
    /// Active power rating in kW. Absent means unconstrained.
    #[serde(default)]
    pub rating_kw: Option<f64>,
    /// Current rating in A. Absent means unconstrained.
    #[serde(default)]
    pub current_rating_a: Option<f64>,
    #[serde(default)]
    pub per_unit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NetworkData {
    /// System power base in kVA.
    #[serde(default = "default_base_kva")]
    #[validate(range(exclusive_min = 0.0))]
    pub base_kva: f64,
    #[validate(nested)]
    pub buses: Vec<Bus>,
    #[serde(default)]
    #[validate(nested)]
    pub lines: Vec<Line>,
}

/// Active (and optionally reactive) demand at one bus, length T.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusLoad {
    pub bus: String,
    pub active_kw: Vec<f64>,
    #[serde(default)]
    pub reactive_kvar: Option<Vec<f64>>,
}

fn default_base_kv() -> f64 {
    0.4
}

fn default_vmin() -> f64 {
    0.9
}

fn default_vmax() -> f64 {
    1.1
}

fn default_base_kva() -> f64 {
    100.0
}
