//! Network block: per-unit network model and the interchangeable power-flow
//! formulations coupling bus injections.
//!
//! All formulations constrain the same per-unit injection variables
//! (`Pinj`, `Qinj`), so the rest of the model never depends on which one is
//! selected.

pub mod dc_opf;
pub mod economic_dispatch;
pub mod socp;

use std::collections::HashMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::validate_record;
use crate::domain::{BusKind, NetworkData};
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{ProgramBuilder, VarId};

pub use dc_opf::DcOpf;
pub use economic_dispatch::EconomicDispatch;
pub use socp::AcSocp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Formulation {
    #[default]
    EconomicDispatch,
    DcOpf,
    AcSocp,
}

/// How the SOCP couples `c`, `s` and the diagonal terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Coupling {
    /// `c² + s² ≤ cii·cjj`: convex second-order cone.
    #[default]
    Relaxed,
    /// `c² + s² = cii·cjj`: exact AC, nonconvex.
    Exact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PuBus {
    pub id: String,
    pub kind: BusKind,
    pub vmin: f64,
    pub vmax: f64,
    pub slack: bool,
}

/// Line in per-unit on the system base.
#[derive(Debug, Clone, PartialEq)]
pub struct PuLine {
    pub id: String,
    pub from: usize,
    pub to: usize,
    pub r: f64,
    pub x: f64,
    /// Total shunt susceptance.
    pub b: f64,
    pub rating: Option<f64>,
    pub current_rating: Option<f64>,
}

impl PuLine {
    /// Series admittance `1 / (r + jx)`.
    pub fn series_admittance(&self) -> Complex64 {
        Complex64::new(self.r, self.x).inv()
    }

    /// Susceptance used by the DC approximation, `x / (r² + x²)`.
    pub fn dc_susceptance(&self) -> f64 {
        -self.series_admittance().im
    }
}

/// Validated network in per-unit.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    pub base_kva: f64,
    pub buses: Vec<PuBus>,
    pub lines: Vec<PuLine>,
    index: HashMap<String, usize>,
}

impl NetworkModel {
    pub fn from_data(data: &NetworkData) -> Result<Self, ModelError> {
        validate_record("network", data)?;
        let mut index = HashMap::new();
        let mut buses = Vec::with_capacity(data.buses.len());
        for (i, bus) in data.buses.iter().enumerate() {
            let context = format!("bus '{}'", bus.id);
            if index.insert(bus.id.clone(), i).is_some() {
                return Err(ModelError::config(context, "duplicate bus id"));
            }
            if bus.vmin > bus.vmax {
                return Err(ModelError::config(context, "vmin exceeds vmax"));
            }
            buses.push(PuBus {
                id: bus.id.clone(),
                kind: bus.kind,
                vmin: bus.vmin,
                vmax: bus.vmax,
                slack: bus.slack,
            });
        }
        if buses.iter().filter(|b| b.slack).count() > 1 {
            return Err(ModelError::config("network", "more than one slack bus"));
        }

        let mut seen = HashMap::new();
        let mut lines = Vec::with_capacity(data.lines.len());
        for line in &data.lines {
            let context = format!("line '{}'", line.id);
            if seen.insert(line.id.as_str(), ()).is_some() {
                return Err(ModelError::config(context, "duplicate line id"));
            }
            let lookup = |id: &str| {
                index.get(id).copied().ok_or_else(|| ModelError::UnknownBus {
                    context: context.clone(),
                    bus: id.to_string(),
                })
            };
            let from = lookup(&line.from)?;
            let to = lookup(&line.to)?;
            if from == to {
                return Err(ModelError::config(context, "line connects a bus to itself"));
            }
            if line.r == 0.0 && line.x == 0.0 {
                return Err(ModelError::config(context, "zero series impedance"));
            }

            let kv = data.buses[from].base_kv;
            let z_base = kv * kv * 1000.0 / data.base_kva;
            let i_base = data.base_kva / (3f64.sqrt() * kv);
            let (r, x, b) = if line.per_unit {
                (line.r, line.x, line.b)
            } else {
                (line.r / z_base, line.x / z_base, line.b * z_base)
            };
            lines.push(PuLine {
                id: line.id.clone(),
                from,
                to,
                r,
                x,
                b,
                rating: line.rating_kw.map(|kw| kw / data.base_kva),
                current_rating: line.current_rating_a.map(|a| a / i_base),
            });
        }

        Ok(Self {
            base_kva: data.base_kva,
            buses,
            lines,
            index,
        })
    }

    pub fn bus_index(&self, context: &str, id: &str) -> Result<usize, ModelError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ModelError::UnknownBus {
                context: context.to_string(),
                bus: id.to_string(),
            })
    }

    pub fn slack(&self) -> Option<usize> {
        self.buses.iter().position(|b| b.slack)
    }

    pub fn num_buses(&self) -> usize {
        self.buses.len()
    }

    /// Dense nodal admittance matrix: off-diagonal `-y`, diagonal
    /// `Σ y + j·b/2` over incident lines.
    pub fn admittance(&self) -> Vec<Vec<Complex64>> {
        let n = self.buses.len();
        let mut y_bus = vec![vec![Complex64::new(0.0, 0.0); n]; n];
        for line in &self.lines {
            let y = line.series_admittance();
            let shunt = Complex64::new(0.0, line.b / 2.0);
            y_bus[line.from][line.to] -= y;
            y_bus[line.to][line.from] -= y;
            y_bus[line.from][line.from] += y + shunt;
            y_bus[line.to][line.to] += y + shunt;
        }
        y_bus
    }
}

/// Per-unit injection variables shared by all formulations, `[bus][t]`.
#[derive(Debug, Clone)]
pub struct Injections {
    pub active: Vec<Vec<VarId>>,
    pub reactive: Vec<Vec<VarId>>,
}

impl Injections {
    pub fn new(
        network: &NetworkModel,
        horizon: usize,
        b: &mut ProgramBuilder,
    ) -> Result<Self, ModelError> {
        let mut active = Vec::with_capacity(network.num_buses());
        let mut reactive = Vec::with_capacity(network.num_buses());
        for bus in &network.buses {
            active.push(
                (0..horizon)
                    .map(|t| b.free(indexed(&format!("network.{}.p_inj", bus.id), t)))
                    .collect::<Result<Vec<_>, _>>()?,
            );
            reactive.push(
                (0..horizon)
                    .map(|t| b.free(indexed(&format!("network.{}.q_inj", bus.id), t)))
                    .collect::<Result<Vec<_>, _>>()?,
            );
        }
        Ok(Self { active, reactive })
    }

    pub fn horizon(&self) -> usize {
        self.active.first().map(Vec::len).unwrap_or(0)
    }
}

/// A power-flow formulation: adds its own variables and rows tying the
/// shared injections together.
pub trait PowerFlow {
    fn name(&self) -> &'static str;

    fn constrain(
        &self,
        network: &NetworkModel,
        injections: &Injections,
        b: &mut ProgramBuilder,
    ) -> Result<(), ModelError>;
}

pub fn formulation(kind: Formulation, coupling: Coupling, current_limits: bool) -> Box<dyn PowerFlow> {
    match kind {
        Formulation::EconomicDispatch => Box::new(EconomicDispatch),
        Formulation::DcOpf => Box::new(DcOpf),
        Formulation::AcSocp => Box::new(AcSocp {
            coupling,
            current_limits,
        }),
    }
}

pub(crate) fn require_slack(network: &NetworkModel, name: &str) -> Result<usize, ModelError> {
    network
        .slack()
        .ok_or_else(|| ModelError::config("network", format!("{name} needs a slack bus")))
}
