//! Runtime configuration: `config/default.toml` layered under `MGP__*`
//! environment variables (`MGP__SOLVER__TIME_LIMIT_SECONDS=30`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::blocks::network::{Coupling, Formulation};

pub const ENV_PREFIX: &str = "MGP__";
pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelSettings,
    pub solver: SolverConfig,
    pub telemetry: TelemetryConfig,
    pub io: IoConfig,
}

/// Switches that change the shape of the formulated program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub formulation: Formulation,
    /// No grid connection: the grid block is skipped entirely.
    pub islanded: bool,
    /// Pins the first step's SOC to each battery's initial SOC instead of
    /// closing the cycle.
    pub emergency: bool,
    pub socp_coupling: Coupling,
    pub line_current_limits: bool,
    /// Adds the bilinear ROI and payback definitions.
    pub economic_indicators: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            formulation: Formulation::EconomicDispatch,
            islanded: false,
            emergency: false,
            socp_coupling: Coupling::Relaxed,
            line_current_limits: false,
            economic_indicators: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: String,
    pub time_limit_seconds: u64,
    pub allow_nonconvex: bool,
    /// Tolerance of the post-solve audit.
    pub feasibility_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: "microlp".into(),
            time_limit_seconds: 300,
            allow_nonconvex: false,
            feasibility_tolerance: 1e-6,
        }
    }
}

impl SolverConfig {
    pub fn options(&self) -> crate::solver::SolverOptions {
        crate::solver::SolverOptions {
            time_limit: (self.time_limit_seconds > 0)
                .then(|| Duration::from_secs(self.time_limit_seconds)),
            allow_nonconvex: self.allow_nonconvex,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input.json"),
            output: PathBuf::from("solution.json"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Ok(figment.extract()?)
    }
}
