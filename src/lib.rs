//! Formulation engine for microgrid sizing and dispatch.
//!
//! A [`domain::ModelInput`] is assembled into a solver-independent
//! [`program::Program`] by [`model::assemble`], solved through a
//! [`solver::SolverBackend`] and read back as a [`results::SolutionReport`].

pub mod blocks;
pub mod config;
pub mod domain;
pub mod error;
pub mod model;
pub mod program;
pub mod results;
pub mod solver;
pub mod tariff;
pub mod telemetry;

pub use error::{ModelError, SolveError};
pub use model::{assemble, AssembledModel, ModelLayout};
