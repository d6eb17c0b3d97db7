//! Scenario fixtures shared by the integration tests. Scenarios are written
//! as JSON so the tests also exercise the input contract and its defaults.

#![allow(dead_code)]

use std::sync::Arc;

use microgrid_planner::config::ModelSettings;
use microgrid_planner::domain::ModelInput;
use microgrid_planner::solver::{self, SolveOutcome, SolverOptions};
use microgrid_planner::{assemble, AssembledModel, SolveError};
use serde_json::{json, Value};

/// `horizon` weekday hours in January, starting at midnight.
pub fn calendar(horizon: usize) -> Value {
    Value::Array(
        (0..horizon)
            .map(|_| json!({ "month": 1, "weekday": "Mon", "holiday": false }))
            .collect(),
    )
}

pub fn bus(id: &str, slack: bool) -> Value {
    json!({ "id": id, "slack": slack })
}

pub fn load(bus: &str, kw: Vec<f64>) -> Value {
    json!({ "bus": bus, "active_kw": kw })
}

pub fn grid(bus: &str, tariff: &str, buy: Value) -> Value {
    json!({
        "id": "main",
        "bus": bus,
        "tariff": tariff,
        "territory": "peninsula",
        "meter_class": 5,
        "hired_power_cost": [0.0, 0.0],
        "buy_price": buy,
        "sell_price": { "kind": "fixed", "value": 0.05 }
    })
}

/// 10 kWh / 5 kW unit, 0.95 round-trip legs, SOC within [0.1, 0.95].
pub fn battery(id: &str, bus: &str) -> Value {
    json!({
        "id": id,
        "bus": bus,
        "sizing": false,
        "fixed_units": 1,
        "unit_energy_kwh": 10.0,
        "unit_charge_kw": 5.0,
        "unit_discharge_kw": 5.0,
        "charge_efficiency": 0.95,
        "discharge_efficiency": 0.95,
        "soc_min": 0.1,
        "soc_max": 0.95,
        "lifetime_years": 10
    })
}

/// Single slack bus, flat demand, grid with a fixed 0.20 €/kWh price and
/// a two-year, zero-discount project (annuity factor 1).
pub fn single_bus(horizon: usize, demand_kw: f64) -> Value {
    json!({
        "system": {
            "project_lifetime_years": 2,
            "discount_rate": 0.0,
            "unserved_energy_cost": 10.0
        },
        "calendar": calendar(horizon),
        "network": { "buses": [bus("n1", true)] },
        "loads": [load("n1", vec![demand_kw; horizon])],
        "grid": grid("n1", "2.0TD", json!({ "kind": "fixed", "value": 0.2 }))
    })
}

pub fn two_bus(horizon: usize, rating_kw: Option<f64>) -> Value {
    let mut s = single_bus(horizon, 0.0);
    s["network"] = json!({
        "buses": [bus("n1", true), bus("n2", false)],
        "lines": [{
            "id": "l12", "from": "n1", "to": "n2",
            "r": 0.01, "x": 0.05, "per_unit": true,
            "rating_kw": rating_kw
        }]
    });
    s["loads"] = json!([load("n2", vec![5.0; horizon])]);
    s
}

pub fn parse(scenario: Value) -> ModelInput {
    serde_json::from_value(scenario).expect("scenario matches the input contract")
}

pub async fn solve(
    input: &ModelInput,
    settings: &ModelSettings,
) -> Result<(AssembledModel, SolveOutcome), SolveError> {
    solve_on(input, settings, "microlp").await
}

pub async fn solve_on(
    input: &ModelInput,
    settings: &ModelSettings,
    backend: &str,
) -> Result<(AssembledModel, SolveOutcome), SolveError> {
    let model = assemble(input, settings).expect("scenario assembles");
    let program = Arc::new(model.program.clone());
    let backend = solver::backend_by_name(backend)?;
    let outcome = solver::submit(program, backend, SolverOptions::default()).await?;
    Ok((model, outcome))
}

pub fn value(model: &AssembledModel, outcome: &SolveOutcome, name: &str) -> f64 {
    let id = model
        .program
        .find(name)
        .unwrap_or_else(|| panic!("no variable named {name}"));
    outcome.values[id.index()]
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual}"
    );
}
