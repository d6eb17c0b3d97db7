//! Model assembler: validates a [`ModelInput`], runs every block against one
//! shared [`ProgramBuilder`] and closes the bus balances and the objective.

use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::blocks::economic::{self, EconomicVars};
use crate::blocks::ev::{self, EvVars};
use crate::blocks::grid::{self, GridCoupling, GridVars};
use crate::blocks::network::{formulation, Formulation, Injections, NetworkModel};
use crate::blocks::pv::{self, PvFleet, PvVars};
use crate::blocks::{battery, validate_record, Balance, CostLedger, ModelContext};
use crate::blocks::battery::BatteryVars;
use crate::config::ModelSettings;
use crate::domain::{BusLoad, EvCharging, ModelInput, STEP_HOURS};
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, Program, ProgramBuilder, VarId};
use crate::tariff::encode_checked;

/// Handles into the assembled program, grouped by block.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub formulation: &'static str,
    pub horizon: usize,
    pub step_hours: f64,
    pub annuity_factor: f64,
    pub pv: Vec<PvVars>,
    pub batteries: Vec<BatteryVars>,
    pub grid: Option<GridVars>,
    pub ev: EvVars,
    pub economics: EconomicVars,
    pub injections: Injections,
    /// `[bus][t]`, kW.
    pub unserved: Vec<Vec<VarId>>,
    /// `[bus][t]`, kvar; `None` where the bus has no reactive demand.
    pub unserved_reactive: Vec<Vec<Option<VarId>>>,
    pub unserved_cost: VarId,
}

#[derive(Debug, Clone)]
pub struct AssembledModel {
    pub program: Program,
    pub layout: ModelLayout,
}

/// Structural checks that must pass before any variable is created.
pub fn validate(input: &ModelInput, settings: &ModelSettings) -> Result<NetworkModel, ModelError> {
    input.calendar.validate()?;
    validate_record("system", &input.system)?;
    let network = NetworkModel::from_data(&input.network)?;
    if settings.formulation != Formulation::EconomicDispatch && network.slack().is_none() {
        return Err(ModelError::config(
            "network",
            format!("formulation '{}' needs exactly one slack bus", settings.formulation),
        ));
    }

    let horizon = input.horizon();
    let series = |context: &str, s: &[f64]| {
        if s.len() == horizon {
            Ok(())
        } else {
            Err(ModelError::SeriesLength {
                context: context.to_string(),
                expected: horizon,
                found: s.len(),
            })
        }
    };
    for load in &input.loads {
        let context = format!("load at '{}'", load.bus);
        network.bus_index(&context, &load.bus)?;
        series(&context, &load.active_kw)?;
        if let Some(q) = &load.reactive_kvar {
            series(&context, q)?;
        }
    }

    for p in &input.pv {
        let context = format!("pv '{}'", p.id);
        validate_record(&context, p)?;
        network.bus_index(&context, &p.bus)?;
        series(&context, &p.capacity_factor)?;
    }
    for p in &input.batteries {
        let context = format!("battery '{}'", p.id);
        validate_record(&context, p)?;
        network.bus_index(&context, &p.bus)?;
    }
    unique_ids("pv", input.pv.iter().map(|p| p.id.as_str()))?;
    unique_ids("battery", input.batteries.iter().map(|p| p.id.as_str()))?;
    if let Some(EvCharging::Smart { stations, sessions }) = &input.ev {
        unique_ids("ev station", stations.iter().map(|s| s.id.as_str()))?;
        unique_ids("ev session", sessions.iter().map(|s| s.id.as_str()))?;
    }

    if let (Some(g), false) = (&input.grid, settings.islanded) {
        let context = format!("grid '{}'", g.id);
        validate_record(&context, g)?;
        network.bus_index(&context, &g.bus)?;
        let schedule = encode_checked(&g.tariff, &g.territory, &input.calendar)?;
        g.check_periods(&context, &schedule)?;
    }

    economic::validate_constraints(&input.economic_constraints, settings.economic_indicators)?;
    Ok(network)
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<(), ModelError> {
    match ids.duplicates().next() {
        Some(id) => Err(ModelError::config(
            format!("{kind} '{id}'"),
            "id used more than once",
        )),
        None => Ok(()),
    }
}

/// Demand that is fixed before solving, per bus and step (kW).
fn fixed_demand(input: &ModelInput, network: &NetworkModel) -> Result<Vec<Vec<f64>>, ModelError> {
    let horizon = input.horizon();
    let mut demand = vec![vec![0.0; horizon]; network.num_buses()];
    let immediate: &[BusLoad] = match &input.ev {
        Some(EvCharging::Immediate { loads }) => loads,
        _ => &[],
    };
    for load in input.loads.iter().chain(immediate) {
        let bus = network.bus_index(&format!("load at '{}'", load.bus), &load.bus)?;
        for (d, kw) in demand[bus].iter_mut().zip(&load.active_kw) {
            *d += kw.max(0.0);
        }
    }
    Ok(demand)
}

#[instrument(skip_all, fields(horizon = input.horizon(), formulation = %settings.formulation))]
pub fn assemble(input: &ModelInput, settings: &ModelSettings) -> Result<AssembledModel, ModelError> {
    let network = validate(input, settings)?;
    let horizon = input.horizon();
    let ctx = ModelContext {
        horizon,
        step_hours: STEP_HOURS,
        calendar: &input.calendar,
        system: &input.system,
        settings,
        network: &network,
    };
    let dt = ctx.step_hours;
    let s_base = network.base_kva;

    let mut b = ProgramBuilder::new();
    let mut balance = Balance::new(network.num_buses(), horizon);
    let mut costs = CostLedger::default();
    let injections = Injections::new(&network, horizon, &mut b)?;

    let pv = pv::build(&ctx, &input.pv, &mut b, &mut balance, &mut costs)?;
    let batteries = battery::build(&ctx, &input.batteries, &mut b, &mut balance, &mut costs)?;
    let coupling = GridCoupling {
        pv: PvFleet::of(&pv),
        storage_discharge_kw: batteries.iter().map(|v| v.max_discharge_kw).sum(),
    };
    let grid = grid::build(
        &ctx,
        input.grid.as_ref(),
        &coupling,
        &mut b,
        &mut balance,
        &mut costs,
    )?;
    let ev = ev::build(&ctx, input.ev.as_ref(), &mut b, &mut balance, &mut costs)?;

    let mut has_reactive = vec![false; network.num_buses()];
    for load in &input.loads {
        let bus = ctx.bus("load", &load.bus)?;
        for (t, kw) in load.active_kw.iter().enumerate() {
            balance.withdraw(bus, t, *kw);
        }
        if let Some(q) = &load.reactive_kvar {
            has_reactive[bus] |= q.iter().any(|v| *v > 0.0);
            for (t, kvar) in q.iter().enumerate() {
                balance.withdraw_reactive(bus, t, *kvar);
            }
        }
    }
    let reactive_demand: Vec<Vec<f64>> = (0..network.num_buses())
        .map(|i| {
            (0..horizon)
                .map(|t| -balance.reactive(i, t).constant_part())
                .collect()
        })
        .collect();

    // Unserved energy slack
    let demand = fixed_demand(input, &network)?;
    let mut unserved = Vec::with_capacity(network.num_buses());
    let mut unserved_reactive = Vec::with_capacity(network.num_buses());
    for (i, bus) in network.buses.iter().enumerate() {
        let name = format!("balance.{}.unserved", bus.id);
        let row = (0..horizon)
            .map(|t| b.bounded(indexed(&name, t), 0.0, demand[i][t]))
            .collect::<Result<Vec<_>, _>>()?;
        let name = format!("balance.{}.unserved_reactive", bus.id);
        let q_row = (0..horizon)
            .map(|t| {
                let qd = reactive_demand[i][t];
                (has_reactive[i] && qd > 0.0)
                    .then(|| b.bounded(indexed(&name, t), 0.0, qd))
                    .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;
        unserved.push(row);
        unserved_reactive.push(q_row);
    }

    for (i, bus) in network.buses.iter().enumerate() {
        for t in 0..horizon {
            b.eq(
                indexed(&format!("balance.{}.active", bus.id), t),
                LinearExpr::term(injections.active[i][t], s_base),
                balance.active(i, t).clone() + unserved[i][t],
            )?;
            let mut q = balance.reactive(i, t).clone();
            if let Some(v) = unserved_reactive[i][t] {
                q += v;
            }
            b.eq(
                indexed(&format!("balance.{}.reactive", bus.id), t),
                LinearExpr::term(injections.reactive[i][t], s_base),
                q,
            )?;
        }
    }

    let c_ns = input.system.unserved_energy_cost;
    let unserved_cost = b.nonneg("balance.unserved_cost")?;
    let unserved_energy: LinearExpr = unserved
        .iter()
        .flatten()
        .copied()
        .chain(unserved_reactive.iter().flatten().flatten().copied())
        .map(|v| LinearExpr::term(v, c_ns * dt))
        .sum();
    b.eq("balance.unserved_cost_def", unserved_cost, unserved_energy)?;
    costs.annual.push(unserved_cost.into());

    if input.system.min_renewable_share > 0.0 && !pv.is_empty() {
        let mut renewable: LinearExpr = pv
            .iter()
            .flat_map(|p| p.output.iter())
            .map(|v| LinearExpr::term(*v, dt))
            .sum();
        if let Some(g) = &grid {
            for t in 0..horizon {
                renewable += g.import(t) * (g.renewable_factor[t] * dt);
            }
        }
        let fixed: f64 = input
            .loads
            .iter()
            .flat_map(|l| l.active_kw.iter())
            .sum::<f64>()
            * dt;
        b.ge(
            "balance.min_renewable_share",
            renewable,
            input.system.min_renewable_share * (fixed + ev.energy_kwh),
        )?;
    }

    if let (Some(cap), Some(g)) = (input.system.max_emissions_kg(), &grid) {
        let emitted: LinearExpr = (0..horizon)
            .map(|t| g.import(t) * (g.emission_factor[t] * dt))
            .sum();
        b.le("grid.emissions_cap", emitted, cap)?;
    }

    let flow = formulation(
        settings.formulation,
        settings.socp_coupling,
        settings.line_current_limits,
    );
    flow.constrain(&network, &injections, &mut b)?;
    debug!(formulation = flow.name(), "network constrained");

    let economics = economic::build(&ctx, &input.economic_constraints, &costs, &mut b)?;
    let annuity_factor = input.system.annuity_factor();
    b.minimize(LinearExpr::from(economics.investment) + LinearExpr::term(economics.annual, annuity_factor));

    let program = b.build();
    info!(
        vars = program.num_vars(),
        rows = program.num_constraints(),
        pv = pv.len(),
        batteries = batteries.len(),
        grid = grid.is_some(),
        ev_sessions = ev.sessions.len(),
        "model assembled"
    );

    Ok(AssembledModel {
        program,
        layout: ModelLayout {
            formulation: flow.name(),
            horizon,
            step_hours: dt,
            annuity_factor,
            pv,
            batteries,
            grid,
            ev,
            economics,
            injections,
            unserved,
            unserved_reactive,
            unserved_cost,
        },
    })
}
