//! Battery storage block.
//!
//! Installed units are `existing + added`; power and energy ratings scale
//! with them. SOC is tracked in kWh and cycles over the horizon: the first
//! step evolves from the last one, unless emergency mode pins it to the
//! configured initial fraction of capacity.

use tracing::debug;

use super::{validate_record, Balance, CostLedger, ModelContext};
use crate::domain::BatteryParams;
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder, VarId};

/// Handles to one battery's variables.
#[derive(Debug, Clone)]
pub struct BatteryVars {
    pub id: String,
    pub bus: usize,
    pub added_units: VarId,
    pub charge: Vec<VarId>,
    pub discharge: Vec<VarId>,
    pub soc: Vec<VarId>,
    pub capex: VarId,
    pub incentives: VarId,
    pub opex: VarId,
    pub replacement: VarId,
    pub degradation: VarId,
    /// Largest discharge power the battery can reach (kW).
    pub max_discharge_kw: f64,
}

pub fn build(
    ctx: &ModelContext<'_>,
    batteries: &[BatteryParams],
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<Vec<BatteryVars>, ModelError> {
    if batteries.is_empty() {
        debug!("no batteries configured");
        return Ok(Vec::new());
    }
    batteries
        .iter()
        .map(|p| build_one(ctx, p, b, balance, costs))
        .collect()
}

fn build_one(
    ctx: &ModelContext<'_>,
    p: &BatteryParams,
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<BatteryVars, ModelError> {
    let context = format!("battery '{}'", p.id);
    validate_record(&context, p)?;
    let bus = ctx.bus(&context, &p.bus)?;
    let n = |q: &str| format!("battery.{}.{}", p.id, q);
    let horizon = ctx.horizon;
    let dt = ctx.step_hours;
    let existing = f64::from(p.existing_units);

    let added_units = b.integer(n("added_units"), 0.0, f64::from(p.max_added_units()))?;
    if let Some(pinned) = p.pinned_units() {
        b.fix(added_units, f64::from(pinned));
    }
    let units = LinearExpr::from(added_units) + existing;
    let capacity = units.clone() * p.unit_energy_kwh;

    let charge = (0..horizon)
        .map(|t| b.nonneg(indexed(&n("charge"), t)))
        .collect::<Result<Vec<_>, _>>()?;
    let discharge = (0..horizon)
        .map(|t| b.nonneg(indexed(&n("discharge"), t)))
        .collect::<Result<Vec<_>, _>>()?;
    let soc = (0..horizon)
        .map(|t| b.nonneg(indexed(&n("soc"), t)))
        .collect::<Result<Vec<_>, _>>()?;

    let ceiling = p.soc_ceiling(horizon, dt);
    let retain = 1.0 - p.self_discharge;

    for t in 0..horizon {
        b.ge(indexed(&n("soc_min"), t), soc[t], capacity.clone() * p.soc_min)?;
        b.le(indexed(&n("soc_max"), t), soc[t], capacity.clone() * ceiling[t])?;
        b.le(
            indexed(&n("charge_cap"), t),
            charge[t],
            units.clone() * p.unit_charge_kw,
        )?;
        b.le(
            indexed(&n("discharge_cap"), t),
            discharge[t],
            units.clone() * p.unit_discharge_kw,
        )?;

        let flow = (LinearExpr::term(charge[t], p.charge_efficiency)
            - LinearExpr::term(discharge[t], 1.0 / p.discharge_efficiency))
            * dt;
        let previous = if t > 0 {
            LinearExpr::term(soc[t - 1], retain)
        } else if ctx.settings.emergency {
            capacity.clone() * (p.initial_soc * retain)
        } else {
            LinearExpr::term(soc[horizon - 1], retain)
        };
        b.eq(indexed(&n("soc_balance"), t), soc[t], previous + flow)?;

        balance.supply(bus, t, LinearExpr::from(discharge[t]) - charge[t]);
    }

    if let Some(throughput) = p.throughput_kwh_per_unit {
        let delivered: LinearExpr = discharge
            .iter()
            .map(|d| LinearExpr::term(*d, dt / p.discharge_efficiency))
            .sum();
        let cap = units.clone() * (throughput / f64::from(p.lifetime_years));
        b.le(n("throughput"), delivered, cap)?;
    }

    let replacement_factor = ctx.system.replacement_factor(p.lifetime_years);

    let capex = b.nonneg(n("capex"))?;
    b.eq(
        n("capex_def"),
        capex,
        LinearExpr::term(added_units, p.capex_per_unit),
    )?;
    let incentives = b.nonneg(n("incentives"))?;
    b.eq(
        n("incentives_def"),
        incentives,
        LinearExpr::term(added_units, p.incentive_per_kwh * p.unit_energy_kwh),
    )?;
    let opex = b.nonneg(n("opex"))?;
    b.eq(n("opex_def"), opex, units.clone() * p.opex_per_unit)?;
    let replacement = b.nonneg(n("replacement"))?;
    b.eq(
        n("replacement_def"),
        replacement,
        units.clone() * (p.replacement_per_unit * replacement_factor),
    )?;
    let degradation = b.nonneg(n("degradation"))?;
    let cycled: LinearExpr = charge
        .iter()
        .chain(discharge.iter())
        .map(|v| LinearExpr::term(*v, dt * p.degradation_per_kwh))
        .sum();
    b.eq(n("degradation_def"), degradation, cycled)?;

    costs
        .investment
        .push(LinearExpr::from(capex) - incentives + replacement);
    costs.annual.push(LinearExpr::from(opex) + degradation);
    let max_units = f64::from(p.max_added_units());
    costs.max_investment += max_units * p.capex_per_unit
        + (max_units + existing) * p.replacement_per_unit * replacement_factor;

    Ok(BatteryVars {
        id: p.id.clone(),
        bus,
        added_units,
        charge,
        discharge,
        soc,
        capex,
        incentives,
        opex,
        replacement,
        degradation,
        max_discharge_kw: (max_units + existing) * p.unit_discharge_kw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::{context, single_bus, weekday_calendar};
    use crate::config::ModelSettings;
    use crate::domain::battery::sample_battery;
    use crate::domain::system::sample_system;

    fn build_program(
        params: &BatteryParams,
        horizon: usize,
        settings: &ModelSettings,
    ) -> (crate::program::Program, BatteryVars) {
        let cal = weekday_calendar(horizon);
        let sys = sample_system();
        let net = single_bus();
        let ctx = context(&cal, &sys, settings, &net);
        let mut b = ProgramBuilder::new();
        let mut balance = Balance::new(1, horizon);
        let mut costs = CostLedger::default();
        let vars = build(&ctx, std::slice::from_ref(params), &mut b, &mut balance, &mut costs)
            .unwrap()
            .remove(0);
        (b.build(), vars)
    }

    /// Full assignment with every cost variable consistent with zero cost.
    fn assignment(
        program: &crate::program::Program,
        vars: &BatteryVars,
        units: f64,
        soc: &[f64],
        charge: &[f64],
        discharge: &[f64],
    ) -> Vec<f64> {
        let mut x = vec![0.0; program.num_vars()];
        x[vars.added_units.index()] = units;
        for t in 0..soc.len() {
            x[vars.soc[t].index()] = soc[t];
            x[vars.charge[t].index()] = charge[t];
            x[vars.discharge[t].index()] = discharge[t];
        }
        x
    }

    #[test]
    fn cyclic_soc_round_trip_with_two_steps() {
        let mut p = sample_battery("b1", "n1");
        p.charge_efficiency = 1.0;
        p.discharge_efficiency = 1.0;
        let (prog, vars) = build_program(&p, 2, &ModelSettings::default());

        // SOC[1] = SOC[0] + 3, SOC[0] = SOC[1] - 3.
        let x = assignment(&prog, &vars, 1.0, &[4.0, 7.0], &[0.0, 3.0], &[3.0, 0.0]);
        assert!(prog.check(&x, 1e-9).is_empty(), "{:?}", prog.check(&x, 1e-9));

        let soc0_forward = x[vars.soc[1].index()] + (x[vars.charge[0].index()]
            - x[vars.discharge[0].index()]);
        assert_eq!(soc0_forward, x[vars.soc[0].index()]);

        // Breaking the wrap-around is caught on the first step's row.
        let bad = assignment(&prog, &vars, 1.0, &[5.0, 8.0], &[0.0, 3.0], &[2.0, 0.0]);
        let v = prog.check_rows("battery.b1.soc_balance[0]", &bad, 1e-9);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn emergency_mode_pins_first_step() {
        let mut p = sample_battery("b1", "n1");
        p.charge_efficiency = 1.0;
        p.discharge_efficiency = 1.0;
        p.initial_soc = 0.5;
        let settings = ModelSettings {
            emergency: true,
            ..ModelSettings::default()
        };
        let (prog, vars) = build_program(&p, 2, &settings);
        let x = assignment(&prog, &vars, 1.0, &[6.0, 6.0], &[1.0, 0.0], &[0.0, 0.0]);
        assert!(prog.check_rows("battery.b1.soc_balance", &x, 1e-9).is_empty());
        let y = assignment(&prog, &vars, 1.0, &[6.0, 6.0], &[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(prog.check_rows("battery.b1.soc_balance[0]", &y, 1e-9).len(), 1);
    }

    #[test]
    fn soc_outside_band_is_flagged() {
        let p = sample_battery("b1", "n1");
        let (prog, vars) = build_program(&p, 1, &ModelSettings::default());
        let over = assignment(&prog, &vars, 1.0, &[9.6], &[0.0], &[0.0]);
        assert_eq!(prog.check_rows("battery.b1.soc_max", &over, 1e-9).len(), 1);
        let under = assignment(&prog, &vars, 1.0, &[0.5], &[0.0], &[0.0]);
        assert_eq!(prog.check_rows("battery.b1.soc_min", &under, 1e-9).len(), 1);
    }

    /// One emergency step starting at half charge with the charge power pinned.
    fn pinned_charge_program(charge_kw: f64) -> crate::program::Program {
        let p = sample_battery("b1", "n1");
        let cal = weekday_calendar(1);
        let sys = sample_system();
        let net = single_bus();
        let settings = ModelSettings {
            emergency: true,
            ..ModelSettings::default()
        };
        let ctx = context(&cal, &sys, &settings, &net);
        let mut b = ProgramBuilder::new();
        let vars = build(
            &ctx,
            std::slice::from_ref(&p),
            &mut b,
            &mut Balance::new(1, 1),
            &mut CostLedger::default(),
        )
        .unwrap()
        .remove(0);
        b.fix(vars.charge[0], charge_kw);
        b.fix(vars.discharge[0], 0.0);
        b.build()
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn charging_past_the_ceiling_is_infeasible() {
        use crate::solver::{MicrolpBackend, SolveStatus, SolverBackend, SolverOptions};

        // 5 kWh + 0.95 * 4 kW stays under the 9.5 kWh ceiling.
        let within = pinned_charge_program(4.0);
        let outcome = MicrolpBackend.solve(&within, &SolverOptions::default()).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);

        // 5 kWh + 0.95 * 5 kW = 9.75 kWh does not.
        let over = pinned_charge_program(5.0);
        let outcome = MicrolpBackend.solve(&over, &SolverOptions::default()).unwrap();
        assert!(matches!(outcome.status, SolveStatus::Infeasible(_)));
    }

    #[test]
    fn simultaneous_flows_are_priced_not_forbidden() {
        let mut p = sample_battery("b1", "n1");
        p.charge_efficiency = 1.0;
        p.discharge_efficiency = 1.0;
        p.degradation_per_kwh = 0.1;
        let (prog, vars) = build_program(&p, 1, &ModelSettings::default());

        let integers: Vec<_> = prog
            .variables()
            .iter()
            .filter(|v| v.kind != crate::program::VarKind::Continuous)
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(integers, ["battery.b1.added_units"]);

        let mut x = assignment(&prog, &vars, 1.0, &[5.0], &[2.0], &[2.0]);
        x[vars.degradation.index()] = 0.4;
        assert!(prog.check(&x, 1e-9).is_empty(), "{:?}", prog.check(&x, 1e-9));
    }

    #[test]
    fn pinned_sizing_fixes_added_units() {
        let p = sample_battery("b1", "n1");
        let (prog, vars) = build_program(&p, 1, &ModelSettings::default());
        let v = prog.variable(vars.added_units);
        assert_eq!((v.lower, v.upper), (1.0, 1.0));
    }

    #[test]
    fn empty_battery_list_creates_nothing() {
        let cal = weekday_calendar(4);
        let sys = sample_system();
        let net = single_bus();
        let settings = ModelSettings::default();
        let ctx = context(&cal, &sys, &settings, &net);
        let mut b = ProgramBuilder::new();
        let mut costs = CostLedger::default();
        let vars = build(&ctx, &[], &mut b, &mut Balance::new(1, 4), &mut costs).unwrap();
        assert!(vars.is_empty());
        assert_eq!(b.num_vars(), 0);
        assert_eq!(costs.max_investment, 0.0);
    }

    #[test]
    fn unknown_bus_is_a_configuration_error() {
        let cal = weekday_calendar(1);
        let sys = sample_system();
        let net = single_bus();
        let settings = ModelSettings::default();
        let ctx = context(&cal, &sys, &settings, &net);
        let p = sample_battery("b1", "nowhere");
        let err = build(
            &ctx,
            &[p],
            &mut ProgramBuilder::new(),
            &mut Balance::new(1, 1),
            &mut CostLedger::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownBus {
                context: "battery 'b1'".into(),
                bus: "nowhere".into()
            }
        );
    }
}
