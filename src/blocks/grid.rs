//! Grid connection block.
//!
//! Hired power per tariff period caps the purchase; anything above it is
//! "excess", recorded by a per-month maximeter and penalised according to the
//! metering class. Injection is only enabled when the owner is willing and
//! the installed generation does not exceed the injection threshold.

use itertools::Itertools;
use tracing::debug;

use super::pv::PvFleet;
use super::{validate_record, Balance, CostLedger, ModelContext};
use crate::domain::GridParams;
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder, VarId};
use crate::tariff::{encode_checked, TariffSchedule};

#[derive(Debug, Clone)]
pub struct GridVars {
    pub id: String,
    pub bus: usize,
    pub schedule: TariffSchedule,
    pub hired_kw: Vec<VarId>,
    pub buy: Vec<VarId>,
    pub sell: Vec<VarId>,
    pub excess: Vec<VarId>,
    pub reactive: Vec<VarId>,
    /// `(power period, month, var)` peaks of excess power.
    pub excess_max: Vec<(usize, u32, VarId)>,
    pub injection_enabled: VarId,
    pub injection_aux: Option<VarId>,
    pub purchase_cost: VarId,
    pub sale_revenue: VarId,
    pub power_cost: VarId,
    pub excess_penalty: VarId,
    pub emission_cost: VarId,
    /// Resolved €/kWh purchase price per step.
    pub buy_price: Vec<f64>,
    pub emission_factor: Vec<f64>,
    pub renewable_factor: Vec<f64>,
}

impl GridVars {
    /// Energy drawn from the grid at step `t` (kW), excess included.
    pub fn import(&self, t: usize) -> LinearExpr {
        LinearExpr::from(self.buy[t]) + self.excess[t]
    }
}

/// Upper bounds of the quantities the grid block linearises against.
#[derive(Debug, Clone, Default)]
pub struct GridCoupling {
    pub pv: PvFleet,
    /// Largest combined battery discharge power (kW).
    pub storage_discharge_kw: f64,
}

fn optional_series(
    ctx: &ModelContext<'_>,
    context: &str,
    series: &Option<Vec<f64>>,
) -> Result<Vec<f64>, ModelError> {
    match series {
        Some(s) => {
            ctx.check_series(context, s)?;
            Ok(s.clone())
        }
        None => Ok(vec![0.0; ctx.horizon]),
    }
}

/// Builds the grid connection. Returns `None` when islanded or when no grid
/// is configured; every grid cost is then zero.
pub fn build(
    ctx: &ModelContext<'_>,
    grid: Option<&GridParams>,
    coupling: &GridCoupling,
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<Option<GridVars>, ModelError> {
    let Some(g) = grid else {
        debug!("no grid connection configured");
        return Ok(None);
    };
    if ctx.settings.islanded {
        debug!(grid = %g.id, "islanded; grid connection disabled");
        return Ok(None);
    }

    let context = format!("grid '{}'", g.id);
    validate_record(&context, g)?;
    let bus = ctx.bus(&context, &g.bus)?;
    let schedule = encode_checked(&g.tariff, &g.territory, ctx.calendar)?;
    g.check_periods(&context, &schedule)?;
    let buy_price = g
        .buy_price
        .resolve(&format!("{context} buy_price"), &schedule.energy, &g.access_cost)?;
    let sell_price = g
        .sell_price
        .resolve(&format!("{context} sell_price"), &schedule.energy)?;
    let emission_factor =
        optional_series(ctx, &format!("{context} emission_factor"), &g.emission_factor)?;
    let renewable_factor =
        optional_series(ctx, &format!("{context} renewable_factor"), &g.renewable_factor)?;

    let n = |q: &str| format!("grid.{}.{}", g.id, q);
    let horizon = ctx.horizon;
    let dt = ctx.step_hours;
    let periods = schedule.power.periods();

    // Hired power
    let hired_kw = (0..periods)
        .map(|p| b.nonneg(format!("{}.p{}", n("hired_kw"), p + 1)))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(fixed) = &g.fixed_hired_kw {
        for (var, kw) in hired_kw.iter().zip(fixed) {
            b.fix(*var, *kw);
        }
    }
    if !schedule.is_flat() {
        for (p, (lo, hi)) in hired_kw.iter().tuple_windows().enumerate() {
            b.le(indexed(&n("hired_order"), p), *lo, *hi)?;
        }
    }

    // Exchange
    let limit = g.hard_limit_kw;
    let mut buy = Vec::with_capacity(horizon);
    let mut sell = Vec::with_capacity(horizon);
    let mut excess = Vec::with_capacity(horizon);
    let mut reactive = Vec::with_capacity(horizon);
    for t in 0..horizon {
        let bt = b.nonneg(indexed(&n("buy"), t))?;
        let st = b.nonneg(indexed(&n("sell"), t))?;
        let et = b.nonneg(indexed(&n("excess"), t))?;
        let qt = b.free(indexed(&n("reactive"), t))?;
        if schedule.is_flat() {
            b.fix(et, 0.0);
        }
        if let Some(period) = schedule.power.period_of(t) {
            b.le(indexed(&n("hired_cap"), t), bt, hired_kw[period])?;
        }
        if let Some(lim) = limit {
            b.le(indexed(&n("import_limit"), t), LinearExpr::from(bt) + et, lim)?;
            b.le(indexed(&n("export_limit"), t), st, lim)?;
        }
        balance.supply(bus, t, LinearExpr::from(bt) - st + et);
        balance.supply_reactive(bus, t, qt);
        buy.push(bt);
        sell.push(st);
        excess.push(et);
        reactive.push(qt);
    }

    // Maximeter: peak excess per power period and month, read by the
    // class 4-5 penalty only
    let mut excess_max = Vec::new();
    if !schedule.is_flat() && g.meter_class >= 4 {
        for (p, month) in (0..periods).cartesian_product(ctx.calendar.months()) {
            let steps: Vec<usize> = schedule
                .power
                .steps_in(p)
                .filter(|t| ctx.calendar.step(*t).month == month)
                .collect();
            if steps.is_empty() {
                continue;
            }
            let peak = b.nonneg(format!("{}.p{}[{}]", n("excess_max"), p + 1, month))?;
            for t in steps {
                b.ge(
                    format!("{}.p{}[{}]", n("maximeter"), p + 1, t),
                    peak,
                    excess[t],
                )?;
            }
            excess_max.push((p, month, peak));
        }
    }

    // Injection
    let injection_enabled = b.binary(n("injection_enabled"))?;
    let mut injection_aux = None;
    match (g.injection_willing, g.injection_threshold_kw) {
        (true, Some(threshold)) if !coupling.pv.is_empty => {
            let m_g = coupling.pv.max_added_kw;
            let lambda = injection_enabled;
            let aux = b.nonneg(n("injection_aux"))?;
            let added = coupling.pv.added_kw.clone();
            b.le(
                n("injection_threshold"),
                LinearExpr::from(aux) + LinearExpr::term(lambda, coupling.pv.existing_kw),
                threshold,
            )?;
            b.le(n("injection_aux_switch"), aux, LinearExpr::term(lambda, m_g))?;
            b.le(n("injection_aux_cap"), aux, added.clone())?;
            b.ge(
                n("injection_aux_floor"),
                aux,
                added.clone() - m_g + LinearExpr::term(lambda, m_g),
            )?;
            b.ge(
                n("injection_required"),
                added + coupling.pv.existing_kw,
                LinearExpr::constant(threshold) - LinearExpr::term(lambda, threshold),
            )?;
            injection_aux = Some(aux);
        }
        _ => b.fix(injection_enabled, 0.0),
    }
    let sell_bound = limit.unwrap_or(
        coupling.pv.max_added_kw + coupling.pv.existing_kw + coupling.storage_discharge_kw,
    );
    for (t, st) in sell.iter().enumerate() {
        b.le(
            indexed(&n("sell_switch"), t),
            *st,
            LinearExpr::term(injection_enabled, sell_bound),
        )?;
    }

    // Costs
    let purchase: LinearExpr = (0..horizon)
        .map(|t| (LinearExpr::from(buy[t]) + excess[t]) * (buy_price[t] * dt))
        .sum();
    let revenue: LinearExpr = sell
        .iter()
        .zip(&sell_price)
        .map(|(s, price)| LinearExpr::term(*s, price * dt))
        .sum();
    let power: LinearExpr = hired_kw
        .iter()
        .enumerate()
        .map(|(p, h)| LinearExpr::term(*h, g.hired_power_cost[p]))
        .sum();
    let penalty: LinearExpr = if schedule.is_flat() {
        LinearExpr::zero()
    } else if g.meter_class >= 4 {
        excess_max
            .iter()
            .map(|(_, month, v)| {
                let days = ctx.calendar.days_in_month(*month) as f64;
                LinearExpr::term(*v, g.excess_cost_45 * 2.0 * days)
            })
            .sum()
    } else {
        let factor = dt * 4.0 / 3.0 + 2.0 / 3.0;
        (0..periods)
            .flat_map(|p| schedule.power.steps_in(p).map(move |t| (p, t)))
            .map(|(p, t)| {
                LinearExpr::term(
                    excess[t],
                    g.excess_cost_123 * g.power_period_coefficients[p] * factor,
                )
            })
            .sum()
    };
    let emission: LinearExpr = (0..horizon)
        .map(|t| {
            (LinearExpr::from(buy[t]) + excess[t])
                * (ctx.system.emission_cost * emission_factor[t] * dt)
        })
        .sum();

    let purchase_cost = b.free(n("purchase_cost"))?;
    b.eq(n("purchase_cost_def"), purchase_cost, purchase)?;
    let sale_revenue = b.free(n("sale_revenue"))?;
    b.eq(n("sale_revenue_def"), sale_revenue, revenue)?;
    let power_cost = b.free(n("power_cost"))?;
    b.eq(n("power_cost_def"), power_cost, power)?;
    let excess_penalty = b.free(n("excess_penalty"))?;
    b.eq(n("excess_penalty_def"), excess_penalty, penalty)?;
    let emission_cost = b.free(n("emission_cost"))?;
    b.eq(n("emission_cost_def"), emission_cost, emission)?;

    costs.annual.push(
        LinearExpr::from(purchase_cost) - sale_revenue + power_cost + excess_penalty
            + emission_cost,
    );

    Ok(Some(GridVars {
        id: g.id.clone(),
        bus,
        schedule,
        hired_kw,
        buy,
        sell,
        excess,
        reactive,
        excess_max,
        injection_enabled,
        injection_aux,
        purchase_cost,
        sale_revenue,
        power_cost,
        excess_penalty,
        emission_cost,
        buy_price,
        emission_factor,
        renewable_factor,
    }))
}
