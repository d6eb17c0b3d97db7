//! Photovoltaic generation block.

use tracing::debug;

use super::{validate_record, Balance, CostLedger, ModelContext};
use crate::domain::PvParams;
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder, VarId};

#[derive(Debug, Clone)]
pub struct PvVars {
    pub id: String,
    pub bus: usize,
    pub added_kw: VarId,
    pub existing_kw: f64,
    pub max_added_kw: f64,
    pub output: Vec<VarId>,
    pub capex: VarId,
    pub incentives: VarId,
    pub opex: VarId,
    pub replacement: VarId,
}

/// Aggregates of the PV fleet needed by the grid injection rule.
#[derive(Debug, Clone, Default)]
pub struct PvFleet {
    pub added_kw: LinearExpr,
    pub existing_kw: f64,
    pub max_added_kw: f64,
    pub is_empty: bool,
}

impl PvFleet {
    pub fn of(systems: &[PvVars]) -> Self {
        Self {
            added_kw: systems.iter().map(|s| s.added_kw).sum(),
            existing_kw: systems.iter().map(|s| s.existing_kw).sum(),
            max_added_kw: systems.iter().map(|s| s.max_added_kw).sum(),
            is_empty: systems.is_empty(),
        }
    }
}

pub fn build(
    ctx: &ModelContext<'_>,
    systems: &[PvParams],
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<Vec<PvVars>, ModelError> {
    if systems.is_empty() {
        debug!("no pv systems configured");
    }
    systems
        .iter()
        .map(|p| build_one(ctx, p, b, balance, costs))
        .collect()
}

fn build_one(
    ctx: &ModelContext<'_>,
    p: &PvParams,
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<PvVars, ModelError> {
    let context = format!("pv '{}'", p.id);
    validate_record(&context, p)?;
    let bus = ctx.bus(&context, &p.bus)?;
    ctx.check_series(&format!("{context} capacity_factor"), &p.capacity_factor)?;
    let n = |q: &str| format!("pv.{}.{}", p.id, q);

    let added_kw = b.bounded(n("added_kw"), 0.0, p.max_added_kw())?;
    if !p.sizing {
        b.fix(added_kw, p.fixed_kw);
    }
    let installed = LinearExpr::from(added_kw) + p.existing_kw;

    let mut output = Vec::with_capacity(ctx.horizon);
    for (t, factor) in p.capacity_factor.iter().enumerate() {
        let out = b.nonneg(indexed(&n("output"), t))?;
        b.le(indexed(&n("available"), t), out, installed.clone() * *factor)?;
        balance.supply(bus, t, out);
        output.push(out);
    }

    if let (Some(per_kw), Some(surface)) = (p.m2_per_kw, p.available_surface_m2) {
        b.le(n("surface"), installed.clone() * per_kw, surface)?;
    }

    let replacement_factor = ctx.system.replacement_factor(p.lifetime_years);
    let capex = b.nonneg(n("capex"))?;
    b.eq(n("capex_def"), capex, LinearExpr::term(added_kw, p.capex_per_kw))?;
    let incentives = b.nonneg(n("incentives"))?;
    b.eq(
        n("incentives_def"),
        incentives,
        LinearExpr::term(added_kw, p.incentive_per_kw),
    )?;
    let opex = b.nonneg(n("opex"))?;
    b.eq(n("opex_def"), opex, installed.clone() * p.opex_per_kw)?;
    let replacement = b.nonneg(n("replacement"))?;
    b.eq(
        n("replacement_def"),
        replacement,
        installed * (p.replacement_per_kw * replacement_factor),
    )?;

    costs
        .investment
        .push(LinearExpr::from(capex) - incentives + replacement);
    costs.annual.push(opex.into());
    costs.max_investment += p.max_added_kw() * p.capex_per_kw
        + (p.max_added_kw() + p.existing_kw) * p.replacement_per_kw * replacement_factor;

    Ok(PvVars {
        id: p.id.clone(),
        bus,
        added_kw,
        existing_kw: p.existing_kw,
        max_added_kw: p.max_added_kw(),
        output,
        capex,
        incentives,
        opex,
        replacement,
    })
}

#[cfg(test)]
pub(crate) fn sample_pv(id: &str, bus: &str, horizon: usize) -> PvParams {
    PvParams {
        id: id.into(),
        bus: bus.into(),
        existing_kw: 0.0,
        sizing: false,
        fixed_kw: 2.0,
        max_new_kw: 10.0,
        capacity_factor: vec![0.5; horizon],
        lifetime_years: 25,
        capex_per_kw: 0.0,
        incentive_per_kw: 0.0,
        opex_per_kw: 0.0,
        replacement_per_kw: 0.0,
        m2_per_kw: None,
        available_surface_m2: None,
    }
}
