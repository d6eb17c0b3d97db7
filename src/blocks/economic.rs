//! Economic aggregation: total investment, annual cost and the optional
//! ROI / payback indicators.

use tracing::debug;

use super::{CostLedger, ModelContext};
use crate::domain::{Comparison, EconomicConstraint, EconomicVariable};
use crate::error::ModelError;
use crate::program::{LinearExpr, ProgramBuilder, QuadraticExpr, Relation, VarId};

/// Investment below this amount (€) counts as no investment.
pub const INVESTMENT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct EconomicVars {
    pub investment: VarId,
    pub annual: VarId,
    pub is_investment: VarId,
    pub roi: Option<VarId>,
    pub payback: Option<VarId>,
}

impl EconomicVars {
    fn indicator(&self, variable: EconomicVariable) -> Option<VarId> {
        match variable {
            EconomicVariable::Investment => Some(self.investment),
            EconomicVariable::Roi => self.roi,
            EconomicVariable::Payback => self.payback,
        }
    }
}

/// Checks the user constraints against the enabled indicators before any
/// variable is created.
pub fn validate_constraints(
    constraints: &[EconomicConstraint],
    indicators: bool,
) -> Result<(), ModelError> {
    for (i, c) in constraints.iter().enumerate() {
        if !c.enabled {
            continue;
        }
        if !c.value.is_finite() {
            return Err(ModelError::config(
                format!("economic constraint {i}"),
                "value must be finite",
            ));
        }
        if c.variable != EconomicVariable::Investment && !indicators {
            return Err(ModelError::config(
                format!("economic constraint {i}"),
                format!("'{}' requires economic indicators to be enabled", c.variable),
            ));
        }
    }
    Ok(())
}

pub fn build(
    ctx: &ModelContext<'_>,
    constraints: &[EconomicConstraint],
    costs: &CostLedger,
    b: &mut ProgramBuilder,
) -> Result<EconomicVars, ModelError> {
    let indicators = ctx.settings.economic_indicators;
    validate_constraints(constraints, indicators)?;

    let investment = b.nonneg("economics.investment")?;
    let annual = b.free("economics.annual")?;
    let is_investment = b.binary("economics.is_investment")?;

    b.eq("economics.investment_def", investment, costs.total_investment())?;
    b.eq("economics.annual_def", annual, costs.total_annual())?;

    if costs.max_investment <= 0.0 {
        // No asset can be bought, so the floor row already forces the switch off.
        b.fix(is_investment, 0.0);
    }
    let big_m = costs.max_investment.max(INVESTMENT_THRESHOLD);
    b.le(
        "economics.is_investment_floor",
        LinearExpr::term(is_investment, INVESTMENT_THRESHOLD),
        investment,
    )?;
    b.le(
        "economics.is_investment_cap",
        investment,
        LinearExpr::term(is_investment, big_m),
    )?;

    let (roi, payback) = if indicators {
        let reference = ctx.system.annual_cost_reference.unwrap_or(0.0);
        let saving = LinearExpr::constant(reference) - annual;
        let roi = b.free("economics.roi")?;
        let payback = b.free("economics.payback")?;

        // roi·inv = 100·(ref - annual)·is_investment
        b.bilinear(
            "economics.roi_def",
            QuadraticExpr::new()
                .product(1.0, roi, investment)
                .product(-100.0, saving.clone(), is_investment),
            Relation::Eq,
        )?;
        // payback·(ref - annual) = inv
        b.bilinear(
            "economics.payback_def",
            QuadraticExpr::new()
                .product(1.0, payback, saving)
                .plus(LinearExpr::term(investment, -1.0)),
            Relation::Eq,
        )?;
        (Some(roi), Some(payback))
    } else {
        (None, None)
    };

    let vars = EconomicVars {
        investment,
        annual,
        is_investment,
        roi,
        payback,
    };

    for (i, c) in constraints.iter().enumerate().filter(|(_, c)| c.enabled) {
        let Some(var) = vars.indicator(c.variable) else {
            continue;
        };
        let relation = match c.operator {
            Comparison::Le => Relation::Le,
            Comparison::Ge => Relation::Ge,
            Comparison::Eq => Relation::Eq,
        };
        b.constrain(format!("economics.user[{i}]"), var, relation, c.value)?;
    }

    debug!(
        big_m,
        indicators,
        user_constraints = constraints.iter().filter(|c| c.enabled).count(),
        "economic block built"
    );
    Ok(vars)
}
