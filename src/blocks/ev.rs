//! EV smart-charging block.
//!
//! Each session must receive its required energy within its availability
//! window. A binary per session records whether the schedule matches the
//! immediate-charging baseline; the flexibility price is paid only when it
//! does not.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{validate_record, Balance, CostLedger, ModelContext};
use crate::domain::{EvCharging, EvSession, EvStation};
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder, VarId};

#[derive(Debug, Clone)]
pub struct SessionVars {
    pub id: String,
    pub station: String,
    /// Charging power at the steps where the vehicle is available.
    pub power: BTreeMap<usize, VarId>,
    pub matches_baseline: VarId,
    pub flexibility_cost: VarId,
}

#[derive(Debug, Clone, Default)]
pub struct EvVars {
    pub sessions: Vec<SessionVars>,
    /// Energy the fleet is known to need over the horizon (kWh).
    pub energy_kwh: f64,
}

pub fn build(
    ctx: &ModelContext<'_>,
    ev: Option<&EvCharging>,
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<EvVars, ModelError> {
    match ev {
        None => {
            debug!("no ev charging configured");
            Ok(EvVars::default())
        }
        Some(EvCharging::Immediate { loads }) => {
            let mut energy = 0.0;
            for load in loads {
                let context = format!("ev load at '{}'", load.bus);
                let bus = ctx.bus(&context, &load.bus)?;
                ctx.check_series(&context, &load.active_kw)?;
                for (t, kw) in load.active_kw.iter().enumerate() {
                    balance.withdraw(bus, t, *kw);
                    energy += kw * ctx.step_hours;
                }
            }
            Ok(EvVars {
                sessions: Vec::new(),
                energy_kwh: energy,
            })
        }
        Some(EvCharging::Smart { stations, sessions }) => {
            build_smart(ctx, stations, sessions, b, balance, costs)
        }
    }
}

fn build_smart(
    ctx: &ModelContext<'_>,
    stations: &[EvStation],
    sessions: &[EvSession],
    b: &mut ProgramBuilder,
    balance: &mut Balance,
    costs: &mut CostLedger,
) -> Result<EvVars, ModelError> {
    let mut station_bus = HashMap::new();
    for s in stations {
        let context = format!("ev station '{}'", s.id);
        validate_record(&context, s)?;
        let bus = ctx.bus(&context, &s.bus)?;
        if station_bus.insert(s.id.as_str(), (bus, s)).is_some() {
            return Err(ModelError::config(context, "duplicate station id"));
        }
    }

    let mut out = EvVars::default();
    // station id -> step -> session powers
    let mut load: BTreeMap<&str, BTreeMap<usize, LinearExpr>> = BTreeMap::new();

    for s in sessions {
        let context = format!("ev session '{}'", s.id);
        validate_record(&context, s)?;
        let (bus, _) = *station_bus.get(s.station.as_str()).ok_or_else(|| {
            ModelError::config(&context, format!("unknown station '{}'", s.station))
        })?;
        if s.availability.len() != s.baseline_kw.len() {
            return Err(ModelError::SeriesLength {
                context: format!("{context} baseline_kw"),
                expected: s.availability.len(),
                found: s.baseline_kw.len(),
            });
        }
        if s.window().end > ctx.horizon {
            return Err(ModelError::config(
                &context,
                format!(
                    "window ends at step {} beyond the horizon of {}",
                    s.window().end,
                    ctx.horizon
                ),
            ));
        }

        let n = |q: &str| format!("ev.{}.{}", s.id, q);
        let matches_baseline = b.binary(n("matches_baseline"))?;
        let mut power = BTreeMap::new();
        for t in s.window() {
            let cap = s.cap_at(t);
            let base = s.baseline_at(t);
            let p = if cap > 0.0 {
                let v = b.bounded(indexed(&n("power"), t), 0.0, cap)?;
                power.insert(t, v);
                balance.withdraw(bus, t, v);
                load.entry(s.station.as_str())
                    .or_default()
                    .entry(t)
                    .or_default()
                    .add_term(v, 1.0);
                LinearExpr::from(v)
            } else {
                LinearExpr::zero()
            };

            // |P - Pb| <= M(1 - z), with M the largest possible deviation.
            let big_m = base.max(cap - base);
            if big_m <= 0.0 {
                continue;
            }
            let slack = LinearExpr::constant(big_m) - LinearExpr::term(matches_baseline, big_m);
            let deviation = p - base;
            b.le(indexed(&n("baseline_upper"), t), deviation.clone(), slack.clone())?;
            b.ge(indexed(&n("baseline_lower"), t), deviation, -slack)?;
        }

        let delivered: LinearExpr = power
            .values()
            .map(|v| LinearExpr::term(*v, ctx.step_hours))
            .sum();
        b.eq(n("energy"), delivered, s.energy_kwh)?;

        let flexibility_cost = b.nonneg(n("flexibility_cost"))?;
        b.eq(
            n("flexibility_cost_def"),
            flexibility_cost,
            LinearExpr::constant(s.flexibility_price)
                - LinearExpr::term(matches_baseline, s.flexibility_price),
        )?;
        costs.annual.push(flexibility_cost.into());

        out.energy_kwh += s.energy_kwh;
        out.sessions.push(SessionVars {
            id: s.id.clone(),
            station: s.station.clone(),
            power,
            matches_baseline,
            flexibility_cost,
        });
    }

    for (station, steps) in load {
        let (_, params) = station_bus[station];
        for (t, total) in steps {
            b.le(
                indexed(&format!("ev.{station}.station_cap"), t),
                total,
                params.max_kw,
            )?;
        }
    }

    if out.sessions.is_empty() {
        debug!("smart charging enabled with no sessions");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::{context, single_bus, weekday_calendar};
    use crate::config::ModelSettings;
    use crate::domain::system::sample_system;

    fn session(id: &str, start: usize, baseline: Vec<f64>) -> EvSession {
        EvSession {
            id: id.into(),
            station: "cp1".into(),
            start_step: start,
            availability: vec![1.0; baseline.len()],
            energy_kwh: baseline.iter().sum(),
            baseline_kw: baseline,
            max_kw: 7.0,
            flexibility_price: 1.5,
        }
    }

    fn smart(sessions: Vec<EvSession>, station_kw: f64) -> EvCharging {
        EvCharging::Smart {
            stations: vec![EvStation {
                id: "cp1".into(),
                bus: "n1".into(),
                max_kw: station_kw,
            }],
            sessions,
        }
    }

    fn build_program(ev: &EvCharging, horizon: usize) -> (crate::program::Program, EvVars) {
        let cal = weekday_calendar(horizon);
        let sys = sample_system();
        let net = single_bus();
        let settings = ModelSettings::default();
        let ctx = context(&cal, &sys, &settings, &net);
        let mut b = ProgramBuilder::new();
        let vars = build(
            &ctx,
            Some(ev),
            &mut b,
            &mut Balance::new(1, horizon),
            &mut CostLedger::default(),
        )
        .unwrap();
        (b.build(), vars)
    }

    #[test]
    fn baseline_binary_holds_in_both_directions() {
        let ev = smart(vec![session("car", 1, vec![7.0, 3.0, 0.0])], 11.0);
        let (prog, vars) = build_program(&ev, 4);
        let s = &vars.sessions[0];
        let mut x = vec![0.0; prog.num_vars()];

        // Matches the baseline: z = 1, no flexibility cost.
        x[s.power[&1].index()] = 7.0;
        x[s.power[&2].index()] = 3.0;
        x[s.matches_baseline.index()] = 1.0;
        assert!(prog.check(&x, 1e-9).is_empty());

        // Shifted schedule with z = 1 breaks the pair.
        x[s.power[&1].index()] = 3.0;
        x[s.power[&3].index()] = 4.0;
        let rows = prog.check_rows("ev.car.baseline", &x, 1e-9);
        assert!(!rows.is_empty());

        // Same schedule with z = 0 is valid once the price is charged.
        x[s.matches_baseline.index()] = 0.0;
        x[s.flexibility_cost.index()] = 1.5;
        assert!(prog.check(&x, 1e-9).is_empty());
    }

    #[test]
    fn energy_requirement_and_station_cap() {
        let ev = smart(
            vec![session("a", 0, vec![7.0]), session("b", 0, vec![7.0])],
            10.0,
        );
        let (prog, vars) = build_program(&ev, 1);
        let mut x = vec![0.0; prog.num_vars()];
        for s in &vars.sessions {
            x[s.power[&0].index()] = 7.0;
            x[s.matches_baseline.index()] = 1.0;
        }
        let rows: Vec<_> = prog.check(&x, 1e-9).into_iter().map(|v| v.name).collect();
        assert_eq!(rows, vec!["ev.cp1.station_cap[0]"]);
        assert_eq!(vars.energy_kwh, 14.0);
    }

    #[test]
    fn unknown_station_is_reported_with_session_context() {
        let mut s = session("car", 0, vec![1.0]);
        s.station = "ghost".into();
        let cal = weekday_calendar(2);
        let sys = sample_system();
        let net = single_bus();
        let settings = ModelSettings::default();
        let ctx = context(&cal, &sys, &settings, &net);
        let err = build(
            &ctx,
            Some(&smart(vec![s], 5.0)),
            &mut ProgramBuilder::new(),
            &mut Balance::new(1, 2),
            &mut CostLedger::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ev session 'car'"));
    }
}
