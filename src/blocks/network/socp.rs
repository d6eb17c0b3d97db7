//! AC optimal power flow in the "c,s" second-order cone form.
//!
//! For buses `i`, `j` the products `Vi·Vj·cos θij` and `Vi·Vj·sin θij` are
//! represented by `c[ij]` and `s[ij]`, and `|Vi|²` by `c[ii]`. Line flows
//! are linear in those; the only nonlinear row per bus pair is
//! `c[ij]² + s[ij]² (≤ | =) c[ii]·c[jj]`.

use std::collections::BTreeMap;

use super::{require_slack, Coupling, Injections, NetworkModel, PowerFlow, PuLine};
use crate::domain::BusKind;
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder, Relation, VarId};

#[derive(Debug, Clone, Copy, Default)]
pub struct AcSocp {
    pub coupling: Coupling,
    /// Adds `P² + Q² (≤ | =) c[ii]·ℓ` with `ℓ ≤ I_max²` on rated lines.
    pub current_limits: bool,
}

/// Coefficients of a line's flows in terms of `(c_ff, c_tt, c_ft, s_ft)`,
/// where `c_ft`/`s_ft` are oriented from the line's `from` bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchCoefficients {
    /// Nodal admittance entry `G + jB = -y_series`.
    pub g: f64,
    pub b: f64,
    pub half_shunt: f64,
}

impl BranchCoefficients {
    pub fn of(line: &PuLine) -> Self {
        let y = line.series_admittance();
        Self {
            g: -y.re,
            b: -y.im,
            half_shunt: line.b / 2.0,
        }
    }

    /// `(P_ft, Q_ft, P_tf, Q_tf)` at numeric values.
    pub fn flows(&self, c_ff: f64, c_tt: f64, c_ft: f64, s_ft: f64) -> (f64, f64, f64, f64) {
        let Self { g, b, half_shunt } = *self;
        (
            g * (c_ft - c_ff) + b * s_ft,
            g * s_ft - b * (c_ft - c_ff) - half_shunt * c_ff,
            g * (c_ft - c_tt) - b * s_ft,
            -g * s_ft - b * (c_ft - c_tt) - half_shunt * c_tt,
        )
    }

    fn flow_exprs(
        &self,
        c_ff: VarId,
        c_tt: VarId,
        c_ft: &LinearExpr,
        s_ft: &LinearExpr,
    ) -> [LinearExpr; 4] {
        let Self { g, b, half_shunt } = *self;
        let dff = c_ft.clone() - c_ff;
        let dtt = c_ft.clone() - c_tt;
        [
            dff.clone() * g + s_ft.clone() * b,
            s_ft.clone() * g - dff * b - LinearExpr::term(c_ff, half_shunt),
            dtt.clone() * g - s_ft.clone() * b,
            s_ft.clone() * (-g) - dtt * b - LinearExpr::term(c_tt, half_shunt),
        ]
    }
}

impl AcSocp {
    fn relation(&self) -> Relation {
        match self.coupling {
            Coupling::Relaxed => Relation::Le,
            Coupling::Exact => Relation::Eq,
        }
    }
}

impl PowerFlow for AcSocp {
    fn name(&self) -> &'static str {
        "ac_socp"
    }

    fn constrain(
        &self,
        network: &NetworkModel,
        inj: &Injections,
        b: &mut ProgramBuilder,
    ) -> Result<(), ModelError> {
        let slack = require_slack(network, self.name())?;
        let horizon = inj.horizon();
        let relation = self.relation();

        // Diagonal terms |V|²
        let diag = network
            .buses
            .iter()
            .map(|bus| {
                (0..horizon)
                    .map(|t| {
                        b.bounded(
                            indexed(&format!("network.{}.c", bus.id), t),
                            bus.vmin * bus.vmin,
                            bus.vmax * bus.vmax,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        for v in &diag[slack] {
            b.fix(*v, 1.0);
        }

        // One (c, s) pair per connected bus pair, oriented low index -> high.
        let mut pairs: BTreeMap<(usize, usize), (Vec<VarId>, Vec<VarId>)> = BTreeMap::new();
        for line in &network.lines {
            let key = (line.from.min(line.to), line.from.max(line.to));
            if pairs.contains_key(&key) {
                continue;
            }
            let (i, j) = key;
            let bound = network.buses[i].vmax * network.buses[j].vmax;
            let label = format!("network.{}-{}", network.buses[i].id, network.buses[j].id);
            let c = (0..horizon)
                .map(|t| b.bounded(indexed(&format!("{label}.c"), t), -bound, bound))
                .collect::<Result<Vec<_>, _>>()?;
            let s = (0..horizon)
                .map(|t| b.bounded(indexed(&format!("{label}.s"), t), -bound, bound))
                .collect::<Result<Vec<_>, _>>()?;
            for t in 0..horizon {
                b.rotated_cone(
                    indexed(&format!("{label}.coupling"), t),
                    vec![c[t].into(), s[t].into()],
                    diag[i][t],
                    diag[j][t],
                    relation,
                )?;
            }
            pairs.insert(key, (c, s));
        }

        let n = network.num_buses();
        let mut p_out = vec![vec![LinearExpr::zero(); horizon]; n];
        let mut q_out = vec![vec![LinearExpr::zero(); horizon]; n];

        for line in &network.lines {
            let coeffs = BranchCoefficients::of(line);
            let (f, to) = (line.from, line.to);
            let (c, s) = &pairs[&(f.min(to), f.max(to))];
            let sign = if f < to { 1.0 } else { -1.0 };
            let lim_sq = line.current_rating.map(|i| i * i);

            for t in 0..horizon {
                let c_ft = LinearExpr::from(c[t]);
                let s_ft = LinearExpr::term(s[t], sign);
                let [p_ft, q_ft, p_tf, q_tf] =
                    coeffs.flow_exprs(diag[f][t], diag[to][t], &c_ft, &s_ft);

                if let Some(rating) = line.rating {
                    for (side, flow) in [("from", &p_ft), ("to", &p_tf)] {
                        let name = format!("network.{}.rating_{side}", line.id);
                        b.le(indexed(&format!("{name}_upper"), t), flow.clone(), rating)?;
                        b.ge(indexed(&format!("{name}_lower"), t), flow.clone(), -rating)?;
                    }
                }

                if let (true, Some(lim_sq)) = (self.current_limits, lim_sq) {
                    for (side, bus, p, q) in [("from", f, &p_ft, &q_ft), ("to", to, &p_tf, &q_tf)] {
                        let name = format!("network.{}.current_sq_{side}", line.id);
                        let l = b.bounded(indexed(&name, t), 0.0, lim_sq)?;
                        b.rotated_cone(
                            indexed(&format!("{name}_def"), t),
                            vec![p.clone(), q.clone()],
                            diag[bus][t],
                            l,
                            relation,
                        )?;
                    }
                }

                p_out[f][t] += p_ft;
                q_out[f][t] += q_ft;
                p_out[to][t] += p_tf;
                q_out[to][t] += q_tf;
            }
        }

        for (i, bus) in network.buses.iter().enumerate() {
            for t in 0..horizon {
                b.eq(
                    indexed(&format!("network.{}.ac_active", bus.id), t),
                    inj.active[i][t],
                    p_out[i][t].clone(),
                )?;
                if bus.kind == BusKind::Dc {
                    b.eq(
                        indexed(&format!("network.{}.dc_bus_reactive", bus.id), t),
                        inj.reactive[i][t],
                        0.0,
                    )?;
                } else {
                    b.eq(
                        indexed(&format!("network.{}.ac_reactive", bus.id), t),
                        inj.reactive[i][t],
                        q_out[i][t].clone(),
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use num_complex::Complex64;

    use super::super::fixtures::two_bus;
    use super::*;
    use crate::program::{Curvature, Program};

    const V2: f64 = 0.98;
    const THETA2: f64 = -0.02;

    fn program(coupling: Coupling, current_limits: bool) -> (NetworkModel, Injections, Program) {
        let mut data = two_bus();
        data.lines[0].current_rating_a = Some(1000.0);
        let net = NetworkModel::from_data(&data).unwrap();
        let mut b = ProgramBuilder::new();
        let inj = Injections::new(&net, 1, &mut b).unwrap();
        AcSocp {
            coupling,
            current_limits,
        }
        .constrain(&net, &inj, &mut b)
        .unwrap();
        (net, inj, b.build())
    }

    /// Assignment for the operating point `(V2, THETA2)`, with `c`/`s`
    /// scaled by `shrink` (1.0 is the exact AC point).
    fn assignment(net: &NetworkModel, inj: &Injections, prog: &Program, shrink: f64) -> Vec<f64> {
        let c11 = 1.0;
        let c22 = V2 * V2;
        let c12 = V2 * (0.0 - THETA2).cos() * shrink;
        let s12 = V2 * (0.0 - THETA2).sin() * shrink;
        let (p12, q12, p21, q21) = BranchCoefficients::of(&net.lines[0]).flows(c11, c22, c12, s12);

        let mut x = vec![0.0; prog.num_vars()];
        let mut set = |name: &str, v: f64| x[prog.find(name).unwrap().index()] = v;
        set("network.n1.c[0]", c11);
        set("network.n2.c[0]", c22);
        set("network.n1-n2.c[0]", c12);
        set("network.n1-n2.s[0]", s12);
        if prog.find("network.l12.current_sq_from[0]").is_some() {
            set("network.l12.current_sq_from[0]", (p12 * p12 + q12 * q12) / c11);
            set("network.l12.current_sq_to[0]", (p21 * p21 + q21 * q21) / c22);
        }
        x[inj.active[0][0].index()] = p12;
        x[inj.reactive[0][0].index()] = q12;
        x[inj.active[1][0].index()] = p21;
        x[inj.reactive[1][0].index()] = q21;
        x
    }

    #[test]
    fn flow_coefficients_match_complex_power() {
        let (net, _, _) = program(Coupling::Exact, false);
        let line = &net.lines[0];
        let v1 = Complex64::new(1.0, 0.0);
        let v2 = Complex64::from_polar(V2, THETA2);
        let y = line.series_admittance();
        let ysh = Complex64::new(0.0, line.b / 2.0);
        let s12 = v1 * (y * (v1 - v2) + ysh * v1).conj();
        let s21 = v2 * (y * (v2 - v1) + ysh * v2).conj();

        let (p12, q12, p21, q21) = BranchCoefficients::of(line).flows(
            1.0,
            V2 * V2,
            V2 * THETA2.cos(),
            V2 * (-THETA2).sin(),
        );
        assert!((p12 - s12.re).abs() < 1e-12);
        assert!((q12 - s12.im).abs() < 1e-12);
        assert!((p21 - s21.re).abs() < 1e-12);
        assert!((q21 - s21.im).abs() < 1e-12);
        // Losses are positive.
        assert!(p12 + p21 > 0.0);
    }

    #[test]
    fn exact_coupling_holds_at_known_voltages() {
        let (net, inj, prog) = program(Coupling::Exact, true);
        let x = assignment(&net, &inj, &prog, 1.0);
        assert!(prog.check(&x, 1e-9).is_empty(), "{:?}", prog.check(&x, 1e-9));
        assert_eq!(
            prog.constraint("network.n1-n2.coupling[0]").unwrap().curvature,
            Curvature::Nonconvex
        );
    }

    #[test]
    fn relaxed_coupling_keeps_bus_balance_inside_the_cone() {
        let (net, inj, relaxed) = program(Coupling::Relaxed, false);
        let x = assignment(&net, &inj, &relaxed, 0.995);
        assert!(relaxed.check(&x, 1e-9).is_empty());
        assert!(relaxed.check_rows("network.n1.ac_", &x, 1e-12).is_empty());
        assert!(relaxed.check_rows("network.n2.ac_", &x, 1e-12).is_empty());

        // The same interior point is rejected by the exact surface.
        let (_, inj, exact) = program(Coupling::Exact, false);
        let x = assignment(&net, &inj, &exact, 0.995);
        let v = exact.check(&x, 1e-9);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].name, "network.n1-n2.coupling[0]");
    }

    #[test]
    fn slack_voltage_is_pinned() {
        let (_, _, prog) = program(Coupling::Relaxed, false);
        let v = prog.variable(prog.find("network.n1.c[0]").unwrap());
        assert_eq!((v.lower, v.upper), (1.0, 1.0));
        let v = prog.variable(prog.find("network.n2.c[0]").unwrap());
        assert!((v.lower - 0.81).abs() < 1e-12 && (v.upper - 1.21).abs() < 1e-12);
    }
}
