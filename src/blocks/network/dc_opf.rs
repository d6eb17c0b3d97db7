//! Linearised (DC) optimal power flow.
//!
//! Voltage magnitudes are taken as 1 p.u. and losses are ignored: each line
//! carries `b·(θ_from − θ_to)` and a bus injects the net of its line flows.

use std::f64::consts::PI;

use super::{require_slack, Injections, NetworkModel, PowerFlow};
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder};

#[derive(Debug, Clone, Copy, Default)]
pub struct DcOpf;

impl PowerFlow for DcOpf {
    fn name(&self) -> &'static str {
        "dc_opf"
    }

    fn constrain(
        &self,
        network: &NetworkModel,
        inj: &Injections,
        b: &mut ProgramBuilder,
    ) -> Result<(), ModelError> {
        let slack = require_slack(network, self.name())?;
        let horizon = inj.horizon();

        let theta = network
            .buses
            .iter()
            .map(|bus| {
                (0..horizon)
                    .map(|t| b.bounded(indexed(&format!("network.{}.theta", bus.id), t), -PI, PI))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        for v in &theta[slack] {
            b.fix(*v, 0.0);
        }

        let mut net_flow = vec![vec![LinearExpr::zero(); horizon]; network.num_buses()];
        for line in &network.lines {
            let susceptance = line.dc_susceptance();
            let (lo, hi) = line
                .rating
                .map(|r| (-r, r))
                .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
            for t in 0..horizon {
                let flow = b.bounded(indexed(&format!("network.{}.flow", line.id), t), lo, hi)?;
                b.eq(
                    indexed(&format!("network.{}.dc_flow", line.id), t),
                    flow,
                    (LinearExpr::from(theta[line.from][t]) - theta[line.to][t]) * susceptance,
                )?;
                net_flow[line.from][t].add_term(flow, 1.0);
                net_flow[line.to][t].add_term(flow, -1.0);
            }
        }

        for (i, bus) in network.buses.iter().enumerate() {
            for t in 0..horizon {
                b.eq(
                    indexed(&format!("network.{}.dc_injection", bus.id), t),
                    inj.active[i][t],
                    net_flow[i][t].clone(),
                )?;
            }
        }
        for t in 0..horizon {
            let q: LinearExpr = inj.reactive.iter().map(|bus| bus[t]).sum();
            b.eq(indexed("network.reactive_sum", t), q, 0.0)?;
        }
        Ok(())
    }
}
