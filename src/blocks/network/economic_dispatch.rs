//! Copper-plate network: injections only have to cancel out.

use super::{Injections, NetworkModel, PowerFlow};
use crate::error::ModelError;
use crate::program::builder::indexed;
use crate::program::{LinearExpr, ProgramBuilder};

#[derive(Debug, Clone, Copy, Default)]
pub struct EconomicDispatch;

impl PowerFlow for EconomicDispatch {
    fn name(&self) -> &'static str {
        "economic_dispatch"
    }

    fn constrain(
        &self,
        _network: &NetworkModel,
        inj: &Injections,
        b: &mut ProgramBuilder,
    ) -> Result<(), ModelError> {
        for t in 0..inj.horizon() {
            let p: LinearExpr = inj.active.iter().map(|bus| bus[t]).sum();
            let q: LinearExpr = inj.reactive.iter().map(|bus| bus[t]).sum();
            b.eq(indexed("network.active_sum", t), p, 0.0)?;
            b.eq(indexed("network.reactive_sum", t), q, 0.0)?;
        }
        Ok(())
    }
}
