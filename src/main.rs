use std::sync::Arc;

use anyhow::{Context, Result};
use microgrid_planner::config::Config;
use microgrid_planner::domain::ModelInput;
use microgrid_planner::results::SolutionReport;
use microgrid_planner::telemetry::{init_tracing, log_program_shape};
use microgrid_planner::{assemble, solver};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    init_tracing(&cfg.telemetry);

    let raw = tokio::fs::read_to_string(&cfg.io.input)
        .await
        .with_context(|| format!("reading scenario {}", cfg.io.input.display()))?;
    let input: ModelInput = serde_json::from_str(&raw)
        .with_context(|| format!("parsing scenario {}", cfg.io.input.display()))?;
    info!(
        input = %cfg.io.input.display(),
        horizon = input.horizon(),
        formulation = %cfg.model.formulation,
        "scenario loaded"
    );

    let model = assemble(&input, &cfg.model)?;
    log_program_shape(&model.program);

    let program = Arc::new(model.program);
    let backend = solver::backend_by_name(&cfg.solver.backend)?;
    let outcome = solver::submit(program.clone(), backend, cfg.solver.options()).await?;

    let report = SolutionReport::new(
        &program,
        &model.layout,
        &input.system,
        &outcome,
        cfg.solver.feasibility_tolerance,
    );
    let json = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(&cfg.io.output, json)
        .await
        .with_context(|| format!("writing report {}", cfg.io.output.display()))?;

    match outcome.into_optimal() {
        Ok(_) => {
            info!(output = %cfg.io.output.display(), objective = ?report.objective, "done");
            Ok(())
        }
        Err(e) => {
            warn!(output = %cfg.io.output.display(), "no optimal solution");
            Err(e.into())
        }
    }
}
