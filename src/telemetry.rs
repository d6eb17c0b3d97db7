use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, TelemetryConfig};
use crate::program::Program;

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level; a second call (tests, embedding) is a no-op.
pub fn init_tracing(cfg: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},good_lp=warn", cfg.level)));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match cfg.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
}

/// Logs variable and row counts per block namespace.
pub fn log_program_shape(program: &Program) {
    for block in ["pv", "battery", "grid", "ev", "network", "balance", "economics"] {
        let (vars, rows) = program.block_size(&format!("{block}."));
        if vars + rows > 0 {
            info!(block, vars, rows, "block size");
        }
    }
    info!(
        vars = program.num_vars(),
        rows = program.num_constraints(),
        integers = program.has_integers(),
        "program assembled"
    );
}
