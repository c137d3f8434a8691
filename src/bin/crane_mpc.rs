// Linearized crane pendulum MPC solved locally, plotted and animated
//
// usage: crane_mpc [config.toml]

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crane_control::config::CraneConfig;
use crane_control::pipeline::run_local_pipeline;
use crane_control::utils::GnuplotRenderer;
use crane_control::CraneResult;

fn run(config_path: Option<PathBuf>) -> CraneResult<()> {
    let config = CraneConfig::load(config_path.as_deref())?;
    let mut renderer = GnuplotRenderer::new(config.plot.clone());

    let run = run_local_pipeline(&config.mpc, &config.animation, &mut renderer)?;
    info!(
        objective = run.solution.objective,
        frames = run.animation.len(),
        output = %run.animation.output.display(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(std::env::args_os().nth(1).map(PathBuf::from)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
