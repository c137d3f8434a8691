// Crane pendulum solved on a remote APM server, plotted as a time history
//
// usage: crane_remote [config.toml]

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use crane_control::config::CraneConfig;
use crane_control::pipeline::run_remote_pipeline;
use crane_control::remote::{DataTable, HttpTransport};
use crane_control::utils::GnuplotRenderer;
use crane_control::CraneResult;

fn run(config_path: Option<PathBuf>) -> CraneResult<()> {
    let config = CraneConfig::load(config_path.as_deref())?;
    let data = DataTable::from_path(&config.remote.data_file)?;
    let transport = HttpTransport::new(&config.remote.server);
    let mut renderer = GnuplotRenderer::new(config.plot.clone());

    let run = run_remote_pipeline(&config.remote, &config.physics, &data, transport, &mut renderer)?;
    println!("{}", run.solver_output);
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
