//
// Remote solve of the nonlinear crane pendulum, plotted as a time history
//

use tracing::{error, info};

use crate::common::{CraneResult, HistoryLayout, SolutionTable, TrajectoryRenderer, Transport};
use crate::config::{RemoteConfig, UploadMode};
use crate::model::crane::{crane_pendulum_model, CraneParams, CraneTrajectory};
use crate::remote::{DataTable, RemoteSession, VariableClass};

/// Everything a remote run produced
#[derive(Debug, Clone)]
pub struct RemoteRun {
    /// Status text returned by the server's solve command
    pub solver_output: String,
    pub solution: SolutionTable,
    pub trajectory: CraneTrajectory,
}

/// Upload the crane model and data, solve on the server and plot the result.
///
/// Fails before anything is drawn if the solution cannot be retrieved.
pub fn run_remote_pipeline<T, R>(
    config: &RemoteConfig,
    params: &CraneParams,
    data: &DataTable,
    transport: T,
    renderer: &mut R,
) -> CraneResult<RemoteRun>
where
    T: Transport,
    R: TrajectoryRenderer,
{
    config.validate()?;
    let (model, handles) = crane_pendulum_model(params, config.control_bounds)?;
    let document = model.to_document();

    let mut session = RemoteSession::new(transport, &config.app)?;
    info!(server = %config.server, app = session.app(), "starting remote session");
    session.clear()?;
    match config.upload {
        UploadMode::Document => session.load_model(&document)?,
        UploadMode::Lines => {
            session.load_model_lines(document.lines())?;
        }
    }
    session.load_data(data)?;

    session.set_option("nlc.imode", config.imode)?;
    for control in model.controls() {
        session.info(VariableClass::Mv, control.name())?;
        session.set_option(&format!("{}.status", control.name()), 1)?;
    }

    let solver_output = session.solve()?;
    info!("server output:\n{}", solver_output.trim_end());

    let solution = match session.solution() {
        Ok(table) => table,
        Err(e) => {
            error!(error = %e, "solution unavailable, nothing to plot");
            return Err(e);
        }
    };
    info!(samples = solution.len(), "solution retrieved");

    if let Some(path) = &config.solution_file {
        solution.save(path)?;
        info!(path = %path.display(), "solution saved");
    }

    let trajectory = CraneTrajectory::from_solution(&solution, &handles)?;
    renderer.render_history(&trajectory, HistoryLayout::Stacked)?;

    Ok(RemoteRun {
        solver_output,
        solution,
        trajectory,
    })
}
