//
// Local MPC of the linearized crane: solve, plot, animate
//

use tracing::info;

use crate::common::{CraneResult, HistoryLayout, TrajectoryRenderer};
use crate::config::{AnimationConfig, MpcConfig};
use crate::control::mpc::{LocalSolution, LocalSolver};
use crate::model::crane::{linearized_crane_model, CraneTrajectory};
use crate::utils::animation::Animation;

#[derive(Debug, Clone)]
pub struct LocalRun {
    pub solution: LocalSolution,
    pub trajectory: CraneTrajectory,
    pub animation: Animation,
}

pub fn run_local_pipeline<R: TrajectoryRenderer>(
    mpc: &MpcConfig,
    animation: &AnimationConfig,
    renderer: &mut R,
) -> CraneResult<LocalRun> {
    let (model, handles) = linearized_crane_model(mpc)?;

    let mut solver = LocalSolver::new();
    solver.set_option("imode", mpc.imode)?;
    solver.set_option("max_iter", mpc.max_iter)?;
    let solution = solver.solve(&model)?;
    info!(
        objective = solution.objective,
        iterations = solution.iterations,
        "crane MPC solved"
    );

    let trajectory = CraneTrajectory::from_solution(&solution.table, &handles)?;
    renderer.render_history(&trajectory, HistoryLayout::Grid)?;

    let animation = Animation::from_trajectory(&trajectory, animation)?;
    renderer.render_animation(&animation)?;

    Ok(LocalRun {
        solution,
        trajectory,
        animation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CraneError;
    use crate::pipeline::recording::RecordingRenderer;

    #[test]
    fn test_solve_plot_and_animate() {
        let mpc = MpcConfig {
            samples: 41,
            ..MpcConfig::default()
        };
        let mut renderer = RecordingRenderer::default();
        let run = run_local_pipeline(&mpc, &AnimationConfig::default(), &mut renderer).unwrap();

        assert_eq!(renderer.histories, vec![(41, HistoryLayout::Grid)]);
        assert_eq!(renderer.animations, vec![41]);
        assert_eq!(run.animation.scene.start_position, -1.0);
        let last = run.animation.frames[40];
        assert!(last.pivot.x.abs() < 0.05);
        assert!(run.trajectory.y[40].abs() < 0.05);
    }

    #[test]
    fn test_unsupported_mode_fails_before_rendering() {
        let mpc = MpcConfig {
            imode: 3,
            ..MpcConfig::default()
        };
        let mut renderer = RecordingRenderer::default();
        let err = run_local_pipeline(&mpc, &AnimationConfig::default(), &mut renderer).unwrap_err();
        assert!(matches!(err, CraneError::InvalidParameter(_)));
        assert!(renderer.histories.is_empty());
    }
}
