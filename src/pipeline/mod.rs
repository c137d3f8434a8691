//! End-to-end runs: remote solve and plot, local MPC solve and animate

pub mod local;
pub mod remote;

pub use local::{run_local_pipeline, LocalRun};
pub use remote::{run_remote_pipeline, RemoteRun};

#[cfg(test)]
pub(crate) mod recording {
    use crate::common::{CraneResult, HistoryLayout, TrajectoryRenderer};
    use crate::model::crane::CraneTrajectory;
    use crate::utils::animation::Animation;

    /// Remembers what it was asked to draw
    #[derive(Debug, Default)]
    pub struct RecordingRenderer {
        pub histories: Vec<(usize, HistoryLayout)>,
        pub animations: Vec<usize>,
    }

    impl TrajectoryRenderer for RecordingRenderer {
        fn render_history(
            &mut self,
            trajectory: &CraneTrajectory,
            layout: HistoryLayout,
        ) -> CraneResult<()> {
            self.histories.push((trajectory.len(), layout));
            Ok(())
        }

        fn render_animation(&mut self, animation: &Animation) -> CraneResult<()> {
            self.animations.push(animation.len());
            Ok(())
        }
    }
}
