//! Common traits defining the seams between model, solvers and output

use crate::common::error::CraneResult;
use crate::model::crane::CraneTrajectory;
use crate::utils::animation::Animation;

/// Trait for plant motion models
pub trait MotionModel {
    /// State type
    type State;
    /// Control type
    type Control;

    /// Propagate state forward in time
    fn propagate(&self, state: &Self::State, control: &Self::Control, dt: f64) -> Self::State;
}

/// Command channel to a remote optimization server.
///
/// `send` issues one command for an application and returns the server's
/// textual reply. `fetch` downloads a named resource (for example
/// `results.csv`) produced for that application.
pub trait Transport {
    fn send(&mut self, app: &str, command: &str) -> CraneResult<String>;

    fn fetch(&mut self, app: &str, resource: &str) -> CraneResult<String>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, app: &str, command: &str) -> CraneResult<String> {
        (**self).send(app, command)
    }

    fn fetch(&mut self, app: &str, resource: &str) -> CraneResult<String> {
        (**self).fetch(app, resource)
    }
}

/// Panel arrangement for trajectory history plots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLayout {
    /// Four rows sharing one time axis
    Stacked,
    /// Two by two grid, each panel with its own time label
    Grid,
}

/// Trait for anything that can present solved trajectories
pub trait TrajectoryRenderer {
    /// Draw the four-panel time history
    fn render_history(&mut self, trajectory: &CraneTrajectory, layout: HistoryLayout)
        -> CraneResult<()>;

    /// Draw and persist a precomputed animation
    fn render_animation(&mut self, animation: &Animation) -> CraneResult<()>;
}
