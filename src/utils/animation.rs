//
// Cart and load positions for every sample of a solved trajectory
//

use std::path::PathBuf;
use std::time::Duration;

use crate::common::{CraneError, CraneResult, Point2D};
use crate::config::AnimationConfig;
use crate::model::crane::CraneTrajectory;

/// Display geometry, independent of the physical rod length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub rod_length: f64,
    /// Bob marker distance as a fraction of the rod length
    pub bob_offset: f64,
    /// Cart marker height above the pivot
    pub cart_offset: f64,
}

impl FrameGeometry {
    pub fn from_config(config: &AnimationConfig) -> Self {
        Self {
            rod_length: config.rod_length,
            bob_offset: config.bob_offset,
            cart_offset: config.cart_offset,
        }
    }

    pub fn frame(&self, time: f64, position: f64, theta: f64) -> Frame {
        let pivot = Point2D::new(position, 0.0);
        Frame {
            time,
            pivot,
            cart: Point2D::new(pivot.x, pivot.y + self.cart_offset),
            rod_end: pendulum_end(pivot, theta, self.rod_length),
            bob: pendulum_end(pivot, theta, self.bob_offset * self.rod_length),
        }
    }
}

/// Point at `length` along the rod, `theta = 0` hanging straight down
pub fn pendulum_end(pivot: Point2D, theta: f64, length: f64) -> Point2D {
    Point2D::new(pivot.x + length * theta.sin(), pivot.y - length * theta.cos())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub time: f64,
    pub pivot: Point2D,
    pub cart: Point2D,
    pub rod_end: Point2D,
    pub bob: Point2D,
}

impl Frame {
    pub fn caption(&self) -> String {
        format!("time = {:.1}s", self.time)
    }
}

/// Static parts of the animation scene
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub rail_height: f64,
    /// Dotted marker at the initial cart position
    pub start_position: f64,
    pub objective_position: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub frames: Vec<Frame>,
    pub scene: Scene,
    pub interval: Duration,
    pub fps: u32,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Animation {
    /// One frame per trajectory sample
    pub fn from_trajectory(trajectory: &CraneTrajectory, config: &AnimationConfig) -> CraneResult<Self> {
        config.validate()?;
        if trajectory.is_empty() {
            return Err(CraneError::VisualizationError(
                "cannot animate an empty trajectory".to_string(),
            ));
        }
        let geometry = FrameGeometry::from_config(config);
        let frames = (0..trajectory.len())
            .map(|k| geometry.frame(trajectory.time[k], trajectory.y[k], trajectory.theta[k]))
            .collect();

        Ok(Self {
            frames,
            scene: Scene {
                x_range: config.x_range,
                y_range: config.y_range,
                rail_height: config.rail_height,
                start_position: trajectory.y[0],
                objective_position: config.objective_position,
            },
            interval: Duration::from_millis(config.interval_ms),
            fps: config.fps,
            output: config.output.clone(),
            width: config.width,
            height: config.height,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Display time at the configured interval
    pub fn duration(&self) -> Duration {
        self.interval * self.frames.len() as u32
    }

    /// Per-frame delay of the exported file in hundredths of a second
    pub fn export_delay(&self) -> u32 {
        ((100.0 / self.fps as f64).round() as u32).max(1)
    }
}
