//! crane_control - optimal control of a crane pendulum
//!
//! A cart on a rail carries a suspended load and is driven by a horizontal
//! force. The crate declares the dynamics as a model, solves the control
//! problem either on a remote APM server or with a local solver, and plots
//! or animates the result.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Model, solvers and pipelines
pub mod model;
pub mod simulation;
pub mod control;
pub mod remote;
pub mod pipeline;

// Re-export common types for convenience
pub use common::{CraneState, Point2D, SolutionTable, TimeGrid};
pub use common::{HistoryLayout, MotionModel, TrajectoryRenderer, Transport};
pub use common::{CraneError, CraneResult};
