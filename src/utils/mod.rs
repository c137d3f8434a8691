//! Animation geometry and gnuplot rendering

pub mod animation;
pub mod visualization;

pub use animation::{Animation, Frame, FrameGeometry, Scene};
pub use visualization::{colors, history_panels, GnuplotRenderer, Marks, SeriesStyle};
