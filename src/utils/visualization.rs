//! Visualization of crane trajectories
//!
//! Time histories and the cart/pendulum animation, drawn with gnuplot.

use std::path::Path;

use gnuplot::{
    AutoOption, AxesCommon, Caption, Color, Coordinate, DashType, Figure, LineStyle, LineWidth,
    PointSize, PointSymbol,
};
use tracing::info;

use crate::common::{CraneError, CraneResult, HistoryLayout, TrajectoryRenderer};
use crate::config::PlotConfig;
use crate::model::crane::CraneTrajectory;
use crate::utils::animation::Animation;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "black";
    pub const RED: &str = "red";
    pub const GREEN: &str = "green";
    pub const BLUE: &str = "blue";
    pub const MAGENTA: &str = "magenta";
    pub const YELLOW: &str = "#D4B000";
    pub const CYAN: &str = "cyan";
    pub const ORANGE: &str = "orange";

    // Semantic colors
    pub const RAIL: &str = BLACK;
    pub const CRANE: &str = ORANGE;
}

/// How a series is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marks {
    Solid,
    Dashed,
    Dotted,
    LinePoints,
    Points,
}

/// Style for one plotted series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStyle {
    pub caption: String,
    pub color: String,
    pub line_width: f64,
    pub marks: Marks,
}

impl SeriesStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            caption: caption.to_string(),
            color: color.to_string(),
            line_width: 2.0,
            marks: Marks::Solid,
        }
    }

    pub fn with_marks(mut self, marks: Marks) -> Self {
        self.marks = marks;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series<'a> {
    pub values: &'a [f64],
    pub style: SeriesStyle,
}

/// One subplot of a time-history figure
#[derive(Debug, Clone, PartialEq)]
pub struct Panel<'a> {
    pub y_label: &'static str,
    pub x_label: Option<&'static str>,
    pub series: Vec<Series<'a>>,
}

/// Rows and columns of the figure for `layout`
pub fn layout_shape(layout: HistoryLayout) -> (usize, usize) {
    match layout {
        HistoryLayout::Stacked => (4, 1),
        HistoryLayout::Grid => (2, 2),
    }
}

/// Panels in drawing order (row by row)
pub fn history_panels(trajectory: &CraneTrajectory, layout: HistoryLayout) -> Vec<Panel<'_>> {
    match layout {
        HistoryLayout::Stacked => vec![
            Panel {
                y_label: "Force on cart",
                x_label: None,
                series: vec![series(&trajectory.u, SeriesStyle::new(colors::RED, "u"))],
            },
            Panel {
                y_label: "Cart position",
                x_label: None,
                series: vec![series(
                    &trajectory.y,
                    SeriesStyle::new(colors::BLUE, "y").with_marks(Marks::Dashed),
                )],
            },
            Panel {
                y_label: "Cart velocity",
                x_label: None,
                series: vec![series(
                    &trajectory.v,
                    SeriesStyle::new(colors::GREEN, "v").with_marks(Marks::Dotted),
                )],
            },
            Panel {
                y_label: "Angle & angular velocity",
                x_label: Some("Time [s]"),
                series: vec![
                    series(
                        &trajectory.theta,
                        SeriesStyle::new(colors::MAGENTA, "theta").with_marks(Marks::LinePoints),
                    ),
                    series(
                        &trajectory.q,
                        SeriesStyle::new(colors::BLACK, "q").with_marks(Marks::Points),
                    ),
                ],
            },
        ],
        HistoryLayout::Grid => vec![
            Panel {
                y_label: "Force",
                x_label: Some("Time"),
                series: vec![series(&trajectory.u, SeriesStyle::new(colors::MAGENTA, "u"))],
            },
            Panel {
                y_label: "Velocity",
                x_label: Some("Time"),
                series: vec![series(&trajectory.v, SeriesStyle::new(colors::GREEN, "v"))],
            },
            Panel {
                y_label: "Position",
                x_label: Some("Time"),
                series: vec![series(&trajectory.y, SeriesStyle::new(colors::RED, "y"))],
            },
            Panel {
                y_label: "Angle",
                x_label: Some("Time"),
                series: vec![
                    series(&trajectory.theta, SeriesStyle::new(colors::YELLOW, "theta")),
                    series(&trajectory.q, SeriesStyle::new(colors::CYAN, "q")),
                ],
            },
        ],
    }
}

fn series(values: &[f64], style: SeriesStyle) -> Series<'_> {
    Series { values, style }
}

/// Draws to a gnuplot window, or to PNG when an output file is configured
pub struct GnuplotRenderer {
    plot: PlotConfig,
}

impl GnuplotRenderer {
    pub fn new(plot: PlotConfig) -> Self {
        Self { plot }
    }
}

impl TrajectoryRenderer for GnuplotRenderer {
    fn render_history(&mut self, trajectory: &CraneTrajectory, layout: HistoryLayout) -> CraneResult<()> {
        if trajectory.is_empty() {
            return Err(CraneError::VisualizationError(
                "cannot plot an empty trajectory".to_string(),
            ));
        }
        let t0 = trajectory.time[0];
        let t1 = trajectory.time[trajectory.len() - 1];
        let (rows, columns) = layout_shape(layout);

        let mut fg = Figure::new();
        fg.set_multiplot_layout(rows, columns);
        for panel in history_panels(trajectory, layout) {
            let axes = fg.axes2d();
            axes.set_y_label(panel.y_label, &[])
                .set_x_range(AutoOption::Fix(t0), AutoOption::Fix(t1))
                .set_x_grid(true)
                .set_y_grid(true);
            if let Some(label) = panel.x_label {
                axes.set_x_label(label, &[]);
            }
            for s in &panel.series {
                let mut options = vec![
                    Caption(s.style.caption.as_str()),
                    Color(s.style.color.as_str()),
                    LineWidth(s.style.line_width),
                ];
                match s.style.marks {
                    Marks::Solid => {
                        axes.lines(&trajectory.time, s.values, &options);
                    }
                    Marks::Dashed | Marks::Dotted => {
                        let dash = if s.style.marks == Marks::Dashed {
                            DashType::Dash
                        } else {
                            DashType::Dot
                        };
                        options.push(LineStyle(dash));
                        axes.lines(&trajectory.time, s.values, &options);
                    }
                    Marks::LinePoints => {
                        options.push(PointSymbol('O'));
                        options.push(PointSize(0.5));
                        axes.lines_points(&trajectory.time, s.values, &options);
                    }
                    Marks::Points => {
                        options.push(PointSymbol('O'));
                        options.push(PointSize(0.3));
                        axes.points(&trajectory.time, s.values, &options);
                    }
                }
            }
        }

        match &self.plot.output {
            Some(path) => {
                ensure_parent(path)?;
                fg.save_to_png(&*path.to_string_lossy(), self.plot.width, self.plot.height)
                    .map_err(|e| CraneError::VisualizationError(e.to_string()))?;
                info!(path = %path.display(), "history plot saved");
            }
            None => {
                fg.show()
                    .map_err(|e| CraneError::VisualizationError(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn render_animation(&mut self, animation: &Animation) -> CraneResult<()> {
        if animation.is_empty() {
            return Err(CraneError::VisualizationError(
                "animation has no frames".to_string(),
            ));
        }
        ensure_parent(&animation.output)?;
        let scene = &animation.scene;
        let [x0, x1] = scene.x_range;
        let [y0, y1] = scene.y_range;
        let terminal = format!(
            "gif animate delay {} size {},{}",
            animation.export_delay(),
            animation.width,
            animation.height
        );

        let mut fg = Figure::new();
        fg.set_terminal(&terminal, &animation.output.to_string_lossy());
        for (i, frame) in animation.frames.iter().enumerate() {
            if i > 0 {
                fg.new_page();
            }
            let axes = fg.axes2d();
            axes.set_x_range(AutoOption::Fix(x0), AutoOption::Fix(x1))
                .set_y_range(AutoOption::Fix(y0), AutoOption::Fix(y1))
                .set_x_label("position", &[]);

            // Crane rail and the start and objective markers
            axes.lines(
                &[x0, x1],
                &[scene.rail_height, scene.rail_height],
                &[Color(colors::RAIL), LineWidth(4.0)],
            );
            for (x, text) in [(scene.start_position, "start"), (scene.objective_position, "objective")] {
                axes.lines(
                    &[x, x],
                    &[y0 - 0.3, y1 + 0.6],
                    &[Color(colors::BLACK), LineWidth(2.0), LineStyle(DashType::Dot)],
                );
                axes.label(text, Coordinate::Axis(x + 0.06), Coordinate::Axis(y0 + 0.1), &[]);
            }

            axes.lines_points(
                &[frame.pivot.x, frame.rod_end.x],
                &[frame.pivot.y, frame.rod_end.y],
                &[Color(colors::CRANE), LineWidth(4.0), PointSymbol('O'), PointSize(0.8)],
            );
            axes.points(
                &[frame.cart.x],
                &[frame.cart.y],
                &[Color(colors::CRANE), PointSymbol('S'), PointSize(5.0)],
            );
            axes.points(
                &[frame.bob.x],
                &[frame.bob.y],
                &[Color(colors::CRANE), PointSymbol('O'), PointSize(3.0)],
            );
            axes.label(&frame.caption(), Coordinate::Graph(0.05), Coordinate::Graph(0.9), &[]);
        }

        fg.show()
            .map_err(|e| CraneError::VisualizationError(e.to_string()))?;
        info!(
            path = %animation.output.display(),
            frames = animation.len(),
            "animation saved"
        );
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> CraneResult<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}
