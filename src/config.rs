//! Run configuration
//!
//! Every constant the pipelines need (session identity, physical
//! parameters, MPC settings, animation and plot output) lives here. Each
//! section falls back to its defaults, so a TOML file only has to name the
//! values it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{CraneError, CraneResult};
use crate::model::crane::CraneParams;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CraneConfig {
    /// Remote session and options
    pub remote: RemoteConfig,
    /// Crane pendulum physical parameters
    pub physics: CraneParams,
    /// Local MPC problem
    pub mpc: MpcConfig,
    /// Cart/pendulum animation
    pub animation: AnimationConfig,
    /// Static history plots
    pub plot: PlotConfig,
}

impl CraneConfig {
    pub fn from_toml_str(text: &str) -> CraneResult<Self> {
        let config: CraneConfig =
            toml::from_str(text).map_err(|e| CraneError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> CraneResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CraneError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Configuration from `path`, or the built-in defaults
    pub fn load(path: Option<&Path>) -> CraneResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> CraneResult<()> {
        self.remote.validate()?;
        self.physics.validate()?;
        self.mpc.validate()?;
        self.animation.validate()
    }
}

/// How the model document is sent to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// One upload carrying the whole document
    Document,
    /// One command per line, blank lines included
    Lines,
}

/// Remote solver session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Server base address
    pub server: String,
    /// Application name identifying the session
    pub app: String,
    /// Auxiliary data uploaded with the model
    pub data_file: PathBuf,
    /// Solver mode (6 = dynamic optimization / MPC)
    pub imode: i64,
    /// Bounds on the cart force `u`
    pub control_bounds: [f64; 2],
    pub upload: UploadMode,
    /// Local copy of the fetched solution
    pub solution_file: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server: "http://byu.apmonitor.com".to_string(),
            app: "crane_pendulum".to_string(),
            data_file: PathBuf::from("data/pendulum.csv"),
            imode: 6,
            control_bounds: [-10.0, 10.0],
            upload: UploadMode::Document,
            solution_file: None,
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> CraneResult<()> {
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(CraneError::InvalidParameter(format!(
                "server '{}' must be an http(s) address",
                self.server
            )));
        }
        let [lo, hi] = self.control_bounds;
        if !(lo < hi) {
            return Err(CraneError::InvalidParameter(format!(
                "control bounds [{}, {}] are empty",
                lo, hi
            )));
        }
        Ok(())
    }
}

/// Linearized crane settling problem solved locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    /// Cart mass `m1`
    pub cart_mass: f64,
    /// Load mass `m2`
    pub pendulum_mass: f64,
    /// End of the time grid [s]
    pub horizon: f64,
    /// Number of grid points including both ends
    pub samples: usize,
    /// States are penalised from this time on [s]
    pub settle_time: f64,
    /// Initial cart position
    pub initial_position: f64,
    pub state_weight: f64,
    pub effort_weight: f64,
    /// Optional bounds on the cart force
    pub control_bounds: Option<[f64; 2]>,
    /// 4 simulate, 6 optimize the whole horizon, 9 receding horizon
    pub imode: i64,
    pub max_iter: i64,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            cart_mass: 10.0,
            pendulum_mass: 5.0,
            horizon: 8.0,
            samples: 100,
            settle_time: 6.2,
            initial_position: -1.0,
            state_weight: 1.0,
            effort_weight: 0.001,
            control_bounds: None,
            imode: 6,
            max_iter: 100,
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> CraneResult<()> {
        if !(self.cart_mass > 0.0) || !(self.pendulum_mass >= 0.0) {
            return Err(CraneError::InvalidParameter(
                "cart mass must be positive and load mass non-negative".to_string(),
            ));
        }
        if self.samples < 2 || !(self.horizon > 0.0) {
            return Err(CraneError::InvalidParameter(format!(
                "horizon {} s with {} samples is not a usable grid",
                self.horizon, self.samples
            )));
        }
        if !(self.state_weight >= 0.0) || !(self.effort_weight >= 0.0) {
            return Err(CraneError::InvalidParameter(
                "objective weights must be non-negative".to_string(),
            ));
        }
        if let Some([lo, hi]) = self.control_bounds {
            if !(lo <= hi) {
                return Err(CraneError::InvalidParameter(format!(
                    "control bounds [{}, {}] are empty",
                    lo, hi
                )));
            }
        }
        if self.max_iter < 1 {
            return Err(CraneError::InvalidParameter(
                "max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cart/pendulum animation geometry and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Displayed rod length, independent of the physical model
    pub rod_length: f64,
    /// Bob marker distance as a fraction of the rod length
    pub bob_offset: f64,
    /// Cart marker height above the rod pivot
    pub cart_offset: f64,
    pub rail_height: f64,
    /// Cart position the load has to reach
    pub objective_position: f64,
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    /// Display interval between frames [ms]
    pub interval_ms: u64,
    /// Frame rate of the exported file
    pub fps: u32,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            rod_length: 1.0,
            bob_offset: 1.05,
            cart_offset: 0.1,
            rail_height: 0.2,
            objective_position: 0.0,
            x_range: [-1.5, 0.5],
            y_range: [-1.2, 0.4],
            interval_ms: 40,
            fps: 30,
            output: PathBuf::from("Pendulum_Control.gif"),
            width: 800,
            height: 640,
        }
    }
}

impl AnimationConfig {
    pub fn validate(&self) -> CraneResult<()> {
        if !(self.rod_length > 0.0) {
            return Err(CraneError::InvalidParameter(
                "rod length must be positive".to_string(),
            ));
        }
        if self.fps == 0 || self.interval_ms == 0 {
            return Err(CraneError::InvalidParameter(
                "frame rate and interval must be positive".to_string(),
            ));
        }
        if !(self.x_range[0] < self.x_range[1]) || !(self.y_range[0] < self.y_range[1]) {
            return Err(CraneError::InvalidParameter(
                "animation axis ranges are empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Static plot output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// PNG file to write; `None` opens a gnuplot window
    pub output: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            output: None,
            width: 1000,
            height: 800,
        }
    }
}
