//
// Local optimal control of a declared model
//
// The control sequence on the model's time grid is the only unknown. States
// follow from RK4 integration with zero-order-hold controls, and the
// objective is the model's sum of weighted squared residuals, so the problem
// is solved as bounded nonlinear least squares.
//

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::common::{CraneError, CraneResult, SolutionTable};
use crate::control::least_squares::{
    finite_difference_step, minimize_bounded, LeastSquaresOptions, LeastSquaresReport,
};
use crate::model::definition::Model;
use crate::simulation::simulator::Simulator;

/// Operating mode selected by the IMODE option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Integrate with controls held at their initial values (IMODE 4, 7)
    Simulate,
    /// Optimize the whole horizon in one solve (IMODE 6)
    Optimize,
    /// Shrinking horizon, applying only the first move of each solve (IMODE 9)
    RecedingHorizon,
}

impl SolveMode {
    pub fn from_imode(imode: i64) -> CraneResult<Self> {
        match imode {
            4 | 7 => Ok(SolveMode::Simulate),
            6 => Ok(SolveMode::Optimize),
            9 => Ok(SolveMode::RecedingHorizon),
            other => Err(CraneError::InvalidParameter(format!(
                "IMODE {} is not supported by the local solver",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub imode: i64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            imode: 4,
            max_iter: 100,
            tolerance: 1e-8,
        }
    }
}

/// Result of a local solve
#[derive(Debug, Clone)]
pub struct LocalSolution {
    /// Every variable and intermediate on the model's time grid
    pub table: SolutionTable,
    /// Sum of weighted squared residuals
    pub objective: f64,
    pub iterations: usize,
    pub mode: SolveMode,
}

#[derive(Debug, Clone, Default)]
pub struct LocalSolver {
    options: SolverOptions,
}

impl LocalSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Set an integer option by name (`imode`, `max_iter`), case-insensitive
    pub fn set_option(&mut self, name: &str, value: i64) -> CraneResult<()> {
        match name.to_ascii_lowercase().as_str() {
            "imode" => {
                SolveMode::from_imode(value)?;
                self.options.imode = value;
            }
            "max_iter" => {
                if value < 1 {
                    return Err(CraneError::InvalidParameter(format!(
                        "max_iter must be at least 1, got {}",
                        value
                    )));
                }
                self.options.max_iter = value as usize;
            }
            other => {
                return Err(CraneError::InvalidParameter(format!(
                    "unknown solver option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    pub fn solve(&self, model: &Model) -> CraneResult<LocalSolution> {
        let mode = SolveMode::from_imode(self.options.imode)?;
        let sim = Simulator::new(model)?;
        info!(
            model = model.name(),
            ?mode,
            samples = sim.grid().len(),
            controls = sim.controls().len(),
            "starting local solve"
        );

        let initial = DVector::from_vec(model.initial_values());
        let (moves, iterations) = match mode {
            SolveMode::Simulate => (sim.initial_moves(), 0),
            SolveMode::Optimize => {
                self.require_objective(model)?;
                let horizon = Horizon::new(&sim, 0, initial.clone());
                let report = self.optimize(&horizon, sim.initial_moves())?;
                (report.solution.as_slice().to_vec(), report.iterations)
            }
            SolveMode::RecedingHorizon => {
                self.require_objective(model)?;
                self.receding_horizon(&sim, &initial)?
            }
        };

        let states = sim.rollout(0, &initial, &moves)?;
        let mut residuals = Vec::new();
        sim.residuals(0, &states, &mut residuals)?;
        let objective: f64 = residuals.iter().map(|r| r * r).sum();
        info!(objective, iterations, "local solve finished");

        Ok(LocalSolution {
            table: sim.table(&states)?,
            objective,
            iterations,
            mode,
        })
    }

    fn require_objective(&self, model: &Model) -> CraneResult<()> {
        if model.objectives().is_empty() {
            return Err(CraneError::SolverError(format!(
                "model '{}' has no objective to optimize",
                model.name()
            )));
        }
        if model.controls().is_empty() {
            return Err(CraneError::SolverError(format!(
                "model '{}' has no control to optimize",
                model.name()
            )));
        }
        Ok(())
    }

    fn optimize(&self, horizon: &Horizon, warm_start: Vec<f64>) -> CraneResult<LeastSquaresReport> {
        let (lower, upper) = horizon.bounds();
        let options = LeastSquaresOptions {
            max_iter: self.options.max_iter,
            tolerance: self.options.tolerance,
            ..LeastSquaresOptions::default()
        };
        let report = minimize_bounded(
            |moves| horizon.residuals(moves),
            |moves, r| horizon.jacobian(moves, r),
            DVector::from_vec(warm_start),
            &lower,
            &upper,
            &options,
        )?;
        if !report.converged {
            return Err(CraneError::SolverError(format!(
                "no solution found within {} iterations (objective {:.6e})",
                report.iterations, report.cost
            )));
        }
        Ok(report)
    }

    /// Re-solve the remaining horizon at every sample and keep its first move
    fn receding_horizon(
        &self,
        sim: &Simulator,
        initial: &DVector<f64>,
    ) -> CraneResult<(Vec<f64>, usize)> {
        let n = sim.grid().len();
        let controls = sim.controls().to_vec();
        let mut applied = sim.initial_moves();
        let mut warm = applied.clone();
        let mut x = initial.clone();
        let mut iterations = 0;

        for k in 0..n {
            let m = n - k;
            let report = self.optimize(&Horizon::new(sim, k, x.clone()), warm)?;
            iterations += report.iterations;
            debug!(sample = k, cost = report.cost, "horizon solved");

            let plan = &report.solution;
            for (c, &index) in controls.iter().enumerate() {
                applied[c * n + k] = plan[c * m];
                x[index] = plan[c * m];
            }
            warm = (0..controls.len())
                .flat_map(|c| (1..m).map(move |j| plan[c * m + j]))
                .collect();
            if k + 1 < n {
                x = sim.step(k, &x);
            }
        }
        Ok((applied, iterations))
    }
}

/// Optimization window from sample `start` to the end of the grid
struct Horizon<'s, 'm> {
    sim: &'s Simulator<'m>,
    start: usize,
    initial: DVector<f64>,
}

impl<'s, 'm> Horizon<'s, 'm> {
    fn new(sim: &'s Simulator<'m>, start: usize, initial: DVector<f64>) -> Self {
        Self { sim, start, initial }
    }

    fn samples(&self) -> usize {
        self.sim.grid().len() - self.start
    }

    fn bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let m = self.samples();
        let variables = self.sim.model().variables();
        let mut lower = Vec::with_capacity(self.sim.controls().len() * m);
        let mut upper = Vec::with_capacity(lower.capacity());
        for &index in self.sim.controls() {
            let v = &variables[index];
            lower.extend(std::iter::repeat(v.lower.unwrap_or(f64::NEG_INFINITY)).take(m));
            upper.extend(std::iter::repeat(v.upper.unwrap_or(f64::INFINITY)).take(m));
        }
        (DVector::from_vec(lower), DVector::from_vec(upper))
    }

    fn residuals(&self, moves: &DVector<f64>) -> CraneResult<DVector<f64>> {
        let states = self.sim.rollout(self.start, &self.initial, moves.as_slice())?;
        let mut out = Vec::new();
        self.sim.residuals(self.start, &states, &mut out)?;
        Ok(DVector::from_vec(out))
    }

    /// Finite differences that re-simulate only from the perturbed sample on,
    /// since a move cannot affect earlier states.
    fn jacobian(&self, moves: &DVector<f64>, r: &DVector<f64>) -> CraneResult<DMatrix<f64>> {
        let m = self.samples();
        let n_controls = self.sim.controls().len();
        let terms = r.len() / m;
        let states = self.sim.rollout(self.start, &self.initial, moves.as_slice())?;

        let mut jac = DMatrix::zeros(r.len(), moves.len());
        let mut probe = moves.clone();
        let mut tail_moves = Vec::with_capacity(n_controls * m);
        let mut shifted = Vec::with_capacity(terms * m);

        for c in 0..n_controls {
            for j in 0..m {
                let column = c * m + j;
                let h = finite_difference_step(moves[column]);
                probe[column] = moves[column] + h;

                tail_moves.clear();
                for cc in 0..n_controls {
                    tail_moves.extend_from_slice(&probe.as_slice()[cc * m + j..(cc + 1) * m]);
                }
                let tail = self.sim.rollout(self.start + j, &states[j], &tail_moves)?;
                shifted.clear();
                self.sim.residuals(self.start + j, &tail, &mut shifted)?;
                for (i, value) in shifted.iter().enumerate() {
                    let row = j * terms + i;
                    jac[(row, column)] = (value - r[row]) / h;
                }

                probe[column] = moves[column];
            }
        }
        Ok(jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MpcConfig;
    use crate::model::crane::linearized_crane_model;
    use crate::model::definition::{ModelBuilder, VarSpec};
    use crate::common::TimeGrid;
    use approx::assert_relative_eq;

    fn small_config() -> MpcConfig {
        MpcConfig {
            samples: 41,
            ..MpcConfig::default()
        }
    }

    fn solver(imode: i64) -> LocalSolver {
        let mut solver = LocalSolver::new();
        solver.set_option("IMODE", imode).unwrap();
        solver
    }

    #[test]
    fn test_imode_mapping() {
        assert_eq!(SolveMode::from_imode(4).unwrap(), SolveMode::Simulate);
        assert_eq!(SolveMode::from_imode(6).unwrap(), SolveMode::Optimize);
        assert_eq!(SolveMode::from_imode(9).unwrap(), SolveMode::RecedingHorizon);
        assert!(SolveMode::from_imode(1).is_err());
    }

    #[test]
    fn test_set_option_validates() {
        let mut solver = LocalSolver::new();
        assert!(solver.set_option("imode", 5).is_err());
        assert_eq!(solver.options().imode, 4);
        assert!(solver.set_option("max_iter", 0).is_err());
        assert!(solver.set_option("nodes", 3).is_err());
        solver.set_option("Max_Iter", 12).unwrap();
        assert_eq!(solver.options().max_iter, 12);
    }

    #[test]
    fn test_simulation_without_force_keeps_cart_still() {
        let (model, _) = linearized_crane_model(&MpcConfig::default()).unwrap();
        let solution = solver(4).solve(&model).unwrap();
        let y = solution.table.get("y").unwrap();
        assert!(y.iter().all(|&p| p == -1.0));
        // 23 samples after 6.2 s with y = -1
        assert_relative_eq!(solution.objective, 23.0, epsilon = 1e-12);
        assert_eq!(solution.iterations, 0);
    }

    #[test]
    fn test_optimization_settles_the_load() {
        let config = small_config();
        let (model, handles) = linearized_crane_model(&config).unwrap();
        let solution = solver(6).solve(&model).unwrap();
        assert_eq!(solution.mode, SolveMode::Optimize);
        assert!(solution.objective < 0.05, "objective {}", solution.objective);

        let table = &solution.table;
        let time = table.time();
        for handle in [&handles.y, &handles.v, &handles.theta, &handles.q] {
            let values = table.get(handle.name()).unwrap();
            for (t, value) in time.iter().zip(values) {
                if *t >= config.settle_time {
                    assert!(value.abs() < 0.05, "{} = {} at t = {}", handle.name(), value, t);
                }
            }
        }
        assert_eq!(table.get("y").unwrap()[0], -1.0);
        assert!(table.get("epsilon").is_some());
    }

    #[test]
    fn test_control_bounds_respected() {
        // x' = u from x = 1: the force saturates until the last sample,
        // whose move no longer affects the state
        let mut b = ModelBuilder::new("saturated");
        b.time(TimeGrid::linspace(0.0, 1.0, 11).unwrap());
        let u = b.control("u", VarSpec::new(0.0).bounds(-0.1, 0.1));
        let x = b.state("x", VarSpec::new(1.0));
        b.equation(&x, u.expr(), "");
        b.minimize(1.0, x.expr());
        b.minimize(0.001, u.expr());
        let model = b.build().unwrap();

        let solution = solver(6).solve(&model).unwrap();
        let u = solution.table.get("u").unwrap();
        assert!(u[..10].iter().all(|&f| f == -0.1));
        assert!(u[10].abs() < 1e-6);
        assert_relative_eq!(solution.table.get("x").unwrap()[10], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_receding_horizon_matches_single_solve() {
        let config = MpcConfig {
            samples: 21,
            horizon: 4.0,
            settle_time: 3.0,
            ..MpcConfig::default()
        };
        let (model, _) = linearized_crane_model(&config).unwrap();
        let single = solver(6).solve(&model).unwrap();
        let receding = solver(9).solve(&model).unwrap();
        assert_eq!(receding.table.len(), 21);
        assert_relative_eq!(
            receding.objective,
            single.objective,
            epsilon = 1e-6,
            max_relative = 1e-3
        );
    }

    #[test]
    fn test_optimize_requires_objective() {
        let mut b = ModelBuilder::new("free");
        b.time(TimeGrid::linspace(0.0, 1.0, 5).unwrap());
        let u = b.control("u", VarSpec::new(0.0));
        let x = b.state("x", VarSpec::new(0.0));
        b.equation(&x, u.expr(), "");
        let model = b.build().unwrap();
        let err = solver(6).solve(&model).unwrap_err();
        assert!(matches!(err, CraneError::SolverError(_)));
    }
}
