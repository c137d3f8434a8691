//! Fixed-grid simulation of a declared model
//!
//! Controls are held constant over each grid interval (zero-order hold) and
//! parameters take their value at the interval start.

use nalgebra::DVector;

use crate::common::{CraneError, CraneResult, SolutionTable, TimeGrid};
use crate::model::definition::{Model, VariableRole};
use crate::simulation::integrator::rk4_dynamic;

pub struct Simulator<'a> {
    model: &'a Model,
    grid: &'a TimeGrid,
    controls: Vec<usize>,
    parameters: Vec<Vec<f64>>,
}

impl<'a> Simulator<'a> {
    pub fn new(model: &'a Model) -> CraneResult<Self> {
        let grid = model.time().ok_or_else(|| {
            CraneError::ModelError(format!("model '{}' has no time grid", model.name()))
        })?;
        let controls = model
            .variables()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.role == VariableRole::Control)
            .map(|(i, _)| i)
            .collect();
        let parameters = (0..grid.len()).map(|k| model.parameter_values(k)).collect();
        Ok(Self {
            model,
            grid,
            controls,
            parameters,
        })
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn grid(&self) -> &TimeGrid {
        self.grid
    }

    /// Indices of the control variables, in declaration order
    pub fn controls(&self) -> &[usize] {
        &self.controls
    }

    /// Advance every variable from sample `k` to `k + 1`
    pub fn step(&self, k: usize, variables: &DVector<f64>) -> DVector<f64> {
        let parameters = &self.parameters[k];
        rk4_dynamic(variables, self.grid.points()[k], self.grid.step(k), |_, x| {
            DVector::from_vec(self.model.derivatives(parameters, x.as_slice()))
        })
    }

    /// Variables at samples `start..n`.
    ///
    /// `moves[c * m + j]` is control `c` at sample `start + j`, where
    /// `m = n - start`. Control entries of `initial` are overwritten.
    pub fn rollout(
        &self,
        start: usize,
        initial: &DVector<f64>,
        moves: &[f64],
    ) -> CraneResult<Vec<DVector<f64>>> {
        let n = self.grid.len();
        if start >= n {
            return Err(CraneError::InvalidParameter(format!(
                "rollout start {} is past the last sample",
                start
            )));
        }
        let m = n - start;
        if moves.len() != self.controls.len() * m {
            return Err(CraneError::InvalidParameter(format!(
                "{} control moves for {} controls over {} samples",
                moves.len(),
                self.controls.len(),
                m
            )));
        }

        let mut states = Vec::with_capacity(m);
        let mut x = initial.clone();
        for j in 0..m {
            for (c, &index) in self.controls.iter().enumerate() {
                x[index] = moves[c * m + j];
            }
            if x.iter().any(|v| !v.is_finite()) {
                return Err(CraneError::NumericalError(format!(
                    "simulation diverged at t = {:.3}",
                    self.grid.points()[start + j]
                )));
            }
            states.push(x.clone());
            if j + 1 < m {
                x = self.step(start + j, &x);
            }
        }
        Ok(states)
    }

    /// Weighted objective residuals for states beginning at sample `start`
    pub fn residuals(
        &self,
        start: usize,
        states: &[DVector<f64>],
        out: &mut Vec<f64>,
    ) -> CraneResult<()> {
        for (j, x) in states.iter().enumerate() {
            self.model
                .weighted_residuals(&self.parameters[start + j], x.as_slice(), out)?;
        }
        Ok(())
    }

    /// Control values held at their initial value for the whole grid
    pub fn initial_moves(&self) -> Vec<f64> {
        let m = self.grid.len();
        let initial = self.model.initial_values();
        self.controls
            .iter()
            .flat_map(|&index| std::iter::repeat(initial[index]).take(m))
            .collect()
    }

    /// Simulate from the declared initial values
    pub fn run(&self, moves: &[f64]) -> CraneResult<SolutionTable> {
        let initial = DVector::from_vec(self.model.initial_values());
        let states = self.rollout(0, &initial, moves)?;
        self.table(&states)
    }

    /// Solution table for a full-grid trajectory, intermediates included
    pub fn table(&self, states: &[DVector<f64>]) -> CraneResult<SolutionTable> {
        if states.len() != self.grid.len() {
            return Err(CraneError::InvalidParameter(format!(
                "{} states for {} time points",
                states.len(),
                self.grid.len()
            )));
        }
        let mut table = SolutionTable::new(self.grid.points().to_vec());
        for (i, variable) in self.model.variables().iter().enumerate() {
            table.insert(&variable.name, states.iter().map(|x| x[i]).collect())?;
        }
        let intermediates: Vec<Vec<f64>> = states
            .iter()
            .enumerate()
            .map(|(k, x)| {
                self.model
                    .evaluate_intermediates(&self.parameters[k], x.as_slice())
            })
            .collect();
        for (i, intermediate) in self.model.intermediates().iter().enumerate() {
            table.insert(
                &intermediate.name,
                intermediates.iter().map(|values| values[i]).collect(),
            )?;
        }
        Ok(table)
    }
}
