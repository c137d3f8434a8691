//! Bounded nonlinear least squares
//!
//! Levenberg-Marquardt steps on the normal equations, projected onto box
//! bounds after every step. Small dense problems only: the normal matrix is
//! factored with a Cholesky decomposition every iteration.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::common::{CraneError, CraneResult};

/// Stopping rules for `minimize_bounded`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresOptions {
    pub max_iter: usize,
    /// Step size (relative to the iterate) below which the solve stops
    pub tolerance: f64,
    pub initial_damping: f64,
}

impl Default for LeastSquaresOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-9,
            initial_damping: 1e-6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeastSquaresReport {
    pub solution: DVector<f64>,
    /// Sum of squared residuals at `solution`
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

const MAX_DAMPING: f64 = 1e12;

/// Minimize `|r(x)|^2` subject to `lower <= x <= upper`.
///
/// `residuals` maps a point to its residual vector. `jacobian` receives the
/// point and its residuals and returns `dr/dx`.
pub fn minimize_bounded<R, J>(
    residuals: R,
    jacobian: J,
    x0: DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    options: &LeastSquaresOptions,
) -> CraneResult<LeastSquaresReport>
where
    R: Fn(&DVector<f64>) -> CraneResult<DVector<f64>>,
    J: Fn(&DVector<f64>, &DVector<f64>) -> CraneResult<DMatrix<f64>>,
{
    if lower.len() != x0.len() || upper.len() != x0.len() {
        return Err(CraneError::InvalidParameter(
            "bounds do not match the number of unknowns".to_string(),
        ));
    }

    let mut x = project(x0, lower, upper);
    let mut r = residuals(&x)?;
    let mut cost = checked_cost(&r)?;
    let mut damping = options.initial_damping;

    for iteration in 1..=options.max_iter {
        let jac = jacobian(&x, &r)?;
        let mut gradient = jac.transpose() * &r;
        let mut normal = jac.transpose() * &jac;

        // Variables held at a bound by the gradient stay fixed this iteration
        for i in 0..x.len() {
            let pinned = (x[i] <= lower[i] && gradient[i] > 0.0)
                || (x[i] >= upper[i] && gradient[i] < 0.0);
            if pinned {
                normal.row_mut(i).fill(0.0);
                normal.column_mut(i).fill(0.0);
                normal[(i, i)] = 1.0;
                gradient[i] = 0.0;
            }
        }

        let mut accepted = None;
        while damping <= MAX_DAMPING {
            let mut system = normal.clone();
            for i in 0..system.nrows() {
                system[(i, i)] += damping;
            }
            let step = match system.cholesky() {
                Some(chol) => chol.solve(&(-&gradient)),
                None => {
                    damping *= 10.0;
                    continue;
                }
            };

            let candidate = project(&x + &step, lower, upper);
            let moved = (&candidate - &x).amax();
            if moved <= options.tolerance * (1.0 + x.amax()) {
                debug!(iteration, cost, "least squares step below tolerance");
                return Ok(LeastSquaresReport {
                    solution: x,
                    cost,
                    iterations: iteration,
                    converged: true,
                });
            }

            let candidate_r = residuals(&candidate)?;
            let candidate_cost = candidate_r.norm_squared();
            if candidate_cost.is_finite() && candidate_cost <= cost {
                accepted = Some((candidate, candidate_r, candidate_cost));
                damping = (damping / 3.0).max(1e-15);
                break;
            }
            damping *= 4.0;
        }

        match accepted {
            Some((candidate, candidate_r, candidate_cost)) => {
                debug!(iteration, cost = candidate_cost, damping, "least squares step accepted");
                x = candidate;
                r = candidate_r;
                cost = candidate_cost;
            }
            // No descent direction left within the bounds
            None => {
                return Ok(LeastSquaresReport {
                    solution: x,
                    cost,
                    iterations: iteration,
                    converged: true,
                });
            }
        }
    }

    Ok(LeastSquaresReport {
        solution: x,
        cost,
        iterations: options.max_iter,
        converged: false,
    })
}

/// Forward-difference Jacobian of `residuals` at `x`
pub fn forward_difference_jacobian<R>(
    residuals: R,
    x: &DVector<f64>,
    r: &DVector<f64>,
) -> CraneResult<DMatrix<f64>>
where
    R: Fn(&DVector<f64>) -> CraneResult<DVector<f64>>,
{
    let mut jac = DMatrix::zeros(r.len(), x.len());
    let mut probe = x.clone();
    for j in 0..x.len() {
        let h = finite_difference_step(x[j]);
        probe[j] = x[j] + h;
        let shifted = residuals(&probe)?;
        probe[j] = x[j];
        jac.set_column(j, &((shifted - r) / h));
    }
    Ok(jac)
}

pub fn finite_difference_step(value: f64) -> f64 {
    1e-7 * (1.0 + value.abs())
}

fn project(mut x: DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    for i in 0..x.len() {
        x[i] = x[i].max(lower[i]).min(upper[i]);
    }
    x
}

fn checked_cost(r: &DVector<f64>) -> CraneResult<f64> {
    let cost = r.norm_squared();
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(CraneError::NumericalError(
            "objective is not finite at the starting point".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unbounded(n: usize) -> (DVector<f64>, DVector<f64>) {
        (
            DVector::from_element(n, f64::NEG_INFINITY),
            DVector::from_element(n, f64::INFINITY),
        )
    }

    #[test]
    fn test_linear_fit() {
        // residual_i = a * t_i + b - y_i with y = 2t + 1
        let t = [0.0, 1.0, 2.0, 3.0];
        let residuals = |x: &DVector<f64>| -> CraneResult<DVector<f64>> {
            Ok(DVector::from_iterator(4, t.iter().map(|&ti| x[0] * ti + x[1] - (2.0 * ti + 1.0))))
        };
        let (lo, hi) = unbounded(2);
        let report = minimize_bounded(
            residuals,
            |x, r| forward_difference_jacobian(residuals, x, r),
            DVector::zeros(2),
            &lo,
            &hi,
            &LeastSquaresOptions::default(),
        )
        .unwrap();
        assert!(report.converged);
        assert_relative_eq!(report.solution[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(report.solution[1], 1.0, epsilon = 1e-6);
        assert!(report.cost < 1e-10);
    }

    #[test]
    fn test_bound_is_active_at_solution() {
        // minimum at x = 3 but x <= 1
        let residuals = |x: &DVector<f64>| -> CraneResult<DVector<f64>> {
            Ok(DVector::from_element(1, x[0] - 3.0))
        };
        let lo = DVector::from_element(1, -1.0);
        let hi = DVector::from_element(1, 1.0);
        let report = minimize_bounded(
            residuals,
            |x, r| forward_difference_jacobian(residuals, x, r),
            DVector::zeros(1),
            &lo,
            &hi,
            &LeastSquaresOptions::default(),
        )
        .unwrap();
        assert!(report.converged);
        assert_relative_eq!(report.solution[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(report.cost, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rosenbrock() {
        let residuals = |x: &DVector<f64>| -> CraneResult<DVector<f64>> {
            Ok(DVector::from_vec(vec![10.0 * (x[1] - x[0] * x[0]), 1.0 - x[0]]))
        };
        let (lo, hi) = unbounded(2);
        let report = minimize_bounded(
            residuals,
            |x, r| forward_difference_jacobian(residuals, x, r),
            DVector::from_vec(vec![-1.2, 1.0]),
            &lo,
            &hi,
            &LeastSquaresOptions::default(),
        )
        .unwrap();
        assert!(report.converged);
        assert_relative_eq!(report.solution[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(report.solution[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_non_finite_start_rejected() {
        let residuals = |_: &DVector<f64>| -> CraneResult<DVector<f64>> {
            Ok(DVector::from_element(1, f64::NAN))
        };
        let (lo, hi) = unbounded(1);
        let err = minimize_bounded(
            residuals,
            |x, r| forward_difference_jacobian(residuals, x, r),
            DVector::zeros(1),
            &lo,
            &hi,
            &LeastSquaresOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CraneError::NumericalError(_)));
    }
}
