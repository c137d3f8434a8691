//! Numerical integration methods
//!
//! Runge-Kutta 4th order for fixed-size and dynamically sized states.

use nalgebra::{DVector, SVector};

/// Generic RK4 integrator for any fixed-size state vector
///
/// Solves dx/dt = f(t, x) over one step of length `dt`.
pub fn rk4<const N: usize, F>(x: &SVector<f64, N>, t: f64, dt: f64, f: F) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * dt / 2.0));
    let k3 = f(t + dt / 2.0, &(x + k2 * dt / 2.0));
    let k4 = f(t + dt, &(x + k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// RK4 integrator for states whose size is only known at runtime
pub fn rk4_dynamic<F>(x: &DVector<f64>, t: f64, dt: f64, f: F) -> DVector<f64>
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + &k1 * (dt / 2.0)));
    let k3 = f(t + dt / 2.0, &(x + &k2 * (dt / 2.0)));
    let k4 = f(t + dt, &(x + &k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    #[test]
    fn test_rk4_exponential_decay() {
        // dx/dt = -x, x(0) = 1
        let mut x = SVector::<f64, 1>::new(1.0);
        let dt = 0.01;
        let mut t = 0.0;
        for _ in 0..100 {
            x = rk4(&x, t, dt, |_, x| -x);
            t += dt;
        }
        assert_relative_eq!(x[0], (-1.0f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_rk4_harmonic_oscillator() {
        // x'' = -x, quarter period from (1, 0) lands on (0, -1)
        let mut x = Vector2::new(1.0, 0.0);
        let steps = 1000;
        let dt = std::f64::consts::FRAC_PI_2 / steps as f64;
        for i in 0..steps {
            x = rk4(&x, i as f64 * dt, dt, |_, s| Vector2::new(s[1], -s[0]));
        }
        assert_relative_eq!(x[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rk4_dynamic_matches_fixed() {
        let fixed = rk4(&Vector2::new(0.3, -0.2), 0.0, 0.1, |t, s| Vector2::new(s[1] + t, -s[0]));
        let dynamic = rk4_dynamic(&DVector::from_vec(vec![0.3, -0.2]), 0.0, 0.1, |t, s| {
            DVector::from_vec(vec![s[1] + t, -s[0]])
        });
        assert_relative_eq!(fixed[0], dynamic[0], epsilon = 1e-14);
        assert_relative_eq!(fixed[1], dynamic[1], epsilon = 1e-14);
    }
}
