//! Common types used throughout crane_control

use nalgebra::{Vector2, Vector4};

use crate::common::error::{CraneError, CraneResult};

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

/// Crane pendulum state: cart position and velocity, rod angle and angular velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CraneState {
    pub y: f64,
    pub v: f64,
    pub theta: f64,
    pub q: f64,
}

impl CraneState {
    pub fn new(y: f64, v: f64, theta: f64, q: f64) -> Self {
        Self { y, v, theta, q }
    }

    pub fn rest() -> Self {
        Self { y: 0.0, v: 0.0, theta: 0.0, q: 0.0 }
    }

    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.y, self.v, self.theta, self.q)
    }

    pub fn is_finite(&self) -> bool {
        self.y.is_finite() && self.v.is_finite() && self.theta.is_finite() && self.q.is_finite()
    }
}

impl From<Vector4<f64>> for CraneState {
    fn from(v: Vector4<f64>) -> Self {
        Self { y: v[0], v: v[1], theta: v[2], q: v[3] }
    }
}

/// Strictly increasing sequence of sample times
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> CraneResult<Self> {
        if points.len() < 2 {
            return Err(CraneError::InvalidParameter(format!(
                "time grid needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|t| !t.is_finite()) {
            return Err(CraneError::InvalidParameter(
                "time grid contains non-finite values".to_string(),
            ));
        }
        if points.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CraneError::InvalidParameter(
                "time grid must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// `n` evenly spaced points from `start` to `end` inclusive
    pub fn linspace(start: f64, end: f64, n: usize) -> CraneResult<Self> {
        if n < 2 {
            return Err(CraneError::InvalidParameter(format!(
                "linspace needs at least 2 points, got {}",
                n
            )));
        }
        let span = end - start;
        let last = (n - 1) as f64;
        let mut points: Vec<f64> = (0..n).map(|i| start + span * i as f64 / last).collect();
        points[n - 1] = end;
        Self::new(points)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.points[0]
    }

    pub fn end(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    /// Width of the interval starting at sample `k`
    pub fn step(&self, k: usize) -> f64 {
        self.points[k + 1] - self.points[k]
    }

    /// 0/1 weight that switches on at `switch_time` and stays on
    pub fn indicator(&self, switch_time: f64) -> Vec<f64> {
        self.points
            .iter()
            .map(|&t| if t < switch_time { 0.0 } else { 1.0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_crane_state_vector_roundtrip() {
        let s = CraneState::new(-1.0, 0.5, 0.1, -0.2);
        assert_eq!(CraneState::from(s.to_vector()), s);
    }

    #[test]
    fn test_linspace_matches_endpoints() {
        let grid = TimeGrid::linspace(0.0, 8.0, 100).unwrap();
        assert_eq!(grid.len(), 100);
        assert_eq!(grid.start(), 0.0);
        assert_eq!(grid.end(), 8.0);
        assert_relative_eq!(grid.step(0), 8.0 / 99.0, epsilon = 1e-12);
    }

    #[test]
    fn test_time_grid_rejects_unsorted() {
        assert!(TimeGrid::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(TimeGrid::new(vec![0.0]).is_err());
        assert!(TimeGrid::linspace(1.0, 0.0, 5).is_err());
    }

    #[test]
    fn test_indicator_switches_at_time() {
        let grid = TimeGrid::linspace(0.0, 8.0, 100).unwrap();
        let final_weight = grid.indicator(6.2);
        for (t, w) in grid.points().iter().zip(final_weight.iter()) {
            assert_eq!(*w, if *t < 6.2 { 0.0 } else { 1.0 });
        }
        assert_eq!(final_weight.iter().filter(|&&w| w == 1.0).count(), 23);
    }
}
