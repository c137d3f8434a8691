//! Local optimal control
//!
//! Bounded least squares and the IMODE-driven solver built on it.

pub mod least_squares;
pub mod mpc;

pub use least_squares::{minimize_bounded, LeastSquaresOptions, LeastSquaresReport};
pub use mpc::{LocalSolution, LocalSolver, SolveMode, SolverOptions};
