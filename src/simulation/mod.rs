pub mod integrator;
pub mod simulator;

pub use integrator::{rk4, rk4_dynamic};
pub use simulator::Simulator;
