//
// Crane pendulum: cart on a rail carrying a suspended load, driven by a
// horizontal force.
//

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

use crate::common::{CraneError, CraneResult, CraneState, MotionModel, SolutionTable, TimeGrid};
use crate::config::MpcConfig;
use crate::model::definition::{Model, ModelBuilder, VarRef, VarSpec};
use crate::simulation::integrator::rk4;

/// Physical parameters of the crane pendulum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraneParams {
    /// [kg] cart mass
    pub m1: f64,
    /// [kg] pendulum mass
    pub m2: f64,
    /// [m] rod length
    pub l: f64,
    /// [m/s^2] gravity
    pub g: f64,
}

impl Default for CraneParams {
    fn default() -> Self {
        Self {
            m1: 1.0,
            m2: 0.3,
            l: 0.5,
            g: 9.8,
        }
    }
}

impl CraneParams {
    pub fn validate(&self) -> CraneResult<()> {
        if !(self.m1 > 0.0) {
            return Err(CraneError::InvalidParameter(format!(
                "cart mass m1 = {} must be positive",
                self.m1
            )));
        }
        if !(self.m2 >= 0.0) {
            return Err(CraneError::InvalidParameter(format!(
                "pendulum mass m2 = {} must be non-negative",
                self.m2
            )));
        }
        if !(self.l > 0.0) {
            return Err(CraneError::InvalidParameter(format!(
                "rod length l = {} must be positive",
                self.l
            )));
        }
        if !self.g.is_finite() {
            return Err(CraneError::InvalidParameter("gravity must be finite".to_string()));
        }
        Ok(())
    }

    /// `m1 + m2*sin(theta)^2`, never below `m1`
    pub fn den(&self, theta: f64) -> f64 {
        self.m1 + self.m2 * theta.sin().powi(2)
    }
}

/// Nonlinear crane pendulum plant
#[derive(Debug, Clone)]
pub struct CranePendulum {
    params: CraneParams,
}

impl CranePendulum {
    pub fn new(params: CraneParams) -> CraneResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &CraneParams {
        &self.params
    }

    /// d/dt of `[y, v, theta, q]` under force `u`
    pub fn derivatives(&self, state: &CraneState, u: f64) -> Vector4<f64> {
        let CraneParams { m1, m2, l, g } = self.params;
        let (sin, cos) = state.theta.sin_cos();
        let q2 = state.q * state.q;
        let den = self.params.den(state.theta);

        let dv = (u - m2 * sin * (l * q2 - g * cos)) / den;
        let dq = (u * cos - m2 * l * q2 * cos * sin + (m1 + m2) * g * sin) / (l * den);
        Vector4::new(state.v, dv, state.q, dq)
    }

    /// Open-loop response to a force held constant over each grid interval
    pub fn simulate(
        &self,
        initial: CraneState,
        grid: &TimeGrid,
        forces: &[f64],
    ) -> CraneResult<Vec<CraneState>> {
        if forces.len() != grid.len() {
            return Err(CraneError::InvalidParameter(format!(
                "{} forces for {} time points",
                forces.len(),
                grid.len()
            )));
        }
        let mut states = Vec::with_capacity(grid.len());
        states.push(initial);
        for k in 0..grid.len() - 1 {
            let next = self.propagate(&states[k], &forces[k], grid.step(k));
            if !next.is_finite() {
                return Err(CraneError::NumericalError(format!(
                    "crane state diverged at t = {:.3}",
                    grid.points()[k + 1]
                )));
            }
            states.push(next);
        }
        Ok(states)
    }
}

impl MotionModel for CranePendulum {
    type State = CraneState;
    type Control = f64;

    fn propagate(&self, state: &CraneState, control: &f64, dt: f64) -> CraneState {
        let x = rk4(&state.to_vector(), 0.0, dt, |_, x| {
            self.derivatives(&CraneState::from(*x), *control)
        });
        CraneState::from(x)
    }
}

/// Typed handles for the crane variables of a built model
#[derive(Debug, Clone, PartialEq)]
pub struct CraneHandles {
    pub u: VarRef,
    pub y: VarRef,
    pub v: VarRef,
    pub theta: VarRef,
    pub q: VarRef,
}

/// Full nonlinear crane pendulum with a bounded cart force
pub fn crane_pendulum_model(
    params: &CraneParams,
    control_bounds: [f64; 2],
) -> CraneResult<(Model, CraneHandles)> {
    params.validate()?;

    let mut b = ModelBuilder::new("crane_pendulum");
    b.comment("crane pendulum model");
    let m1 = b.param("m1", params.m1, "mass of the cart");
    let m2 = b.param("m2", params.m2, "mass of the pendulum");
    let l = b.param("l", params.l, "length of the pendulum rod");
    let g = b.param("g", params.g, "gravity");

    let [lo, hi] = control_bounds;
    let u = b.control("u", VarSpec::new(0.0).bounds(lo, hi).note("force on the cart"));
    let y = b.state("y", VarSpec::new(0.0).note("cart position"));
    let v = b.state("v", VarSpec::new(0.0).note("cart velocity"));
    let theta = b.state("theta", VarSpec::new(0.0).note("pendulum angle"));
    let q = b.state("q", VarSpec::new(0.0).note("pendulum angular velocity"));

    let sin = || theta.expr().sin();
    let cos = || theta.expr().cos();
    let den = b.intermediate("den", m1.expr() + m2.expr() * sin().powi(2), "");

    b.equation(&y, v.expr(), "cart velocity");
    b.equation(
        &v,
        (u.expr() - m2.expr() * sin() * (l.expr() * q.expr().powi(2) - g.expr() * cos()))
            / den.expr(),
        "cart acceleration",
    );
    b.equation(&theta, q.expr(), "pendulum angular velocity");
    b.equation(
        &q,
        (u.expr() * cos() - m2.expr() * l.expr() * q.expr().powi(2) * cos() * sin()
            + (m1.expr() + m2.expr()) * g.expr() * sin())
            / (l.expr() * den.expr()),
        "pendulum angular acceleration",
    );

    let model = b.build()?;
    Ok((model, CraneHandles { u, y, v, theta, q }))
}

/// Linearized crane that must come to rest at the origin by the settle time.
///
/// `final` is 0 before `settle_time` and 1 from then on, so the four state
/// penalties only count once the load has to be settled. The force penalty
/// applies over the whole horizon.
pub fn linearized_crane_model(config: &MpcConfig) -> CraneResult<(Model, CraneHandles)> {
    config.validate()?;
    let grid = TimeGrid::linspace(0.0, config.horizon, config.samples)?;
    let settle_weight = grid.indicator(config.settle_time);

    let mut b = ModelBuilder::new("crane_mpc");
    b.comment("linearized crane pendulum");
    b.time(grid);
    let m1 = b.param("m1", config.cart_mass, "mass of the cart");
    let m2 = b.param("m2", config.pendulum_mass, "mass of the load");
    let settled = b.param("final", settle_weight, "1 once the load must be at rest");

    let mut force = VarSpec::new(0.0).note("force on the cart");
    if let Some([lo, hi]) = config.control_bounds {
        force = force.bounds(lo, hi);
    }
    let u = b.control("u", force);
    let y = b.state("y", VarSpec::new(config.initial_position).note("cart position"));
    let v = b.state("v", VarSpec::new(0.0).note("cart velocity"));
    let theta = b.state("theta", VarSpec::new(0.0).note("load angle"));
    let q = b.state("q", VarSpec::new(0.0).note("load angular velocity"));

    let epsilon = b.intermediate("epsilon", m2.expr() / (m1.expr() + m2.expr()), "mass ratio");

    b.equation(&y, v.expr(), "");
    b.equation(&v, epsilon.expr() * theta.expr() + u.expr(), "");
    b.equation(&theta, q.expr(), "");
    b.equation(&q, -theta.expr() - u.expr(), "");

    for state in [&y, &v, &theta, &q] {
        let weight = if config.state_weight == 1.0 {
            settled.expr()
        } else {
            config.state_weight * settled.expr()
        };
        b.minimize(weight, state.expr());
    }
    b.minimize(config.effort_weight, u.expr());

    let model = b.build()?;
    Ok((model, CraneHandles { u, y, v, theta, q }))
}

/// Crane trajectory pulled out of a solution table by typed handle
#[derive(Debug, Clone, PartialEq)]
pub struct CraneTrajectory {
    pub time: Vec<f64>,
    pub u: Vec<f64>,
    pub y: Vec<f64>,
    pub v: Vec<f64>,
    pub theta: Vec<f64>,
    pub q: Vec<f64>,
}

impl CraneTrajectory {
    pub fn from_solution(table: &SolutionTable, handles: &CraneHandles) -> CraneResult<Self> {
        let column = |handle: &VarRef| table.require(handle.name()).map(|v| v.to_vec());
        Ok(Self {
            time: table.time().to_vec(),
            u: column(&handles.u)?,
            y: column(&handles.y)?,
            v: column(&handles.v)?,
            theta: column(&handles.theta)?,
            q: column(&handles.q)?,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn state(&self, k: usize) -> CraneState {
        CraneState::new(self.y[k], self.v[k], self.theta[k], self.q[k])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definition::VariableRole;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn model_rates(model: &Model, h: &CraneHandles, s: &CraneState, u: f64) -> Vector4<f64> {
        let mut vars = model.initial_values();
        vars[h.u.index()] = u;
        vars[h.y.index()] = s.y;
        vars[h.v.index()] = s.v;
        vars[h.theta.index()] = s.theta;
        vars[h.q.index()] = s.q;
        let rates = model.derivatives(&model.parameter_values(0), &vars);
        Vector4::new(
            rates[h.y.index()],
            rates[h.v.index()],
            rates[h.theta.index()],
            rates[h.q.index()],
        )
    }

    #[test]
    fn test_den_never_below_cart_mass() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let params = CraneParams {
                m1: rng.gen_range(0.01..20.0),
                m2: rng.gen_range(0.0..20.0),
                ..CraneParams::default()
            };
            let theta = rng.gen_range(-50.0..50.0);
            let den = params.den(theta);
            assert!(den >= params.m1);
            assert!(den > 0.0);
        }
    }

    #[test]
    fn test_upright_rest_is_equilibrium() {
        let plant = CranePendulum::new(CraneParams::default()).unwrap();
        let rates = plant.derivatives(&CraneState::new(0.7, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(rates, Vector4::zeros());

        let (model, handles) = crane_pendulum_model(&CraneParams::default(), [-10.0, 10.0]).unwrap();
        let rates = model_rates(&model, &handles, &CraneState::rest(), 0.0);
        assert_eq!(rates, Vector4::zeros());
    }

    #[test]
    fn test_declared_model_matches_closed_form() {
        let params = CraneParams::default();
        let plant = CranePendulum::new(params).unwrap();
        let (model, handles) = crane_pendulum_model(&params, [-10.0, 10.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let s = CraneState::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.2..3.2),
                rng.gen_range(-5.0..5.0),
            );
            let u = rng.gen_range(-10.0..10.0);
            let expected = plant.derivatives(&s, u);
            let actual = model_rates(&model, &handles, &s, u);
            for i in 0..4 {
                assert_relative_eq!(actual[i], expected[i], epsilon = 1e-10, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_crane_document_equations() {
        let (model, handles) = crane_pendulum_model(&CraneParams::default(), [-10.0, 10.0]).unwrap();
        let doc = model.to_document();
        let text = doc.text();
        assert!(text.contains("m2 = 0.3 ! mass of the pendulum"));
        assert!(text.contains("u = 0, >=-10, <=10 ! force on the cart"));
        assert!(text.contains("den = m1 + m2*sin(theta)^2"));
        assert!(text.contains("$y = v"));
        assert!(text.contains("$v = (u - m2*sin(theta)*(l*q^2 - g*cos(theta)))/den"));
        assert!(text.contains("$theta = q"));
        assert!(text.contains(
            "$q = (u*cos(theta) - m2*l*q^2*cos(theta)*sin(theta) + (m1 + m2)*g*sin(theta))/(l*den)"
        ));
        assert_eq!(handles.u.role(), VariableRole::Control);
        assert_eq!(handles.theta.role(), VariableRole::State);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = CraneParams { m1: 0.0, ..CraneParams::default() };
        assert!(CranePendulum::new(bad).is_err());
        assert!(crane_pendulum_model(&bad, [-10.0, 10.0]).is_err());
        let bad = CraneParams { l: -1.0, ..CraneParams::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_hanging_load_oscillates_without_force() {
        // theta = pi hangs below the cart; a small push must stay bounded
        let plant = CranePendulum::new(CraneParams::default()).unwrap();
        let grid = TimeGrid::linspace(0.0, 2.0, 201).unwrap();
        let start = CraneState::new(0.0, 0.0, std::f64::consts::PI + 0.05, 0.0);
        let states = plant.simulate(start, &grid, &vec![0.0; grid.len()]).unwrap();
        assert_eq!(states.len(), 201);
        for s in &states {
            assert!((s.theta - std::f64::consts::PI).abs() < 0.1);
        }
    }

    #[test]
    fn test_linearized_model_layout() {
        let (model, handles) = linearized_crane_model(&MpcConfig::default()).unwrap();
        assert_eq!(model.time().unwrap().len(), 100);
        assert_eq!(model.objectives().len(), 5);
        assert_eq!(model.initial_values()[handles.y.index()], -1.0);

        let text = model.to_document().text().to_string();
        assert!(text.contains("epsilon = m2/(m1 + m2)"));
        assert!(text.contains("$v = epsilon*theta + u"));
        assert!(text.contains("$q = -theta - u"));
        assert!(text.contains("minimize final*y^2"));
        assert!(text.contains("minimize 0.001*u^2"));
    }

    #[test]
    fn test_trajectory_from_solution() {
        let mut table = SolutionTable::new(vec![0.0, 1.0]);
        for name in ["u", "y", "v", "theta", "q"] {
            table.insert(name, vec![1.0, 2.0]).unwrap();
        }
        let (_, handles) = crane_pendulum_model(&CraneParams::default(), [-10.0, 10.0]).unwrap();
        let traj = CraneTrajectory::from_solution(&table, &handles).unwrap();
        assert_eq!(traj.len(), 2);
        assert_eq!(traj.state(1), CraneState::new(2.0, 2.0, 2.0, 2.0));

        let partial = SolutionTable::new(vec![0.0]);
        assert!(CraneTrajectory::from_solution(&partial, &handles).is_err());
    }
}
