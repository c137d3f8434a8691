//! Dynamic model declaration and its APM text form

pub mod crane;
pub mod definition;
pub mod document;
pub mod expr;

pub use crane::{
    crane_pendulum_model, linearized_crane_model, CraneHandles, CranePendulum, CraneParams,
    CraneTrajectory,
};
pub use definition::{Model, ModelBuilder, VarRef, VarSpec, VariableRole};
pub use document::ModelDocument;
pub use expr::Expr;
