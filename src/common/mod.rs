//! Common types, traits, and error definitions for crane_control
//!
//! This module provides the foundational building blocks shared by the
//! model, the solvers and the pipelines.

pub mod types;
pub mod traits;
pub mod error;
pub mod solution;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use solution::*;
