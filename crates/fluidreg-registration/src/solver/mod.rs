//! Linear solvers for vector-field regularization.

pub mod cg;
pub mod navier;

pub use cg::{CgOutcome, CgSolver};
pub use navier::NavierSolver;
