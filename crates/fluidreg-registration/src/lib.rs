pub mod cost;
pub mod error;
pub mod fluid;
pub mod optimizer;
pub mod parametric;
pub mod registry;
pub mod solver;
pub mod timestep;

pub use cost::{Cost2, CostList, LnccCost, SsdCost, TagAxis, TaggedSsdCost};
pub use error::{RegistrationError, Result};
pub use fluid::{FluidConfig, FluidRegistration};
pub use optimizer::{
    FiniteDifferenceGradient, GradientDescent, Minimizer, MinimizeOutcome, NelderMead, Problem,
};
pub use parametric::{ParametricRegistration, RunOutcome};
pub use registry::{create_minimizer, create_transform_factory};
pub use solver::{CgSolver, NavierSolver};
pub use timestep::{DirectTimeStep, FluidTimeStep, StepSize, TimeStep};
