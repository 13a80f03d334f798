//! Minimizers for parametric registration.

pub mod trait_;
pub mod gradient_descent;
pub mod simplex;

pub use trait_::{FiniteDifferenceGradient, Minimizer, MinimizeOutcome, Problem};
pub use gradient_descent::GradientDescent;
pub use simplex::NelderMead;
