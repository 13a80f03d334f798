//! Minimization problem and minimizer traits.

use crate::error::Result;

/// A differentiable scalar objective over a parameter vector.
///
/// Drivers implement this by wiring a cost list and a transform together;
/// the gradient is obtained by translating the per-pixel force field into
/// parameter space.
pub trait Problem {
    /// Number of parameters.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objective value at `x`.
    fn value(&mut self, x: &[f64]) -> Result<f64>;

    /// Objective value at `x`, writing the gradient into `grad`.
    fn value_and_gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<f64>;
}

/// Central-difference gradient on top of a value-only objective.
///
/// Lets gradient-based minimizers drive cost terms that have no analytic
/// force, at the price of `2 * len()` extra evaluations per gradient.
pub struct FiniteDifferenceGradient<P> {
    inner: P,
    step: f64,
}

impl<P: Problem> FiniteDifferenceGradient<P> {
    pub fn new(inner: P, step: f64) -> Self {
        Self { inner, step }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: Problem> Problem for FiniteDifferenceGradient<P> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn value(&mut self, x: &[f64]) -> Result<f64> {
        self.inner.value(x)
    }

    fn value_and_gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
        let mut probe = x.to_vec();
        for i in 0..x.len() {
            probe[i] = x[i] + self.step;
            let hi = self.inner.value(&probe)?;
            probe[i] = x[i] - self.step;
            let lo = self.inner.value(&probe)?;
            probe[i] = x[i];
            grad[i] = (hi - lo) / (2.0 * self.step);
        }
        self.inner.value(x)
    }
}

/// Result of a minimization run.
#[derive(Debug, Clone)]
pub struct MinimizeOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Iterative minimizer over a [`Problem`].
pub trait Minimizer: Send + Sync {
    /// Minimize starting from `x0`.
    fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<MinimizeOutcome>;

    /// Identifier of the method.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ValueOnly;

    impl Problem for ValueOnly {
        fn len(&self) -> usize {
            2
        }

        fn value(&mut self, x: &[f64]) -> Result<f64> {
            Ok((x[0] - 2.0).powi(2) + 3.0 * (x[1] + 1.0).powi(2))
        }

        fn value_and_gradient(&mut self, _x: &[f64], _grad: &mut [f64]) -> Result<f64> {
            unimplemented!("wrapped by FiniteDifferenceGradient")
        }
    }

    #[test]
    fn test_finite_difference_gradient_of_quadratic() {
        let mut problem = FiniteDifferenceGradient::new(ValueOnly, 1e-5);
        let x = [1.0, 0.5];
        let mut grad = [0.0; 2];
        let value = problem.value_and_gradient(&x, &mut grad).unwrap();
        assert!((value - (1.0 + 3.0 * 2.25)).abs() < 1e-9);
        assert!((grad[0] + 2.0).abs() < 1e-6);
        assert!((grad[1] - 9.0).abs() < 1e-6);
    }
}
