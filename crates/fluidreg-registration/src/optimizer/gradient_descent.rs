//! Gradient descent with adaptive step size.

use crate::error::{RegistrationError, Result};
use crate::optimizer::trait_::{Minimizer, MinimizeOutcome, Problem};
use tracing::debug;

/// Steepest descent with backtracking.
///
/// Each iteration takes a step along the negative gradient. A successful
/// step grows the step size, a failed one shrinks it and retries with the
/// same gradient until the step floor is reached.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    pub max_iter: usize,
    pub initial_step: f64,
    pub min_step: f64,
    pub gtol: f64,
    pub ftol: f64,
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self {
            max_iter: 100,
            initial_step: 0.1,
            min_step: 1e-7,
            gtol: 1e-5,
            ftol: 1e-7,
        }
    }
}

impl Minimizer for GradientDescent {
    fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<MinimizeOutcome> {
        if x0.len() != problem.len() {
            return Err(RegistrationError::optimizer(format!(
                "start vector has {} entries, problem has {} parameters",
                x0.len(),
                problem.len()
            )));
        }
        let mut x = x0.to_vec();
        let mut grad = vec![0.0; x.len()];
        let mut step = self.initial_step;
        let mut value = problem.value_and_gradient(&x, &mut grad)?;
        let mut converged = false;
        let mut iter = 0;

        while iter < self.max_iter {
            iter += 1;
            let gnorm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if gnorm < self.gtol {
                converged = true;
                break;
            }

            // Backtrack until the step improves the objective.
            let mut accepted = false;
            while step >= self.min_step {
                let candidate: Vec<f64> = x
                    .iter()
                    .zip(&grad)
                    .map(|(xi, gi)| xi - step * gi)
                    .collect();
                let cand_value = problem.value(&candidate)?;
                if cand_value < value {
                    let improvement = (value - cand_value) / value.abs().max(1.0);
                    x = candidate;
                    value = problem.value_and_gradient(&x, &mut grad)?;
                    step *= 1.5;
                    accepted = true;
                    if improvement < self.ftol {
                        converged = true;
                    }
                    break;
                }
                step *= 0.5;
            }
            debug!(iter, value, step, "gradient descent step");
            // A rejected line search with a live gradient is a stall, not
            // convergence; the flag stays false unless a tolerance was met.
            if !accepted || converged {
                break;
            }
        }

        Ok(MinimizeOutcome {
            x,
            value,
            iterations: iter,
            converged,
        })
    }

    fn name(&self) -> &'static str {
        "gradient-descent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic {
        center: Vec<f64>,
    }

    impl Problem for Quadratic {
        fn len(&self) -> usize {
            self.center.len()
        }

        fn value(&mut self, x: &[f64]) -> Result<f64> {
            Ok(x.iter()
                .zip(&self.center)
                .map(|(xi, ci)| (xi - ci) * (xi - ci))
                .sum())
        }

        fn value_and_gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
            for ((g, xi), ci) in grad.iter_mut().zip(x).zip(&self.center) {
                *g = 2.0 * (xi - ci);
            }
            self.value(x)
        }
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut problem = Quadratic {
            center: vec![1.0, -2.0, 0.5],
        };
        let outcome = GradientDescent::default()
            .minimize(&mut problem, &[0.0, 0.0, 0.0])
            .unwrap();
        assert!(outcome.converged);
        for (xi, ci) in outcome.x.iter().zip(&problem.center) {
            assert!((xi - ci).abs() < 1e-3);
        }
    }

    #[test]
    fn test_stalled_line_search_is_not_convergence() {
        // Symmetric quartic: from x = 1 the only admissible step of 0.5
        // along the gradient of 4 lands on the mirror point with the same
        // value, so no step can be accepted.
        struct Quartic;
        impl Problem for Quartic {
            fn len(&self) -> usize {
                1
            }
            fn value(&mut self, x: &[f64]) -> Result<f64> {
                Ok(x[0].powi(4))
            }
            fn value_and_gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
                grad[0] = 4.0 * x[0].powi(3);
                self.value(x)
            }
        }

        let gd = GradientDescent {
            initial_step: 0.5,
            min_step: 0.5,
            ..GradientDescent::default()
        };
        let outcome = gd.minimize(&mut Quartic, &[1.0]).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.x, vec![1.0]);
    }

    #[test]
    fn test_rejects_wrong_start_length() {
        let mut problem = Quadratic {
            center: vec![0.0, 0.0],
        };
        assert!(GradientDescent::default()
            .minimize(&mut problem, &[0.0])
            .is_err());
    }
}
