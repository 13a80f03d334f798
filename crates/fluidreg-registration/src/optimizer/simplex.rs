//! Nelder-Mead downhill simplex.

use crate::error::{RegistrationError, Result};
use crate::optimizer::trait_::{Minimizer, MinimizeOutcome, Problem};
use tracing::debug;

/// Derivative-free simplex minimizer.
///
/// Useful for cost functions whose analytic gradient is unavailable or
/// unreliable; convergence is judged on the spread of the simplex values.
#[derive(Debug, Clone)]
pub struct NelderMead {
    pub max_iter: usize,
    pub tol: f64,
    /// Offset used to build the initial simplex around the start vector.
    pub initial_spread: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tol: 1e-7,
            initial_spread: 0.1,
        }
    }
}

const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

impl Minimizer for NelderMead {
    fn minimize(&self, problem: &mut dyn Problem, x0: &[f64]) -> Result<MinimizeOutcome> {
        let n = problem.len();
        if x0.len() != n {
            return Err(RegistrationError::optimizer(format!(
                "start vector has {} entries, problem has {} parameters",
                x0.len(),
                n
            )));
        }
        if n == 0 {
            return Err(RegistrationError::optimizer("problem has no parameters"));
        }

        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(x0.to_vec());
        for i in 0..n {
            let mut vertex = x0.to_vec();
            vertex[i] += self.initial_spread;
            simplex.push(vertex);
        }
        let mut values = Vec::with_capacity(n + 1);
        for vertex in &simplex {
            values.push(problem.value(vertex)?);
        }

        let mut iter = 0;
        let mut converged = false;
        while iter < self.max_iter {
            iter += 1;

            // Order the simplex, best first.
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            let best = order[0];
            let worst = order[n];
            let second_worst = order[n - 1];

            if (values[worst] - values[best]).abs()
                < self.tol * (values[best].abs() + self.tol)
            {
                converged = true;
                break;
            }

            // Centroid of all vertices but the worst.
            let mut centroid = vec![0.0; n];
            for (idx, vertex) in simplex.iter().enumerate() {
                if idx == worst {
                    continue;
                }
                for (c, v) in centroid.iter_mut().zip(vertex) {
                    *c += v / n as f64;
                }
            }

            let reflect: Vec<f64> = centroid
                .iter()
                .zip(&simplex[worst])
                .map(|(c, w)| c + ALPHA * (c - w))
                .collect();
            let reflect_value = problem.value(&reflect)?;

            if reflect_value < values[best] {
                let expand: Vec<f64> = centroid
                    .iter()
                    .zip(&simplex[worst])
                    .map(|(c, w)| c + GAMMA * (c - w))
                    .collect();
                let expand_value = problem.value(&expand)?;
                if expand_value < reflect_value {
                    simplex[worst] = expand;
                    values[worst] = expand_value;
                } else {
                    simplex[worst] = reflect;
                    values[worst] = reflect_value;
                }
            } else if reflect_value < values[second_worst] {
                simplex[worst] = reflect;
                values[worst] = reflect_value;
            } else {
                let contract: Vec<f64> = centroid
                    .iter()
                    .zip(&simplex[worst])
                    .map(|(c, w)| c + RHO * (w - c))
                    .collect();
                let contract_value = problem.value(&contract)?;
                if contract_value < values[worst] {
                    simplex[worst] = contract;
                    values[worst] = contract_value;
                } else {
                    // Shrink everything towards the best vertex.
                    let best_vertex = simplex[best].clone();
                    for (idx, vertex) in simplex.iter_mut().enumerate() {
                        if idx == best {
                            continue;
                        }
                        for (v, b) in vertex.iter_mut().zip(&best_vertex) {
                            *v = b + SIGMA * (*v - b);
                        }
                        values[idx] = problem.value(vertex)?;
                    }
                }
            }
            debug!(iter, best = values[best], "simplex step");
        }

        let best_idx = (0..=n)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        Ok(MinimizeOutcome {
            x: simplex.swap_remove(best_idx),
            value: values[best_idx],
            iterations: iter,
            converged,
        })
    }

    fn name(&self) -> &'static str {
        "simplex"
    }
}
