//! Preconditioned conjugate-gradient solver.
//!
//! Solves `(w + lambda1 * H1 + lambda2 * H2) m = f` for a scalar field on
//! the pixel grid, where `H1` and `H2` are the first- and second-order
//! smoothness operators of the membrane/thin-plate penalty. A two-voxel
//! border ring is held fixed; the interior is diagonally scaled by
//! `1 / sqrt(w + 6*lambda1 + 42*lambda2)`.

use crate::error::{RegistrationError, Result};
use fluidreg_core::error::CoreError;
use fluidreg_core::image::Image2;
use fluidreg_core::spatial::Bounds2;
use fluidreg_core::vectorfield::VectorField2;
use tracing::{debug, warn};

/// Fixed ring: two voxels on every side.
fn is_border(x: usize, y: usize, size: Bounds2) -> bool {
    x < 2 || x + 3 > size.x || y < 2 || y + 3 > size.y
}

/// Workspace vector with the allocation failure surfaced instead of aborting.
fn buffer<T: Clone>(n: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(n)
        .map_err(|_| RegistrationError::from(CoreError::AllocationFailure { size: n as u128 }))?;
    buf.resize(n, value);
    Ok(buf)
}

/// Result of one conjugate-gradient run.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub solution: Image2,
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Conjugate-gradient solver with diagonal preconditioning.
#[derive(Debug, Clone)]
pub struct CgSolver {
    pub lambda1: f64,
    pub lambda2: f64,
    /// Stop when the scaled residual norm falls below this.
    pub min_res: f64,
    /// Stop when the residual relative to the first run's start falls below this.
    pub rel_res: f64,
    pub max_iter: usize,
}

impl Default for CgSolver {
    fn default() -> Self {
        Self {
            lambda1: 2e5,
            lambda2: 2e6,
            min_res: 0.1,
            rel_res: 1e-4,
            max_iter: 100,
        }
    }
}

struct CgState {
    size: Bounds2,
    border: Vec<bool>,
    scale: Vec<f64>,
    scale2: Vec<f64>,
    lambda1: f64,
    lambda2: f64,
}

impl CgState {
    fn new(weight: &Image2, lambda1: f64, lambda2: f64) -> Result<Self> {
        let size = weight.size();
        let n = size.product();
        let mut border = buffer(n, false)?;
        let mut scale = buffer(n, 1.0f64)?;
        let mut scale2 = buffer(n, 0.0f64)?;
        for y in 0..size.y {
            for x in 0..size.x {
                let idx = y * size.x + x;
                if is_border(x, y, size) {
                    border[idx] = true;
                } else {
                    let s =
                        1.0 / (weight.data()[idx] as f64 + 6.0 * lambda1 + 42.0 * lambda2).sqrt();
                    scale[idx] = s;
                    scale2[idx] = s;
                }
            }
        }
        Ok(Self {
            size,
            border,
            scale,
            scale2,
            lambda1,
            lambda2,
        })
    }

    /// `result = A x` in the diagonally scaled system, using `help` as
    /// scratch space for the rescaled input.
    fn mult_a(&self, x: &[f64], help: &mut [f64], result: &mut [f64]) {
        let nx = self.size.x;
        for ((h, v), s) in help.iter_mut().zip(x).zip(&self.scale2) {
            *h = v * s;
        }
        for (i, res) in result.iter_mut().enumerate() {
            if self.border[i] {
                *res = x[i];
                continue;
            }
            let s1 = help[i - nx] + help[i - 1] + help[i + 1] + help[i + nx];
            let s2 = help[i - nx - 1] + help[i - nx + 1] + help[i + nx - 1] + help[i + nx + 1];
            let s3 = help[i - 2 * nx] + help[i - 2] + help[i + 2] + help[i + 2 * nx];
            *res = x[i]
                + ((s3 + 2.0 * s2 - 12.0 * s1) * self.lambda2 - self.lambda1 * s1)
                    * self.scale2[i];
        }
    }
}

impl CgSolver {
    /// Solve for a scalar field.
    ///
    /// `gain` is the initial estimate (and the pinned value on the border
    /// ring). `firstnormr0` carries the starting residual across repeated
    /// calls so the relative stopping criterion spans a whole
    /// multi-resolution run; initialize it to `1.0`.
    pub fn solve_scalar(
        &self,
        weight: &Image2,
        f: &Image2,
        gain: &Image2,
        firstnormr0: &mut f64,
    ) -> Result<CgOutcome> {
        let size = weight.size();
        if f.size() != size || gain.size() != size {
            return Err(RegistrationError::SizeMismatch {
                expected: size,
                actual: f.size(),
            });
        }
        if self.lambda1 < 0.0 || self.lambda2 < 0.0 {
            return Err(RegistrationError::invalid_configuration(
                "smoothness weights must not be negative",
            ));
        }
        let n = size.product();
        if size.x < 5 || size.y < 5 {
            warn!(%size, "grid too small for the conjugate-gradient stencil");
        }

        let state = CgState::new(weight, self.lambda1, self.lambda2)?;

        // Right-hand side and start vector in the scaled system.
        let mut b = buffer(n, 0.0f64)?;
        let mut v = buffer(n, 0.0f64)?;
        for i in 0..n {
            if state.border[i] {
                b[i] = -(gain.data()[i] as f64);
            } else {
                b[i] = -(f.data()[i] as f64) * state.scale[i];
            }
            v[i] = gain.data()[i] as f64 / state.scale[i];
        }

        let mut help = buffer(n, 0.0f64)?;
        let mut r = buffer(n, 0.0f64)?;
        state.mult_a(&v, &mut help, &mut r);
        let mut normr = {
            let mut acc = 0.0;
            for i in 0..n {
                r[i] += b[i];
                let sq = r[i] / state.scale[i];
                acc += sq * sq;
            }
            acc.sqrt()
        };
        if *firstnormr0 == 1.0 && normr > 1.0 {
            *firstnormr0 = normr;
        }

        let mut rho = buffer(n, 0.0f64)?;
        let mut g = buffer(n, 0.0f64)?;
        let mut ag = buffer(n, 0.0f64)?;
        let mut r1rho1 = 0.0f64;
        let mut iterations = 0usize;

        while normr >= self.min_res
            && iterations < self.max_iter
            && normr / *firstnormr0 > self.rel_res
        {
            iterations += 1;
            rho.copy_from_slice(&r);
            let r2rho2 = r1rho1;
            r1rho1 = r.iter().zip(&rho).map(|(a, b)| a * b).sum();
            let e = if iterations >= 2 { r1rho1 / r2rho2 } else { 0.0 };

            for i in 0..n {
                g[i] = -rho[i] + e * g[i];
            }
            state.mult_a(&g, &mut help, &mut ag);

            let sprod: f64 = g.iter().zip(&ag).map(|(a, b)| a * b).sum();
            if sprod == 0.0 {
                break;
            }
            let q = r1rho1 / sprod;

            let mut acc = 0.0;
            for i in 0..n {
                v[i] += q * g[i];
                r[i] += q * ag[i];
                let sq = r[i] / state.scale[i];
                acc += sq * sq;
            }
            normr = acc.sqrt();
            debug!(iterations, normr, "conjugate-gradient step");
        }

        let mut solution = Image2::new(size);
        for (o, (vi, si)) in solution.data_mut().iter_mut().zip(v.iter().zip(&state.scale)) {
            *o = (vi * si) as f32;
        }
        Ok(CgOutcome {
            solution,
            iterations,
            residual: normr,
            converged: normr <= 1.0,
        })
    }

    /// Solve both components of a force field against a shared weight image.
    ///
    /// Returns the displacement field and whether both components converged.
    pub fn solve_field(&self, weight: &Image2, force: &VectorField2) -> Result<(VectorField2, bool)> {
        let size = force.size();
        if weight.size() != size {
            return Err(RegistrationError::SizeMismatch {
                expected: size,
                actual: weight.size(),
            });
        }
        let zero = Image2::new(size);
        let mut fx = Image2::new(size);
        let mut fy = Image2::new(size);
        for (i, v) in force.iter().enumerate() {
            fx.data_mut()[i] = v.x;
            fy.data_mut()[i] = v.y;
        }

        let mut first_x = 1.0;
        let mut first_y = 1.0;
        let out_x = self.solve_scalar(weight, &fx, &zero, &mut first_x)?;
        let out_y = self.solve_scalar(weight, &fy, &zero, &mut first_y)?;

        let mut field = VectorField2::new(size);
        for (i, v) in field.iter_mut().enumerate() {
            v.x = out_x.solution.data()[i];
            v.y = out_y.solution.data()[i];
        }
        Ok((field, out_x.converged && out_y.converged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_border_predicate() {
        let size = Bounds2::new(10, 10);
        assert!(is_border(0, 5, size));
        assert!(is_border(1, 5, size));
        assert!(!is_border(2, 5, size));
        assert!(!is_border(7, 5, size));
        assert!(is_border(8, 5, size));
        assert!(is_border(5, 9, size));
    }

    #[test]
    fn test_zero_force_keeps_zero_solution() {
        let size = Bounds2::new(12, 12);
        let weight = Image2::from_vec(size, vec![1.0; size.product()]);
        let f = Image2::new(size);
        let gain = Image2::new(size);
        let solver = CgSolver::default();
        let mut first = 1.0;
        let out = solver.solve_scalar(&weight, &f, &gain, &mut first).unwrap();
        assert!(out.converged);
        assert!(out.solution.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_solution_satisfies_scaled_system() {
        // Verify A * v_scaled + b ~ 0 by checking the reported residual.
        let size = Bounds2::new(16, 16);
        let weight = Image2::from_vec(size, vec![1.0; size.product()]);
        let mut f = Image2::new(size);
        f[(8, 8)] = 50.0;
        f[(9, 8)] = -25.0;
        let gain = Image2::new(size);
        let solver = CgSolver {
            lambda1: 1.0,
            lambda2: 1.0,
            min_res: 1e-6,
            rel_res: 1e-10,
            max_iter: 500,
        };
        let mut first = 1.0;
        let out = solver.solve_scalar(&weight, &f, &gain, &mut first).unwrap();
        assert!(out.iterations > 0);
        assert!(out.residual < 1e-3, "residual {}", out.residual);
        // The point source must produce a response.
        assert!(out.solution[(8, 8)].abs() > 0.0);
    }

    #[test]
    fn test_field_adapter_solves_both_components() {
        use fluidreg_core::spatial::Vec2f;

        let size = Bounds2::new(16, 16);
        let weight = Image2::from_vec(size, vec![1.0; size.product()]);
        let mut force = VectorField2::new(size);
        force[(8, 8)] = Vec2f::new(50.0, -30.0);
        let solver = CgSolver {
            lambda1: 1.0,
            lambda2: 1.0,
            min_res: 1e-6,
            rel_res: 1e-10,
            max_iter: 500,
        };
        let (field, _converged) = solver.solve_field(&weight, &force).unwrap();
        assert!(field[(8, 8)].x.abs() > 0.0);
        assert!(field[(8, 8)].y.abs() > 0.0);
        assert!(field[(8, 8)].x * field[(8, 8)].y < 0.0);
    }

    #[test]
    fn test_oversized_workspace_surfaces_allocation_failure() {
        let r = buffer(usize::MAX, 0.0f64);
        assert!(matches!(
            r,
            Err(RegistrationError::Core(CoreError::AllocationFailure { .. }))
        ));
    }

    #[test]
    fn test_negative_smoothness_rejected() {
        let size = Bounds2::new(8, 8);
        let img = Image2::new(size);
        let solver = CgSolver {
            lambda1: -1.0,
            ..CgSolver::default()
        };
        let mut first = 1.0;
        assert!(solver.solve_scalar(&img, &img, &img, &mut first).is_err());
    }
}
