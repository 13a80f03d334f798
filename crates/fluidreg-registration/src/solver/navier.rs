//! Navier relaxation solver for velocity fields.
//!
//! Solves `mu * lap(v) + (mu + lambda) * grad(div(v)) = -f` on the pixel
//! grid with zero boundary values, by successive relaxation of the
//! five-plus-diagonal stencil. The sparse mode relaxes only voxels whose
//! residual is above a running threshold, propagating activity to the
//! eight neighbors of every updated voxel.

use crate::error::{RegistrationError, Result};
use fluidreg_core::field::Field2;
use fluidreg_core::spatial::{Bounds2, Vec2f};
use fluidreg_core::vectorfield::VectorField2;
use tracing::{debug, warn};

/// Precomputed stencil coefficients.
struct Stencil {
    a: f32,
    a_b: f32,
    b_4: f32,
    omega: f32,
}

/// Relaxation solver for the linear-elasticity operator.
#[derive(Debug, Clone)]
pub struct NavierSolver {
    pub mu: f32,
    pub lambda: f32,
    pub omega: f32,
    pub epsilon: f32,
    pub max_iter: usize,
    /// Relax only voxels with an above-threshold residual.
    pub sparse: bool,
}

impl Default for NavierSolver {
    fn default() -> Self {
        Self {
            mu: 1.0,
            lambda: 1.0,
            omega: 1.0,
            epsilon: 1e-4,
            max_iter: 100,
            sparse: false,
        }
    }
}

impl NavierSolver {
    pub fn new(mu: f32, lambda: f32) -> Result<Self> {
        if mu <= 0.0 || lambda < 0.0 {
            return Err(RegistrationError::invalid_configuration(format!(
                "elasticity parameters out of range: mu = {mu}, lambda = {lambda}"
            )));
        }
        Ok(Self {
            mu,
            lambda,
            ..Self::default()
        })
    }

    /// Premultiplier the driver applies to the force field.
    ///
    /// Folding the stencil normalization into the force keeps the relaxation
    /// update free of per-voxel divisions.
    pub fn force_scale(&self) -> f32 {
        let a = self.mu;
        let b = self.lambda + self.mu;
        1.0 / (4.0 * a + 2.0 * b)
    }

    fn stencil(&self) -> Stencil {
        let a = self.mu;
        let b = self.lambda + self.mu;
        let c = 1.0 / (4.0 * a + 2.0 * b);
        Stencil {
            a: a * c,
            a_b: (a + b) * c,
            b_4: 0.25 * b * c,
            omega: self.omega,
        }
    }

    /// Solve for the velocity `v` given the scaled force `b`.
    ///
    /// `b` is expected to be premultiplied by [`NavierSolver::force_scale`].
    /// `v` is cleared first; grids too small to hold the stencil margin stay
    /// at zero.
    pub fn solve(&self, b: &VectorField2, v: &mut VectorField2) -> Result<()> {
        if b.size() != v.size() {
            return Err(RegistrationError::SizeMismatch {
                expected: b.size(),
                actual: v.size(),
            });
        }
        v.clear();
        let size = b.size();
        if size.x < 5 || size.y < 5 {
            warn!(%size, "grid too small for relaxation stencil, returning zero field");
            return Ok(());
        }
        if self.sparse {
            self.solve_sparse(b, v)?;
        } else {
            self.solve_dense(b, v);
        }
        Ok(())
    }

    fn solve_dense(&self, b: &VectorField2, v: &mut VectorField2) {
        let size = b.size();
        let nx = size.x;
        let st = self.stencil();
        let bdata = b.data();
        let vdata = v.data_mut();

        let mut start_residuum = 0.0f64;
        for y in 2..size.y - 2 {
            for x in 2..nx - 2 {
                let idx = y * nx + x;
                start_residuum += relax_at(vdata, bdata[idx], idx, nx, &st) as f64;
            }
        }
        if start_residuum <= 0.0 {
            return;
        }

        let mut residuum = start_residuum;
        let mut i = 0;
        while i < self.max_iter && residuum / start_residuum > self.epsilon as f64 {
            residuum = 0.0;
            for y in 2..size.y - 2 {
                for x in 2..nx - 2 {
                    let idx = y * nx + x;
                    residuum += relax_at(vdata, bdata[idx], idx, nx, &st) as f64;
                }
            }
            i += 1;
            debug!(iteration = i, residuum, "relaxation sweep");
        }
    }

    fn solve_sparse(&self, b: &VectorField2, v: &mut VectorField2) -> Result<()> {
        let size = b.size();
        let nx = size.x;
        let n = size.product();
        let st = self.stencil();
        let bdata = b.data();
        let vdata = v.data_mut();

        let mut residua = Field2::<f32>::try_new(size)?;
        let mut update_get = Field2::<bool>::try_new(size)?;
        let mut update_set = Field2::<bool>::try_new(size)?;
        update_get.fill(true);

        let mut start_residuum = 0.0f64;
        for y in 2..size.y - 2 {
            for x in 2..nx - 2 {
                let idx = y * nx + x;
                let r = relax_at(vdata, bdata[idx], idx, nx, &st);
                residua.data_mut()[idx] = r;
                start_residuum += r as f64;
            }
        }
        if start_residuum <= 0.0 {
            return Ok(());
        }

        let mut residuum = start_residuum;
        let mut i = 0usize;
        loop {
            update_set.fill(false);
            let rthresh = (residuum / (n + i) as f64) as f32;
            i += 1;

            residuum = 0.0;
            for y in 2..size.y - 2 {
                for x in 2..nx - 2 {
                    let idx = y * nx + x;
                    if update_get.data()[idx] {
                        residua.data_mut()[idx] = relax_at(vdata, bdata[idx], idx, nx, &st);
                    }
                    let r = residua.data()[idx];
                    if r > rthresh {
                        mark_neighbors(update_set.data_mut(), idx, nx);
                    }
                    residuum += r as f64;
                }
            }
            debug!(iteration = i, residuum, "sparse relaxation sweep");

            std::mem::swap(&mut update_get, &mut update_set);

            if i >= self.max_iter || residuum / start_residuum <= self.epsilon as f64 {
                break;
            }
        }
        Ok(())
    }
}

/// One relaxation update; returns the norm of the applied correction.
#[inline]
fn relax_at(v: &mut [Vec2f], b: Vec2f, idx: usize, nx: usize, st: &Stencil) -> f32 {
    let up = idx + nx;
    let dn = idx - nx;

    let p = Vec2f::new(
        b.x + st.a_b * (v[idx - 1].x + v[idx + 1].x) + st.a * (v[up].x + v[dn].x),
        b.y + st.a_b * (v[dn].y + v[up].y) + st.a * (v[idx - 1].y + v[idx + 1].y),
    );
    let q = Vec2f::new(
        ((v[dn - 1].y + v[up + 1].y) - (v[dn + 1].y + v[up - 1].y)) * st.b_4,
        ((v[dn - 1].x + v[up + 1].x) - (v[dn + 1].x + v[up - 1].x)) * st.b_4,
    );

    let correction = (p + q - v[idx]) * st.omega;
    v[idx] += correction;
    correction.norm()
}

/// Mark the 3x3 neighborhood of `idx` for the next sparse sweep.
#[inline]
fn mark_neighbors(update: &mut [bool], idx: usize, nx: usize) {
    for &base in &[idx - nx, idx, idx + nx] {
        update[base - 1] = true;
        update[base] = true;
        update[base + 1] = true;
    }
}
