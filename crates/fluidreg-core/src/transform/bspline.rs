//! Free-form deformation on a cubic B-spline lattice.

use crate::error::{CoreError, Result};
use crate::field::Field2;
use crate::spatial::{Bounds2, Mat2f, Vec2f};
use crate::transform::grid::GridTransform2;
use crate::transform::trait_::{Transform2, TransformFactory};
use crate::vectorfield::VectorField2;

/// Cubic B-spline weights at fractional position `t` in `[0, 1)`.
fn weights(t: f32) -> [f32; 4] {
    let omt = 1.0 - t;
    [
        omt * omt * omt / 6.0,
        (3.0 * t * t * t - 6.0 * t * t + 4.0) / 6.0,
        (-3.0 * t * t * t + 3.0 * t * t + 3.0 * t + 1.0) / 6.0,
        t * t * t / 6.0,
    ]
}

/// First derivative of the cubic B-spline weights with respect to `t`.
fn dweights(t: f32) -> [f32; 4] {
    let omt = 1.0 - t;
    [
        -omt * omt / 2.0,
        (3.0 * t * t - 4.0 * t) / 2.0,
        (-3.0 * t * t + 2.0 * t + 1.0) / 2.0,
        t * t / 2.0,
    ]
}

/// Free-form deformation, `T(x) = x + f(x)` with `f` a cubic tensor-product
/// spline over a coarse coefficient lattice.
///
/// The knot spacing (`rate`) is in pixels; one extra ring of coefficients on
/// each side keeps the full support available at the image border. The
/// parameter vector interleaves `[cx, cy]` per lattice node in row-major
/// order.
#[derive(Debug, Clone)]
pub struct BsplineTransform2 {
    size: Bounds2,
    rate: Vec2f,
    coeff: Field2<Vec2f>,
}

impl BsplineTransform2 {
    pub fn new(size: Bounds2, rate: f32) -> Result<Self> {
        Self::with_rates(size, Vec2f::new(rate, rate))
    }

    pub fn with_rates(size: Bounds2, rate: Vec2f) -> Result<Self> {
        if rate.x < 1.0 || rate.y < 1.0 {
            return Err(CoreError::invalid_configuration(format!(
                "spline rate must be at least one pixel, got ({}, {})",
                rate.x, rate.y
            )));
        }
        let lattice = Self::lattice_size(size, rate);
        Ok(Self {
            size,
            rate,
            coeff: Field2::from_vec(lattice, vec![Vec2f::zeros(); lattice.product()]),
        })
    }

    fn lattice_size(size: Bounds2, rate: Vec2f) -> Bounds2 {
        let nx = ((size.x.max(1) - 1) as f32 / rate.x).floor() as usize + 4;
        let ny = ((size.y.max(1) - 1) as f32 / rate.y).floor() as usize + 4;
        Bounds2::new(nx, ny)
    }

    /// Lattice extent of the coefficient grid.
    pub fn lattice(&self) -> Bounds2 {
        self.coeff.size()
    }

    /// Support along one axis: base lattice index and fractional offset.
    fn support(pos: f32, rate: f32, lattice: usize) -> (usize, f32) {
        let u = pos / rate;
        let i = u.floor();
        let t = u - i;
        // c_{i-1}..c_{i+2} live at lattice columns i..i+3.
        let base = (i as isize).clamp(0, lattice as isize - 4) as usize;
        (base, t)
    }

    fn displacement(&self, p: Vec2f) -> Vec2f {
        let lattice = self.coeff.size();
        let (bx, tx) = Self::support(p.x, self.rate.x, lattice.x);
        let (by, ty) = Self::support(p.y, self.rate.y, lattice.y);
        let wx = weights(tx);
        let wy = weights(ty);
        let mut f = Vec2f::zeros();
        for (j, &wyj) in wy.iter().enumerate() {
            let row = self.coeff.row(by + j);
            for (i, &wxi) in wx.iter().enumerate() {
                f += row[bx + i] * (wxi * wyj);
            }
        }
        f
    }
}

impl Transform2 for BsplineTransform2 {
    fn map(&self, p: Vec2f) -> Vec2f {
        p + self.displacement(p)
    }

    fn size(&self) -> Bounds2 {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        2 * self.coeff.len()
    }

    fn parameters(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.degrees_of_freedom());
        for c in self.coeff.iter() {
            out.push(c.x);
            out.push(c.y);
        }
        out
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.degrees_of_freedom() {
            return Err(CoreError::invalid_configuration(format!(
                "spline lattice {} expects {} parameters, got {}",
                self.coeff.size(),
                self.degrees_of_freedom(),
                params.len()
            )));
        }
        for (c, pair) in self.coeff.iter_mut().zip(params.chunks_exact(2)) {
            *c = Vec2f::new(pair[0], pair[1]);
        }
        Ok(())
    }

    fn set_identity(&mut self) {
        self.coeff.fill(Vec2f::zeros());
    }

    fn derivative_at(&self, x: usize, y: usize) -> Mat2f {
        let lattice = self.coeff.size();
        let (bx, tx) = Self::support(x as f32, self.rate.x, lattice.x);
        let (by, ty) = Self::support(y as f32, self.rate.y, lattice.y);
        let wx = weights(tx);
        let wy = weights(ty);
        let dx = dweights(tx);
        let dy = dweights(ty);
        let mut jac = Mat2f::identity();
        for j in 0..4 {
            let row = self.coeff.row(by + j);
            for i in 0..4 {
                let c = row[bx + i];
                let wxd = dx[i] / self.rate.x * wy[j];
                let wyd = wx[i] * dy[j] / self.rate.y;
                jac[(0, 0)] += c.x * wxd;
                jac[(0, 1)] += c.x * wyd;
                jac[(1, 0)] += c.y * wxd;
                jac[(1, 1)] += c.y * wyd;
            }
        }
        jac
    }

    fn translate(&self, force: &VectorField2) -> Vec<f32> {
        let lattice = self.coeff.size();
        let mut grad = vec![Vec2f::zeros(); lattice.product()];
        let size = force.size();
        for y in 0..size.y {
            let (by, ty) = Self::support(y as f32, self.rate.y, lattice.y);
            let wy = weights(ty);
            let row = force.row(y);
            for (x, f) in row.iter().enumerate() {
                let (bx, tx) = Self::support(x as f32, self.rate.x, lattice.x);
                let wx = weights(tx);
                for (j, &wyj) in wy.iter().enumerate() {
                    let base = (by + j) * lattice.x + bx;
                    for (i, &wxi) in wx.iter().enumerate() {
                        grad[base + i] += f * (wxi * wyj);
                    }
                }
            }
        }
        let mut out = Vec::with_capacity(2 * grad.len());
        for g in grad {
            out.push(g.x);
            out.push(g.y);
        }
        out
    }

    fn upscale(&self, size: Bounds2) -> Box<dyn Transform2> {
        let x_mult = size.x as f32 / self.size.x as f32;
        let y_mult = size.y as f32 / self.size.y as f32;
        let rate = Vec2f::new(self.rate.x * x_mult, self.rate.y * y_mult);
        let lattice = Self::lattice_size(size, rate);
        let old = self.coeff.size();
        let mut coeff = Field2::from_vec(lattice, vec![Vec2f::zeros(); lattice.product()]);
        // The lattice index mapping is unchanged up to rounding; clamp the
        // far edge so a one-node difference reuses the border coefficient.
        for y in 0..lattice.y {
            let sy = y.min(old.y - 1);
            for x in 0..lattice.x {
                let c = self.coeff[(x.min(old.x - 1), sy)];
                coeff[(x, y)] = Vec2f::new(c.x * x_mult, c.y * y_mult);
            }
        }
        Box::new(Self { size, rate, coeff })
    }

    fn invert(&self) -> Result<Box<dyn Transform2>> {
        // No closed form; invert the rendered dense field instead.
        let field = self.as_displacement_field();
        GridTransform2::from_field(field).invert()
    }

    fn boxed_clone(&self) -> Box<dyn Transform2> {
        Box::new(self.clone())
    }
}

/// Factory for [`BsplineTransform2`] with a fixed knot spacing.
#[derive(Debug, Clone, Copy)]
pub struct BsplineFactory {
    pub rate: f32,
}

impl Default for BsplineFactory {
    fn default() -> Self {
        Self { rate: 16.0 }
    }
}

impl TransformFactory for BsplineFactory {
    fn create(&self, size: Bounds2) -> Box<dyn Transform2> {
        // The rate was validated at configuration time.
        match BsplineTransform2::new(size, self.rate.max(1.0)) {
            Ok(t) => Box::new(t),
            Err(_) => unreachable!("rate is clamped to a valid range"),
        }
    }

    fn name(&self) -> &'static str {
        "spline"
    }
}
