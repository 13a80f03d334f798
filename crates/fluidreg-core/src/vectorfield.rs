//! Dense displacement/force fields.

use crate::error::Result;
use crate::field::Field2;
use crate::spatial::{Bounds2, Vec2f};
use std::ops::{Deref, DerefMut};

/// Dense field of 2-D vectors, one per grid element.
///
/// Used for per-pixel forces, velocities and displacements. A displacement
/// field `u` represents the transformation `T(x) = x - u(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField2(Field2<Vec2f>);

impl VectorField2 {
    pub fn new(size: Bounds2) -> Self {
        Self(Field2::from_vec(size, vec![Vec2f::zeros(); size.product()]))
    }

    /// Fallible allocation, for solver workspaces sized from input.
    pub fn try_new(size: Bounds2) -> Result<Self> {
        let field = Field2::<Vec2f>::try_new(size)?;
        Ok(Self(field))
    }

    /// Reset every vector to zero (the identity displacement).
    pub fn clear(&mut self) {
        self.0.fill(Vec2f::zeros());
    }

    /// Bilinear sample at a continuous position.
    ///
    /// Positions outside the grid return the zero vector, matching the
    /// Dirichlet border treatment of the solvers.
    pub fn sample(&self, p: Vec2f) -> Vec2f {
        let size = self.size();
        if p.x < 0.0 || p.y < 0.0 {
            return Vec2f::zeros();
        }
        let x0 = p.x.floor();
        let y0 = p.y.floor();
        let xi = x0 as usize;
        let yi = y0 as usize;
        if xi >= size.x || yi >= size.y {
            return Vec2f::zeros();
        }
        let fx = p.x - x0;
        let fy = p.y - y0;
        let x1 = (xi + 1).min(size.x - 1);
        let y1 = (yi + 1).min(size.y - 1);

        let v00 = self.0[(xi, yi)];
        let v10 = self.0[(x1, yi)];
        let v01 = self.0[(xi, y1)];
        let v11 = self.0[(x1, y1)];

        let top = v00 * (1.0 - fx) + v10 * fx;
        let bottom = v01 * (1.0 - fx) + v11 * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Fold an outer displacement into this one.
    ///
    /// With `u` the current field (inner) and `outer` the previously
    /// accumulated field, the update is `u(x) += outer(x - u(x))`, so that
    /// afterwards `x - u(x)` equals the sequential application of the old
    /// inner transform followed by the outer transform.
    pub fn compose_with(&mut self, outer: &VectorField2) {
        assert_eq!(self.size(), outer.size());
        let size = self.size();
        for y in 0..size.y {
            for x in 0..size.x {
                let u = self.0[(x, y)];
                let pos = Vec2f::new(x as f32 - u.x, y as f32 - u.y);
                self.0[(x, y)] += outer.sample(pos);
            }
        }
    }

    /// Resample to a new grid size, rescaling the stored vectors.
    ///
    /// Displacements are measured in pixels of the grid they live on, so an
    /// upscaled field must multiply each component by the per-axis size
    /// ratio; plain geometric interpolation would silently shrink the
    /// deformation.
    pub fn upscale(&self, size: Bounds2) -> VectorField2 {
        let mut out = VectorField2::new(size);
        let x_mult = size.x as f32 / self.size().x as f32;
        let y_mult = size.y as f32 / self.size().y as f32;
        let ix = 1.0 / x_mult;
        let iy = 1.0 / y_mult;
        for y in 0..size.y {
            for x in 0..size.x {
                let v = self.sample(Vec2f::new(ix * x as f32, iy * y as f32));
                out[(x, y)] = Vec2f::new(v.x * x_mult, v.y * y_mult);
            }
        }
        out
    }

    /// Largest vector norm in the field.
    pub fn max_norm(&self) -> f32 {
        self.iter()
            .map(|v| v.norm_squared())
            .fold(0.0f32, f32::max)
            .sqrt()
    }
}

impl Deref for VectorField2 {
    type Target = Field2<Vec2f>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for VectorField2 {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
