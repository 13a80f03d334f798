//! Dense-field model: one displacement vector per grid node.

use crate::error::{CoreError, Result};
use crate::spatial::{Bounds2, Mat2f, Vec2f};
use crate::transform::trait_::{Transform2, TransformFactory};
use crate::vectorfield::VectorField2;

const INVERT_MAX_ITER: usize = 50;
const INVERT_TOL: f32 = 1e-4;

/// Dense displacement transform, `T(x) = x - u(x)`.
///
/// This is the model the fluid driver optimizes; every grid node carries
/// its own two parameters.
#[derive(Debug, Clone)]
pub struct GridTransform2 {
    field: VectorField2,
}

impl GridTransform2 {
    pub fn new(size: Bounds2) -> Self {
        Self {
            field: VectorField2::new(size),
        }
    }

    pub fn from_field(field: VectorField2) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &VectorField2 {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut VectorField2 {
        &mut self.field
    }

    pub fn into_field(self) -> VectorField2 {
        self.field
    }
}

impl Transform2 for GridTransform2 {
    fn map(&self, p: Vec2f) -> Vec2f {
        p - self.field.sample(p)
    }

    fn size(&self) -> Bounds2 {
        self.field.size()
    }

    fn degrees_of_freedom(&self) -> usize {
        2 * self.field.len()
    }

    fn parameters(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.degrees_of_freedom());
        for v in self.field.iter() {
            out.push(v.x);
            out.push(v.y);
        }
        out
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.degrees_of_freedom() {
            return Err(CoreError::invalid_configuration(format!(
                "grid transform of size {} expects {} parameters, got {}",
                self.field.size(),
                self.degrees_of_freedom(),
                params.len()
            )));
        }
        for (v, pair) in self.field.iter_mut().zip(params.chunks_exact(2)) {
            *v = Vec2f::new(pair[0], pair[1]);
        }
        Ok(())
    }

    fn set_identity(&mut self) {
        self.field.clear();
    }

    fn derivative_at(&self, x: usize, y: usize) -> Mat2f {
        let size = self.field.size();
        // Central differences of u; border nodes keep the identity.
        if x == 0 || y == 0 || x + 1 >= size.x || y + 1 >= size.y {
            return Mat2f::identity();
        }
        let dudx = (self.field[(x + 1, y)] - self.field[(x - 1, y)]) * 0.5;
        let dudy = (self.field[(x, y + 1)] - self.field[(x, y - 1)]) * 0.5;
        Mat2f::new(
            1.0 - dudx.x,
            -dudy.x,
            -dudx.y,
            1.0 - dudy.y,
        )
    }

    fn translate(&self, force: &VectorField2) -> Vec<f32> {
        // dT(x)/du(x) = -I, so the parameter gradient is the negated force.
        let mut out = Vec::with_capacity(2 * force.len());
        for f in force.iter() {
            out.push(-f.x);
            out.push(-f.y);
        }
        out
    }

    fn upscale(&self, size: Bounds2) -> Box<dyn Transform2> {
        Box::new(Self {
            field: self.field.upscale(size),
        })
    }

    fn invert(&self) -> Result<Box<dyn Transform2>> {
        let size = self.field.size();
        let mut inv = VectorField2::new(size);
        let mut worst = 0.0f32;
        for y in 0..size.y {
            for x in 0..size.x {
                let p = Vec2f::new(x as f32, y as f32);
                // Fixed point of w = -u(p - w).
                let mut w = Vec2f::zeros();
                let mut delta = f32::MAX;
                for _ in 0..INVERT_MAX_ITER {
                    let next = -self.field.sample(p - w);
                    delta = (next - w).norm();
                    w = next;
                    if delta <= INVERT_TOL {
                        break;
                    }
                }
                worst = worst.max(delta);
                inv[(x, y)] = w;
            }
        }
        if worst > INVERT_TOL * 10.0 {
            return Err(CoreError::non_invertible(format!(
                "fixed-point inversion stalled with residual {worst}"
            )));
        }
        Ok(Box::new(Self { field: inv }))
    }

    fn boxed_clone(&self) -> Box<dyn Transform2> {
        Box::new(self.clone())
    }

    fn as_displacement_field(&self) -> VectorField2 {
        self.field.clone()
    }
}

/// Factory for [`GridTransform2`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GridFactory;

impl TransformFactory for GridFactory {
    fn create(&self, size: Bounds2) -> Box<dyn Transform2> {
        Box::new(GridTransform2::new(size))
    }

    fn name(&self) -> &'static str {
        "vf"
    }
}
