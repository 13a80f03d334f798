//! Affine model.

use crate::error::{CoreError, Result};
use crate::spatial::{Bounds2, Mat2f, Vec2f};
use crate::transform::trait_::{Transform2, TransformFactory};
use crate::vectorfield::VectorField2;

/// Six-parameter affine transform, `T(x) = A x + b`.
///
/// The parameter vector is `[a00, a01, tx, a10, a11, ty]`, row-major over
/// the augmented matrix.
#[derive(Debug, Clone)]
pub struct AffineTransform2 {
    size: Bounds2,
    matrix: Mat2f,
    shift: Vec2f,
}

impl AffineTransform2 {
    pub fn new(size: Bounds2) -> Self {
        Self {
            size,
            matrix: Mat2f::identity(),
            shift: Vec2f::zeros(),
        }
    }

    pub fn from_parts(size: Bounds2, matrix: Mat2f, shift: Vec2f) -> Self {
        Self {
            size,
            matrix,
            shift,
        }
    }
}

impl Transform2 for AffineTransform2 {
    fn map(&self, p: Vec2f) -> Vec2f {
        self.matrix * p + self.shift
    }

    fn size(&self) -> Bounds2 {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        6
    }

    fn parameters(&self) -> Vec<f32> {
        vec![
            self.matrix[(0, 0)],
            self.matrix[(0, 1)],
            self.shift.x,
            self.matrix[(1, 0)],
            self.matrix[(1, 1)],
            self.shift.y,
        ]
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != 6 {
            return Err(CoreError::invalid_configuration(format!(
                "affine expects 6 parameters, got {}",
                params.len()
            )));
        }
        self.matrix = Mat2f::new(params[0], params[1], params[3], params[4]);
        self.shift = Vec2f::new(params[2], params[5]);
        Ok(())
    }

    fn set_identity(&mut self) {
        self.matrix = Mat2f::identity();
        self.shift = Vec2f::zeros();
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Mat2f {
        self.matrix
    }

    fn translate(&self, force: &VectorField2) -> Vec<f32> {
        let mut g = [0.0f32; 6];
        let size = force.size();
        for y in 0..size.y {
            let fy = y as f32;
            let row = force.row(y);
            for (x, f) in row.iter().enumerate() {
                let fx = x as f32;
                g[0] += f.x * fx;
                g[1] += f.x * fy;
                g[2] += f.x;
                g[3] += f.y * fx;
                g[4] += f.y * fy;
                g[5] += f.y;
            }
        }
        g.to_vec()
    }

    fn upscale(&self, size: Bounds2) -> Box<dyn Transform2> {
        // Conjugate by the per-axis scaling S: A' = S A S^-1, b' = S b.
        let sx = size.x as f32 / self.size.x as f32;
        let sy = size.y as f32 / self.size.y as f32;
        let s = Mat2f::new(sx, 0.0, 0.0, sy);
        let s_inv = Mat2f::new(1.0 / sx, 0.0, 0.0, 1.0 / sy);
        Box::new(Self::from_parts(
            size,
            s * self.matrix * s_inv,
            Vec2f::new(self.shift.x * sx, self.shift.y * sy),
        ))
    }

    fn invert(&self) -> Result<Box<dyn Transform2>> {
        let inv = self.matrix.try_inverse().ok_or_else(|| {
            CoreError::non_invertible("affine matrix is singular")
        })?;
        Ok(Box::new(Self::from_parts(
            self.size,
            inv,
            -(inv * self.shift),
        )))
    }

    fn boxed_clone(&self) -> Box<dyn Transform2> {
        Box::new(self.clone())
    }
}

/// Factory for [`AffineTransform2`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineFactory;

impl TransformFactory for AffineFactory {
    fn create(&self, size: Bounds2) -> Box<dyn Transform2> {
        Box::new(AffineTransform2::new(size))
    }

    fn name(&self) -> &'static str {
        "affine"
    }
}
