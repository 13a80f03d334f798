//! Rigid model: rotation about a center plus translation.

use crate::error::{CoreError, Result};
use crate::spatial::{Bounds2, Mat2f, Vec2f};
use crate::transform::trait_::{Transform2, TransformFactory};
use crate::vectorfield::VectorField2;

/// Three-parameter rigid transform, `T(x) = R(angle) (x - c) + c + t`.
///
/// The parameter vector is `[tx, ty, angle]` with the angle in radians; the
/// rotation center `c` defaults to the grid center.
#[derive(Debug, Clone)]
pub struct RigidTransform2 {
    size: Bounds2,
    shift: Vec2f,
    angle: f32,
    center: Vec2f,
}

impl RigidTransform2 {
    pub fn new(size: Bounds2) -> Self {
        Self {
            size,
            shift: Vec2f::zeros(),
            angle: 0.0,
            center: size.center(),
        }
    }

    /// Rigid transform rotating about an explicit center.
    pub fn with_center(size: Bounds2, center: Vec2f) -> Self {
        Self {
            size,
            shift: Vec2f::zeros(),
            angle: 0.0,
            center,
        }
    }

    fn rotation(&self) -> Mat2f {
        let (s, c) = self.angle.sin_cos();
        Mat2f::new(c, -s, s, c)
    }
}

impl Transform2 for RigidTransform2 {
    fn map(&self, p: Vec2f) -> Vec2f {
        self.rotation() * (p - self.center) + self.center + self.shift
    }

    fn size(&self) -> Bounds2 {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        3
    }

    fn parameters(&self) -> Vec<f32> {
        vec![self.shift.x, self.shift.y, self.angle]
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != 3 {
            return Err(CoreError::invalid_configuration(format!(
                "rigid expects 3 parameters, got {}",
                params.len()
            )));
        }
        self.shift = Vec2f::new(params[0], params[1]);
        self.angle = params[2];
        Ok(())
    }

    fn set_identity(&mut self) {
        self.shift = Vec2f::zeros();
        self.angle = 0.0;
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Mat2f {
        self.rotation()
    }

    fn translate(&self, force: &VectorField2) -> Vec<f32> {
        let (s, c) = self.angle.sin_cos();
        let mut g = [0.0f32; 3];
        let size = force.size();
        for y in 0..size.y {
            let row = force.row(y);
            let dy = y as f32 - self.center.y;
            for (x, f) in row.iter().enumerate() {
                let dx = x as f32 - self.center.x;
                g[0] += f.x;
                g[1] += f.y;
                // d/d(angle) of R(angle) (x - c).
                g[2] += f.x * (-s * dx - c * dy) + f.y * (c * dx - s * dy);
            }
        }
        g.to_vec()
    }

    fn upscale(&self, size: Bounds2) -> Box<dyn Transform2> {
        let x_mult = size.x as f32 / self.size.x as f32;
        let y_mult = size.y as f32 / self.size.y as f32;
        let mut up = Self {
            size,
            shift: Vec2f::new(self.shift.x * x_mult, self.shift.y * y_mult),
            angle: self.angle,
            center: Vec2f::new(self.center.x * x_mult, self.center.y * y_mult),
        };
        // Keep the default center when this transform used it.
        if self.center == self.size.center() {
            up.center = size.center();
        }
        Box::new(up)
    }

    fn invert(&self) -> Result<Box<dyn Transform2>> {
        let rt = self.rotation().transpose();
        Ok(Box::new(Self {
            size: self.size,
            shift: -(rt * self.shift),
            angle: -self.angle,
            center: self.center,
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Transform2> {
        Box::new(self.clone())
    }
}

/// Factory for [`RigidTransform2`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RigidFactory;

impl TransformFactory for RigidFactory {
    fn create(&self, size: Bounds2) -> Box<dyn Transform2> {
        Box::new(RigidTransform2::new(size))
    }

    fn name(&self) -> &'static str {
        "rigid"
    }
}
