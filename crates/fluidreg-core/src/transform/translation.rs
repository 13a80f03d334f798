//! Pure translation model.

use crate::error::{CoreError, Result};
use crate::spatial::{Bounds2, Mat2f, Vec2f};
use crate::transform::trait_::{Transform2, TransformFactory};
use crate::vectorfield::VectorField2;

/// Two-parameter translation, `T(x) = x + t`.
#[derive(Debug, Clone)]
pub struct TranslationTransform2 {
    size: Bounds2,
    shift: Vec2f,
}

impl TranslationTransform2 {
    pub fn new(size: Bounds2) -> Self {
        Self {
            size,
            shift: Vec2f::zeros(),
        }
    }

    pub fn with_shift(size: Bounds2, shift: Vec2f) -> Self {
        Self { size, shift }
    }
}

impl Transform2 for TranslationTransform2 {
    fn map(&self, p: Vec2f) -> Vec2f {
        p + self.shift
    }

    fn size(&self) -> Bounds2 {
        self.size
    }

    fn degrees_of_freedom(&self) -> usize {
        2
    }

    fn parameters(&self) -> Vec<f32> {
        vec![self.shift.x, self.shift.y]
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != 2 {
            return Err(CoreError::invalid_configuration(format!(
                "translation expects 2 parameters, got {}",
                params.len()
            )));
        }
        self.shift = Vec2f::new(params[0], params[1]);
        Ok(())
    }

    fn set_identity(&mut self) {
        self.shift = Vec2f::zeros();
    }

    fn derivative_at(&self, _x: usize, _y: usize) -> Mat2f {
        Mat2f::identity()
    }

    fn translate(&self, force: &VectorField2) -> Vec<f32> {
        let mut gx = 0.0f32;
        let mut gy = 0.0f32;
        for f in force.iter() {
            gx += f.x;
            gy += f.y;
        }
        vec![gx, gy]
    }

    fn upscale(&self, size: Bounds2) -> Box<dyn Transform2> {
        let x_mult = size.x as f32 / self.size.x as f32;
        let y_mult = size.y as f32 / self.size.y as f32;
        Box::new(Self::with_shift(
            size,
            Vec2f::new(self.shift.x * x_mult, self.shift.y * y_mult),
        ))
    }

    fn invert(&self) -> Result<Box<dyn Transform2>> {
        Ok(Box::new(Self::with_shift(self.size, -self.shift)))
    }

    fn boxed_clone(&self) -> Box<dyn Transform2> {
        Box::new(self.clone())
    }
}

/// Factory for [`TranslationTransform2`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationFactory;

impl TransformFactory for TranslationFactory {
    fn create(&self, size: Bounds2) -> Box<dyn Transform2> {
        Box::new(TranslationTransform2::new(size))
    }

    fn name(&self) -> &'static str {
        "translate"
    }
}
