//! Transform trait for spatial mappings.
//!
//! This module defines the core Transform2 trait that all transformation
//! models must implement for image registration.

use crate::error::Result;
use crate::image::Image2;
use crate::interpolation::Interpolator;
use crate::spatial::{Bounds2, Mat2f, Vec2f};
use crate::vectorfield::VectorField2;

/// Spatial mapping over a fixed grid.
///
/// A transform is defined on the grid of the reference image and maps
/// output positions to sampling positions in the moving image (pull-back
/// convention): the deformed image is `M(T(x))`.
///
/// Every model exposes the same capability set so that registration
/// drivers can treat rigid, affine, spline and dense-field models
/// uniformly.
pub trait Transform2: Send + Sync {
    /// Map an output position to its sampling position.
    fn map(&self, p: Vec2f) -> Vec2f;

    /// Grid extent this transform is defined on.
    fn size(&self) -> Bounds2;

    /// Number of free parameters.
    fn degrees_of_freedom(&self) -> usize;

    /// Current parameter vector, length [`Transform2::degrees_of_freedom`].
    fn parameters(&self) -> Vec<f32>;

    /// Replace the parameter vector.
    ///
    /// Fails with `InvalidConfiguration` when the length does not match the
    /// degrees of freedom.
    fn set_parameters(&mut self, params: &[f32]) -> Result<()>;

    /// Reset to the identity mapping, keeping the grid size.
    fn set_identity(&mut self);

    /// Jacobian of the mapping with respect to position, at grid node `(x, y)`.
    fn derivative_at(&self, x: usize, y: usize) -> Mat2f;

    /// Chain rule from a per-pixel force field to a parameter gradient.
    ///
    /// `force[x]` holds the derivative of the cost with respect to the
    /// sampling position `T(x)`; the result is the derivative of the cost
    /// with respect to each parameter.
    fn translate(&self, force: &VectorField2) -> Vec<f32>;

    /// Re-express this transform on a larger grid.
    ///
    /// The returned transform maps the new grid the way this one maps the
    /// old grid, with displacements rescaled by the per-axis size ratio.
    fn upscale(&self, size: Bounds2) -> Box<dyn Transform2>;

    /// Invert the mapping.
    ///
    /// Linear models invert in closed form; dense models fall back to a
    /// bounded fixed-point iteration and fail with `NonInvertibleTransform`
    /// when it does not converge.
    fn invert(&self) -> Result<Box<dyn Transform2>>;

    /// Clone behind the trait object.
    fn boxed_clone(&self) -> Box<dyn Transform2>;

    /// Deform an image by this transform.
    fn apply(&self, image: &Image2, interp: &dyn Interpolator) -> Image2 {
        let size = self.size();
        let mut out = Image2::new(size);
        for y in 0..size.y {
            let orow = out.row_mut(y);
            for (x, o) in orow.iter_mut().enumerate() {
                *o = interp.value(image, self.map(Vec2f::new(x as f32, y as f32)));
            }
        }
        out
    }

    /// Render the mapping as a dense displacement field `u`, `T(x) = x - u(x)`.
    fn as_displacement_field(&self) -> VectorField2 {
        let size = self.size();
        let mut out = VectorField2::new(size);
        for y in 0..size.y {
            let orow = out.row_mut(y);
            for (x, o) in orow.iter_mut().enumerate() {
                let p = Vec2f::new(x as f32, y as f32);
                *o = p - self.map(p);
            }
        }
        out
    }
}

impl Clone for Box<dyn Transform2> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Factory for creating transforms of one model on a given grid.
///
/// Used by the driver registry to instantiate the model selected by name.
pub trait TransformFactory: Send + Sync {
    /// Create the identity transform of this model on `size`.
    fn create(&self, size: Bounds2) -> Box<dyn Transform2>;

    /// Model identifier.
    fn name(&self) -> &'static str;
}
