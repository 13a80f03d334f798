//! Cost trait for image dissimilarity measurement.
//!
//! A cost term owns its full-resolution image pair together with the
//! deformed copy of the study image, so that multi-resolution drivers can
//! downscale the whole term per level and re-deform it per iteration.

use fluidreg_core::interpolation::Interpolator;
use fluidreg_core::spatial::Bounds2;
use fluidreg_core::transform::Transform2;
use fluidreg_core::vectorfield::VectorField2;

/// Dissimilarity term between a study image and a reference image.
///
/// Lower values indicate better alignment. Terms are stateful: calling
/// [`Cost2::transform`] deforms the stored study image, and subsequent
/// [`Cost2::value`] and [`Cost2::evaluate_force`] calls measure that
/// deformed copy against the reference.
pub trait Cost2: Send + Sync {
    /// Identifier of the cost kernel.
    fn name(&self) -> &'static str;

    /// Grid extent of the images this term currently holds.
    fn size(&self) -> Bounds2;

    /// Copy of this term with all images block-averaged by `factor`.
    fn downscaled(&self, factor: usize) -> Box<dyn Cost2>;

    /// Deform the study image by `t` for the next evaluations.
    fn transform(&mut self, t: &dyn Transform2, interp: &dyn Interpolator);

    /// Cost value of the current deformed study image against the reference.
    fn value(&self) -> f64;

    /// Cost value, plus accumulation of `weight` times the per-pixel cost
    /// gradient into `force`.
    ///
    /// `force[x]` receives the derivative of the cost with respect to the
    /// intensity sampling position at `x`.
    fn evaluate_force(&self, weight: f32, force: &mut VectorField2) -> f64;
}
