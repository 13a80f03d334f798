//! Image interpolation.
//!
//! Deformation and cost evaluation both sample images at continuous
//! positions; the interpolator decides how intensities between grid nodes
//! are reconstructed.

use crate::image::Image2;
use crate::spatial::Vec2f;

/// Intensity reconstruction at continuous positions.
///
/// Samples outside the image domain evaluate to zero intensity and zero
/// derivative.
pub trait Interpolator: Send + Sync {
    /// Interpolated intensity at `p`.
    fn value(&self, image: &Image2, p: Vec2f) -> f32;

    /// Spatial derivative of the interpolated intensity at `p`.
    fn derivative(&self, image: &Image2, p: Vec2f) -> Vec2f;
}

/// Nearest-neighbour interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nearest;

impl Interpolator for Nearest {
    fn value(&self, image: &Image2, p: Vec2f) -> f32 {
        if p.x < -0.5 || p.y < -0.5 {
            return 0.0;
        }
        let x = (p.x + 0.5).floor() as usize;
        let y = (p.y + 0.5).floor() as usize;
        image.get(x, y).copied().unwrap_or(0.0)
    }

    fn derivative(&self, _image: &Image2, _p: Vec2f) -> Vec2f {
        // Piecewise constant, no usable derivative.
        Vec2f::zeros()
    }
}

/// Bilinear interpolation with an analytic first derivative.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl Linear {
    fn corners(image: &Image2, p: Vec2f) -> Option<(f32, f32, f32, f32, f32, f32)> {
        let size = image.size();
        if p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let x0 = p.x.floor();
        let y0 = p.y.floor();
        let xi = x0 as usize;
        let yi = y0 as usize;
        if xi >= size.x || yi >= size.y {
            return None;
        }
        let x1 = (xi + 1).min(size.x - 1);
        let y1 = (yi + 1).min(size.y - 1);
        Some((
            image[(xi, yi)],
            image[(x1, yi)],
            image[(xi, y1)],
            image[(x1, y1)],
            p.x - x0,
            p.y - y0,
        ))
    }
}

impl Interpolator for Linear {
    fn value(&self, image: &Image2, p: Vec2f) -> f32 {
        match Self::corners(image, p) {
            Some((v00, v10, v01, v11, fx, fy)) => {
                let top = v00 * (1.0 - fx) + v10 * fx;
                let bottom = v01 * (1.0 - fx) + v11 * fx;
                top * (1.0 - fy) + bottom * fy
            }
            None => 0.0,
        }
    }

    fn derivative(&self, image: &Image2, p: Vec2f) -> Vec2f {
        match Self::corners(image, p) {
            Some((v00, v10, v01, v11, fx, fy)) => Vec2f::new(
                (v10 - v00) * (1.0 - fy) + (v11 - v01) * fy,
                (v01 - v00) * (1.0 - fx) + (v11 - v10) * fx,
            ),
            None => Vec2f::zeros(),
        }
    }
}
