//! Scalar image and mask types.

use crate::field::Field2;
use crate::spatial::Vec2f;
use crate::vectorfield::VectorField2;

/// Grayscale image with `f32` intensities.
pub type Image2 = Field2<f32>;

/// Boolean mask, same grid as the image it restricts.
pub type Mask2 = Field2<bool>;

impl Field2<f32> {
    /// Minimum and maximum intensity. Returns `(0, 0)` for an empty image.
    pub fn min_max(&self) -> (f32, f32) {
        self.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
    }

    /// Central-difference spatial gradient.
    ///
    /// Border pixels get a zero gradient; interior pixels get
    /// `((I(x+1)-I(x-1))/2, (I(y+1)-I(y-1))/2)`.
    pub fn gradient(&self) -> VectorField2 {
        let size = self.size();
        let mut out = VectorField2::new(size);
        if size.x < 3 || size.y < 3 {
            return out;
        }
        let w = size.x;
        for y in 1..size.y - 1 {
            let above = self.row(y - 1);
            let here = self.row(y);
            let below = self.row(y + 1);
            let orow = out.row_mut(y);
            for x in 1..w - 1 {
                orow[x] = Vec2f::new(
                    0.5 * (here[x + 1] - here[x - 1]),
                    0.5 * (below[x] - above[x]),
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Bounds2;

    #[test]
    fn test_min_max() {
        let img = Image2::from_vec(Bounds2::new(2, 2), vec![3.0, -1.0, 0.5, 2.0]);
        assert_eq!(img.min_max(), (-1.0, 3.0));
    }

    #[test]
    fn test_gradient_of_ramp() {
        // I(x, y) = 2x + 3y has gradient (2, 3) everywhere in the interior.
        let size = Bounds2::new(5, 5);
        let mut img = Image2::new(size);
        for y in 0..5 {
            for x in 0..5 {
                img[(x, y)] = 2.0 * x as f32 + 3.0 * y as f32;
            }
        }
        let g = img.gradient();
        assert!((g[(2, 2)].x - 2.0).abs() < 1e-6);
        assert!((g[(2, 2)].y - 3.0).abs() < 1e-6);
        assert_eq!(g[(0, 0)], Vec2f::zeros());
    }
}
