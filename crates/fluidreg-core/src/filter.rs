//! Image filters used by the multi-resolution drivers.

use crate::image::{Image2, Mask2};
use crate::interpolation::Interpolator;
use crate::spatial::{Bounds2, Vec2f};
use crate::vectorfield::VectorField2;

/// Block-average downscale by an integer factor per axis.
///
/// Output extent is `ceil(size / factor)`; partial blocks at the far border
/// average over the pixels that exist. A factor of one returns a copy.
pub fn downscale(image: &Image2, factor: usize) -> Image2 {
    let factor = factor.max(1);
    let size = image.size();
    let out_size = Bounds2::new(size.x.div_ceil(factor), size.y.div_ceil(factor));
    let mut out = Image2::new(out_size);
    for oy in 0..out_size.y {
        let y0 = oy * factor;
        let y1 = (y0 + factor).min(size.y);
        for ox in 0..out_size.x {
            let x0 = ox * factor;
            let x1 = (x0 + factor).min(size.x);
            let mut sum = 0.0f32;
            for y in y0..y1 {
                for &v in &image.row(y)[x0..x1] {
                    sum += v;
                }
            }
            let n = ((x1 - x0) * (y1 - y0)) as f32;
            out[(ox, oy)] = sum / n;
        }
    }
    out
}

/// Downscale a mask by block majority: a block is kept when at least half
/// of its pixels are set.
pub fn downscale_mask(mask: &Mask2, factor: usize) -> Mask2 {
    let factor = factor.max(1);
    let size = mask.size();
    let out_size = Bounds2::new(size.x.div_ceil(factor), size.y.div_ceil(factor));
    let mut out = Mask2::new(out_size);
    for oy in 0..out_size.y {
        let y0 = oy * factor;
        let y1 = (y0 + factor).min(size.y);
        for ox in 0..out_size.x {
            let x0 = ox * factor;
            let x1 = (x0 + factor).min(size.x);
            let set: usize = (y0..y1)
                .map(|y| mask.row(y)[x0..x1].iter().filter(|&&b| b).count())
                .sum();
            out[(ox, oy)] = 2 * set >= (x1 - x0) * (y1 - y0);
        }
    }
    out
}

/// Pull-back deformation of an image by a displacement field.
///
/// Each output pixel samples the input at `x - u(x)`.
pub fn deform(image: &Image2, field: &VectorField2, interp: &dyn Interpolator) -> Image2 {
    assert_eq!(image.size(), field.size());
    let size = image.size();
    let mut out = Image2::new(size);
    for y in 0..size.y {
        let urow = field.row(y);
        let orow = out.row_mut(y);
        for x in 0..size.x {
            let u = urow[x];
            orow[x] = interp.value(image, Vec2f::new(x as f32 - u.x, y as f32 - u.y));
        }
    }
    out
}
