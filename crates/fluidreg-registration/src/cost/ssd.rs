//! Sum-of-squared-differences cost.

use crate::cost::trait_::Cost2;
use crate::error::{RegistrationError, Result};
use fluidreg_core::filter::{downscale, downscale_mask};
use fluidreg_core::image::{Image2, Mask2};
use fluidreg_core::interpolation::Interpolator;
use fluidreg_core::spatial::Bounds2;
use fluidreg_core::transform::Transform2;
use fluidreg_core::vectorfield::VectorField2;
use rayon::prelude::*;

/// Pixel-wise squared intensity difference.
///
/// The value is `sum(0.5 * (m - r)^2) / n` and the per-pixel force is
/// `(m - r) * grad(m) / n`, with `m` the deformed study image and `r` the
/// reference. An optional mask restricts both sums to the pixels it marks.
pub struct SsdCost {
    study: Image2,
    reference: Image2,
    floating: Image2,
    mask: Option<Mask2>,
}

impl SsdCost {
    pub fn new(study: Image2, reference: Image2) -> Result<Self> {
        if study.size() != reference.size() {
            return Err(RegistrationError::SizeMismatch {
                expected: study.size(),
                actual: reference.size(),
            });
        }
        let floating = study.clone();
        Ok(Self {
            study,
            reference,
            floating,
            mask: None,
        })
    }

    /// SSD restricted to the pixels marked in `mask`.
    pub fn with_mask(study: Image2, reference: Image2, mask: Mask2) -> Result<Self> {
        if mask.size() != study.size() {
            return Err(RegistrationError::SizeMismatch {
                expected: study.size(),
                actual: mask.size(),
            });
        }
        let mut cost = Self::new(study, reference)?;
        cost.mask = Some(mask);
        Ok(cost)
    }

    fn pixel_count(&self) -> usize {
        match &self.mask {
            Some(mask) => mask.iter().filter(|&&b| b).count(),
            None => self.floating.len(),
        }
    }
}

impl Cost2 for SsdCost {
    fn name(&self) -> &'static str {
        "ssd"
    }

    fn size(&self) -> Bounds2 {
        self.study.size()
    }

    fn downscaled(&self, factor: usize) -> Box<dyn Cost2> {
        let study = downscale(&self.study, factor);
        let floating = study.clone();
        Box::new(Self {
            study,
            reference: downscale(&self.reference, factor),
            floating,
            mask: self.mask.as_ref().map(|m| downscale_mask(m, factor)),
        })
    }

    fn transform(&mut self, t: &dyn Transform2, interp: &dyn Interpolator) {
        self.floating = t.apply(&self.study, interp);
    }

    fn value(&self) -> f64 {
        let n = self.pixel_count();
        if n == 0 {
            return 0.0;
        }
        let size = self.floating.size();
        let sum: f64 = (0..size.y)
            .into_par_iter()
            .map(|y| {
                let frow = self.floating.row(y);
                let rrow = self.reference.row(y);
                let mrow = self.mask.as_ref().map(|m| m.row(y));
                let mut local = 0.0f64;
                for x in 0..size.x {
                    if let Some(m) = mrow {
                        if !m[x] {
                            continue;
                        }
                    }
                    let d = (frow[x] - rrow[x]) as f64;
                    local += 0.5 * d * d;
                }
                local
            })
            .sum();
        sum / n as f64
    }

    fn evaluate_force(&self, weight: f32, force: &mut VectorField2) -> f64 {
        let n = self.pixel_count();
        if n == 0 {
            return 0.0;
        }
        let size = self.floating.size();
        let grad = self.floating.gradient();
        let scale = weight / n as f32;
        let sum: f64 = force
            .data_mut()
            .par_chunks_mut(size.x)
            .enumerate()
            .map(|(y, frow)| {
                let wrow = self.floating.row(y);
                let rrow = self.reference.row(y);
                let grow = grad.row(y);
                let mrow = self.mask.as_ref().map(|m| m.row(y));
                let mut local = 0.0f64;
                for x in 0..size.x {
                    if let Some(m) = mrow {
                        if !m[x] {
                            continue;
                        }
                    }
                    let d = wrow[x] - rrow[x];
                    local += 0.5 * (d as f64) * (d as f64);
                    frow[x] += grow[x] * (d * scale);
                }
                local
            })
            .sum();
        sum / n as f64
    }
}
