//! Local normalized cross correlation cost.

use crate::cost::trait_::Cost2;
use crate::error::{RegistrationError, Result};
use fluidreg_core::filter::{downscale, downscale_mask};
use fluidreg_core::image::{Image2, Mask2};
use fluidreg_core::interpolation::Interpolator;
use fluidreg_core::spatial::{clip_window, Bounds2};
use fluidreg_core::transform::Transform2;
use fluidreg_core::vectorfield::VectorField2;
use rayon::prelude::*;

/// Windows with a variance product at or below this are treated as flat and
/// skipped; they carry no correlation signal.
const VARIANCE_FLOOR: f64 = 1e-5;

/// Sums over one clipped correlation window.
struct WindowStats {
    n: usize,
    mean_a: f64,
    mean_b: f64,
    suma2: f64,
    sumb2: f64,
    sumab: f64,
}

fn window_stats(
    a: &Image2,
    b: &Image2,
    mask: Option<&Mask2>,
    x: usize,
    y: usize,
    hw: usize,
) -> WindowStats {
    let size = a.size();
    let (x0, x1) = clip_window(x, hw, size.x);
    let (y0, y1) = clip_window(y, hw, size.y);

    let mut n = 0usize;
    let mut suma = 0.0f64;
    let mut sumb = 0.0f64;
    let mut suma2 = 0.0f64;
    let mut sumb2 = 0.0f64;
    let mut sumab = 0.0f64;
    for wy in y0..y1 {
        let arow = &a.row(wy)[x0..x1];
        let brow = &b.row(wy)[x0..x1];
        let mrow = mask.map(|m| &m.row(wy)[x0..x1]);
        for (i, (&va, &vb)) in arow.iter().zip(brow).enumerate() {
            if let Some(mrow) = mrow {
                if !mrow[i] {
                    continue;
                }
            }
            let va = va as f64;
            let vb = vb as f64;
            n += 1;
            suma += va;
            sumb += vb;
            suma2 += va * va;
            sumb2 += vb * vb;
            sumab += va * vb;
        }
    }
    if n == 0 {
        return WindowStats {
            n: 0,
            mean_a: 0.0,
            mean_b: 0.0,
            suma2: 0.0,
            sumb2: 0.0,
            sumab: 0.0,
        };
    }
    let mean_a = suma / n as f64;
    let mean_b = sumb / n as f64;
    WindowStats {
        n,
        mean_a,
        mean_b,
        suma2: suma2 - n as f64 * mean_a * mean_a,
        sumb2: sumb2 - n as f64 * mean_b * mean_b,
        sumab: sumab - n as f64 * mean_a * mean_b,
    }
}

/// Local normalized cross correlation over a square window.
///
/// Per pixel the cost contribution is `1 - sumab^2 / (suma2 * sumb2)` over
/// the centered window of half-width `hw`, averaged over all pixels whose
/// window carries enough variance.
pub struct LnccCost {
    study: Image2,
    reference: Image2,
    floating: Image2,
    hw: usize,
    mask: Option<Mask2>,
}

impl LnccCost {
    pub fn new(study: Image2, reference: Image2, hw: usize) -> Result<Self> {
        if study.size() != reference.size() {
            return Err(RegistrationError::SizeMismatch {
                expected: study.size(),
                actual: reference.size(),
            });
        }
        if hw == 0 {
            return Err(RegistrationError::invalid_configuration(
                "lncc window half-width must be at least 1",
            ));
        }
        let floating = study.clone();
        Ok(Self {
            study,
            reference,
            floating,
            hw,
            mask: None,
        })
    }

    /// Masked variant: windows and center pixels are restricted to the mask.
    pub fn with_mask(study: Image2, reference: Image2, hw: usize, mask: Mask2) -> Result<Self> {
        if mask.size() != study.size() {
            return Err(RegistrationError::SizeMismatch {
                expected: study.size(),
                actual: mask.size(),
            });
        }
        let mut cost = Self::new(study, reference, hw)?;
        cost.mask = Some(mask);
        Ok(cost)
    }

    fn in_mask(&self, x: usize, y: usize) -> bool {
        self.mask.as_ref().map_or(true, |m| m[(x, y)])
    }
}

impl Cost2 for LnccCost {
    fn name(&self) -> &'static str {
        "lncc"
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
            hw: self.hw,
            mask: self.mask.as_ref().map(|m| downscale_mask(m, factor)),
        })
    }

    fn transform(&mut self, t: &dyn Transform2, interp: &dyn Interpolator) {
        self.floating = t.apply(&self.study, interp);
    }

    fn value(&self) -> f64 {
        let size = self.floating.size();
        let (sum, count) = (0..size.y)
            .into_par_iter()
            .map(|y| {
                let mut local = 0.0f64;
                let mut count = 0usize;
                for x in 0..size.x {
                    if !self.in_mask(x, y) {
                        continue;
                    }
                    let s = window_stats(
                        &self.floating,
                        &self.reference,
                        self.mask.as_ref(),
                        x,
                        y,
                        self.hw,
                    );
                    if s.n <= 1 {
                        continue;
                    }
                    let var_prod = s.suma2 * s.sumb2;
                    if var_prod > VARIANCE_FLOOR {
                        local += 1.0 - s.sumab * s.sumab / var_prod;
                        count += 1;
                    }
                }
                (local, count)
            })
            .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    }

    fn evaluate_force(&self, weight: f32, force: &mut VectorField2) -> f64 {
        let size = self.floating.size();
        let grad = self.floating.gradient();
        let (sum, count) = force
            .data_mut()
            .par_chunks_mut(size.x)
            .enumerate()
            .map(|(y, frow)| {
                let mrow = self.floating.row(y);
                let rrow = self.reference.row(y);
                let grow = grad.row(y);
                let mut local = 0.0f64;
                let mut count = 0usize;
                for x in 0..size.x {
                    if !self.in_mask(x, y) {
                        continue;
                    }
                    let s = window_stats(
                        &self.floating,
                        &self.reference,
                        self.mask.as_ref(),
                        x,
                        y,
                        self.hw,
                    );
                    if s.n <= 1 {
                        continue;
                    }
                    let var_prod = s.suma2 * s.sumb2;
                    if var_prod > VARIANCE_FLOOR {
                        local += 1.0 - s.sumab * s.sumab / var_prod;
                        count += 1;
                        // Derivative of the local term with respect to the
                        // center intensity of the deformed study image.
                        let scale = (2.0 * s.sumab / var_prod
                            * (s.sumab / s.suma2 * (mrow[x] as f64 - s.mean_a)
                                - (rrow[x] as f64 - s.mean_b)))
                            as f32;
                        frow[x] += grow[x] * (scale * weight);
                    }
                }
                (local, count)
            })
            .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    }
}
