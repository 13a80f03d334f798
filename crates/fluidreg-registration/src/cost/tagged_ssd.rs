//! Squared-difference cost for tagged image channels.
//!
//! Tagging modulates the image with stripes along one axis, so a tagged
//! channel only constrains motion along its tag direction. The force this
//! cost emits is therefore restricted to that one component.

use crate::cost::trait_::Cost2;
use crate::error::{RegistrationError, Result};
use fluidreg_core::filter::downscale;
use fluidreg_core::image::Image2;
use fluidreg_core::interpolation::Interpolator;
use fluidreg_core::spatial::Bounds2;
use fluidreg_core::transform::Transform2;
use fluidreg_core::vectorfield::VectorField2;
use rayon::prelude::*;

/// Tag direction of a channel pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAxis {
    X,
    Y,
}

/// SSD over one tagged channel, forcing only along the tag axis.
pub struct TaggedSsdCost {
    study: Image2,
    reference: Image2,
    floating: Image2,
    axis: TagAxis,
}

impl TaggedSsdCost {
    pub fn new(study: Image2, reference: Image2, axis: TagAxis) -> Result<Self> {
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
            axis,
        })
    }

    pub fn axis(&self) -> TagAxis {
        self.axis
    }
}

impl Cost2 for TaggedSsdCost {
    fn name(&self) -> &'static str {
        "tagged-ssd"
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
            axis: self.axis,
        })
    }

    fn transform(&mut self, t: &dyn Transform2, interp: &dyn Interpolator) {
        self.floating = t.apply(&self.study, interp);
    }

    fn value(&self) -> f64 {
        let size = self.floating.size();
        let n = self.floating.len() as f64;
        let sum: f64 = (0..size.y)
            .into_par_iter()
            .map(|y| {
                self.floating
                    .row(y)
                    .iter()
                    .zip(self.reference.row(y))
                    .map(|(&m, &r)| {
                        let d = (m - r) as f64;
                        0.5 * d * d
                    })
                    .sum::<f64>()
            })
            .sum();
        sum / n
    }

    fn evaluate_force(&self, weight: f32, force: &mut VectorField2) -> f64 {
        let size = self.floating.size();
        let n = self.floating.len();
        let grad = self.floating.gradient();
        let scale = weight / n as f32;
        let axis = self.axis;
        let sum: f64 = force
            .data_mut()
            .par_chunks_mut(size.x)
            .enumerate()
            .map(|(y, frow)| {
                let wrow = self.floating.row(y);
                let rrow = self.reference.row(y);
                let grow = grad.row(y);
                let mut local = 0.0f64;
                for x in 0..size.x {
                    let d = wrow[x] - rrow[x];
                    local += 0.5 * (d as f64) * (d as f64);
                    match axis {
                        TagAxis::X => frow[x].x += grow[x].x * (d * scale),
                        TagAxis::Y => frow[x].y += grow[x].y * (d * scale),
                    }
                }
                local
            })
            .sum();
        sum / n as f64
    }
}
