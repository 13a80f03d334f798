//! Parametric registration driver.
//!
//! Optimizes the parameters of one transform model over a coarse-to-fine
//! image pyramid. Each level wraps the cost composition and the transform
//! into a minimization problem; the chain rule from the per-pixel force to
//! the parameter gradient is delegated to the transform model.

use crate::cost::CostList;
use crate::error::{RegistrationError, Result};
use crate::optimizer::{Minimizer, Problem};
use fluidreg_core::image::Image2;
use fluidreg_core::interpolation::Linear;
use fluidreg_core::transform::{Transform2, TransformFactory};
use fluidreg_core::vectorfield::VectorField2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Result of one registration run.
pub struct RunOutcome {
    /// Best transform found, at full resolution.
    pub transform: Box<dyn Transform2>,
    /// Cost of the best parameters at the finest level.
    pub cost: f64,
    /// Whether the finest-level minimization converged.
    pub converged: bool,
}

/// Minimization problem over the parameters of one transform.
struct RegistrationProblem<'a> {
    cost: &'a mut CostList,
    transform: Box<dyn Transform2>,
    interp: Linear,
    force: VectorField2,
}

impl<'a> RegistrationProblem<'a> {
    fn new(cost: &'a mut CostList, transform: Box<dyn Transform2>) -> Result<Self> {
        let size = cost.size()?;
        if size != transform.size() {
            return Err(RegistrationError::SizeMismatch {
                expected: size,
                actual: transform.size(),
            });
        }
        Ok(Self {
            cost,
            transform,
            interp: Linear,
            force: VectorField2::new(size),
        })
    }

    fn apply(&mut self, x: &[f64]) -> Result<()> {
        let params: Vec<f32> = x.iter().map(|&v| v as f32).collect();
        self.transform.set_parameters(&params)?;
        self.cost.transform(self.transform.as_ref(), &self.interp);
        Ok(())
    }
}

impl Problem for RegistrationProblem<'_> {
    fn len(&self) -> usize {
        self.transform.degrees_of_freedom()
    }

    fn value(&mut self, x: &[f64]) -> Result<f64> {
        self.apply(x)?;
        Ok(self.cost.value())
    }

    fn value_and_gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<f64> {
        self.apply(x)?;
        self.force.clear();
        let value = self.cost.evaluate_force(&mut self.force);
        for (g, p) in grad.iter_mut().zip(self.transform.translate(&self.force)) {
            *g = p as f64;
        }
        Ok(value)
    }
}

/// Multi-resolution parametric registration.
pub struct ParametricRegistration {
    factory: Box<dyn TransformFactory>,
    minimizer: Box<dyn Minimizer>,
    /// Smallest extent of the coarsest multi-resolution level.
    pub start_size: usize,
}

impl ParametricRegistration {
    pub fn new(factory: Box<dyn TransformFactory>, minimizer: Box<dyn Minimizer>) -> Self {
        Self {
            factory,
            minimizer,
            start_size: 16,
        }
    }

    pub fn with_start_size(mut self, start_size: usize) -> Self {
        self.start_size = start_size;
        self
    }

    /// Register a study image onto a reference with an SSD cost.
    pub fn run(&self, study: &Image2, reference: &Image2) -> Result<RunOutcome> {
        use crate::cost::SsdCost;

        let mut cost = CostList::new();
        cost.push(1.0, Box::new(SsdCost::new(study.clone(), reference.clone())?))?;
        self.run_with_cost(&cost)
    }

    /// Register with an arbitrary weighted cost composition.
    pub fn run_with_cost(&self, cost: &CostList) -> Result<RunOutcome> {
        let size = cost.size()?;
        let min_extent = size.x.min(size.y);
        let mut shift = 0usize;
        while (min_extent >> (shift + 1)) >= self.start_size {
            shift += 1;
        }

        let mut result: Option<RunOutcome> = None;
        for s in (0..=shift).rev() {
            let mut level_cost = cost.downscaled(1 << s);
            let level_size = level_cost.size()?;
            let level_transform = match result {
                Some(prev) => prev.transform.upscale(level_size),
                None => self.factory.create(level_size),
            };
            info!(
                factor = 1 << s,
                %level_size,
                model = self.factory.name(),
                "parametric registration level"
            );

            let mut problem = RegistrationProblem::new(&mut level_cost, level_transform)?;
            let x0: Vec<f64> = problem.transform.parameters().iter().map(|&p| p as f64).collect();
            let outcome = self.minimizer.minimize(&mut problem, &x0)?;
            if !outcome.converged {
                warn!(
                    factor = 1 << s,
                    value = outcome.value,
                    iterations = outcome.iterations,
                    "level minimization did not converge, keeping best parameters"
                );
            } else {
                debug!(
                    value = outcome.value,
                    iterations = outcome.iterations,
                    "level minimization finished"
                );
            }

            let params: Vec<f32> = outcome.x.iter().map(|&p| p as f32).collect();
            let mut best = problem.transform;
            best.set_parameters(&params)?;
            result = Some(RunOutcome {
                transform: best,
                cost: outcome.value,
                converged: outcome.converged,
            });
        }
        result.ok_or_else(|| RegistrationError::invalid_configuration("no pyramid level was run"))
    }

    /// Register every image of a series onto the frame at `reference_index`,
    /// one independent registration per frame on the thread pool.
    pub fn run_series(
        &self,
        series: &[Image2],
        reference_index: usize,
    ) -> Result<Vec<RunOutcome>> {
        let reference = series.get(reference_index).ok_or_else(|| {
            RegistrationError::invalid_configuration(format!(
                "reference index {reference_index} out of range for a series of {}",
                series.len()
            ))
        })?;
        series
            .par_iter()
            .map(|study| self.run(study, reference))
            .collect()
    }
}
