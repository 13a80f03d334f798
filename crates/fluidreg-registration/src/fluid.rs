//! Fluid-dynamic registration driver.
//!
//! Runs a coarse-to-fine loop over downscaled copies of the cost terms. At
//! each level the cost force drives the Navier relaxation solver, the
//! resulting velocity is converted into a displacement update by the time
//! step, and the level's local displacement is composed onto the
//! accumulated result. When the local deformation approaches a fold the
//! driver regrids: the local field is folded into the result and restarted
//! from zero.

use crate::cost::CostList;
use crate::error::Result;
use crate::solver::NavierSolver;
use crate::timestep::{FluidTimeStep, StepSize, TimeStep};
use fluidreg_core::image::Image2;
use fluidreg_core::interpolation::{Interpolator, Linear};
use fluidreg_core::spatial::Bounds2;
use fluidreg_core::transform::GridTransform2;
use fluidreg_core::vectorfield::VectorField2;
use tracing::{debug, info};

/// Parameters of the fluid driver.
#[derive(Debug, Clone)]
pub struct FluidConfig {
    /// Smallest extent of the coarsest multi-resolution level.
    pub start_size: usize,
    /// Iteration cap per level.
    pub max_level_iter: usize,
    /// Stop a level once the cost drops below this fraction of its start.
    pub level_epsilon: f64,
    /// Smallest accepted pixel step.
    pub min_step: f32,
    /// Largest pixel shift applied per iteration.
    pub max_step: f32,
    pub solver: NavierSolver,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            start_size: 16,
            max_level_iter: 100,
            level_epsilon: 0.01,
            min_step: 0.1,
            max_step: 2.0,
            solver: NavierSolver::default(),
        }
    }
}

/// Non-parametric registration with fluid-dynamic regularization.
pub struct FluidRegistration {
    config: FluidConfig,
    timestep: Box<dyn TimeStep>,
}

impl FluidRegistration {
    pub fn new(config: FluidConfig) -> Self {
        Self {
            config,
            timestep: Box::new(FluidTimeStep::default()),
        }
    }

    /// Replace the default fluid time step, e.g. by
    /// [`crate::timestep::DirectTimeStep`].
    pub fn with_timestep(mut self, timestep: Box<dyn TimeStep>) -> Self {
        self.timestep = timestep;
        self
    }

    /// Register the study image of an SSD cost onto the reference.
    ///
    /// The returned dense transform carries the displacement field `u`; the
    /// deformed study image is `M(x - u(x))`.
    pub fn run(&self, study: &Image2, reference: &Image2) -> Result<GridTransform2> {
        use crate::cost::SsdCost;

        let mut cost = CostList::new();
        cost.push(1.0, Box::new(SsdCost::new(study.clone(), reference.clone())?))?;
        self.run_with_cost(&cost)
    }

    /// Register using an arbitrary weighted cost composition.
    pub fn run_with_cost(&self, cost: &CostList) -> Result<GridTransform2> {
        let size = cost.size()?;
        let interp = Linear;

        let min_extent = size.x.min(size.y);
        let mut shift = 0usize;
        while (min_extent >> (shift + 1)) >= self.config.start_size {
            shift += 1;
        }

        let coarsest = Bounds2::new(size.x.div_ceil(1 << shift), size.y.div_ceil(1 << shift));
        let mut result = VectorField2::new(coarsest);

        for s in (0..=shift).rev() {
            let factor = 1 << s;
            let mut level_cost = cost.downscaled(factor);
            let level_size = level_cost.size()?;
            if result.size() != level_size {
                result = result.upscale(level_size);
            }
            info!(factor, %level_size, "fluid registration level");
            self.reg_level(&mut level_cost, &mut result, &interp)?;
        }
        Ok(GridTransform2::from_field(result))
    }

    /// One multi-resolution level with regridding.
    fn reg_level(
        &self,
        cost: &mut CostList,
        result: &mut VectorField2,
        interp: &dyn Interpolator,
    ) -> Result<()> {
        let size = cost.size()?;
        let mut local = VectorField2::new(size);
        let mut best_local = local.clone();
        let mut step = StepSize::new(self.config.min_step, self.config.max_step);
        let mut force = VectorField2::new(size);
        let mut v = VectorField2::new(size);
        let force_scale = self.config.solver.force_scale();

        cost.transform(&GridTransform2::from_field(result.clone()), interp);
        let initial_cost = cost.value();
        if initial_cost <= 0.0 {
            debug!(initial_cost, "level already aligned");
            return Ok(());
        }
        let mut prev_cost = initial_cost;
        let mut best_cost = initial_cost;
        let mut inertia = 5i32;
        let mut iter = 0usize;

        loop {
            iter += 1;

            force.clear();
            cost.evaluate_force(&mut force);
            for f in force.iter_mut() {
                *f *= force_scale;
            }
            self.config.solver.solve(&force, &mut v)?;

            let maxshift = self.timestep.calculate_perturbation(&mut v, &local);
            if maxshift <= 0.0 {
                debug!(iter, "velocity vanished, level converged");
                break;
            }
            let delta = step.get_delta(maxshift);

            if self.timestep.regrid_requested(&local, &v, delta) {
                let mut folded = local.clone();
                folded.compose_with(result);
                *result = folded;
                local.clear();
                best_local.clear();
                best_cost = prev_cost;
                debug!(iter, "regridding deformation");
            }

            for (u, vi) in local.iter_mut().zip(v.iter()) {
                *u += delta * *vi;
            }

            let mut composed = local.clone();
            composed.compose_with(result);
            cost.transform(&GridTransform2::from_field(composed), interp);
            let new_cost = cost.value();

            // A new best refills the inertia budget, so the search may keep
            // walking through sub-optimal areas as long as it pays off.
            let improved = new_cost < best_cost;
            if improved {
                best_cost = new_cost;
                best_local.clone_from(&local);
                inertia = 5;
            }
            if new_cost < 0.9 * prev_cost {
                step.increase();
            }
            // Above the best: shrink the step, or spend inertia once it is
            // already at the floor.
            if new_cost > best_cost && !step.decrease() {
                inertia -= 1;
            }
            prev_cost = new_cost;
            debug!(
                iter,
                cost = new_cost,
                best = best_cost,
                step = step.current(),
                inertia,
                "fluid iteration"
            );

            let keep_going = (inertia > 0 || improved)
                && new_cost / initial_cost > self.config.level_epsilon
                && iter < self.config.max_level_iter;
            if !keep_going {
                break;
            }
        }

        let mut folded = best_local;
        folded.compose_with(result);
        *result = folded;
        debug!(iter, initial_cost, best_cost, "level finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::SsdCost;
    use fluidreg_core::filter::deform;
    use fluidreg_core::spatial::Vec2f;

    fn blob(size: Bounds2, cx: f32, cy: f32, sigma: f32) -> Image2 {
        let mut img = Image2::new(size);
        for y in 0..size.y {
            for x in 0..size.x {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                img[(x, y)] = 100.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            }
        }
        img
    }

    fn ssd_value(a: &Image2, b: &Image2) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| 0.5 * ((x - y) as f64).powi(2))
            .sum::<f64>()
            / a.len() as f64
    }

    #[test]
    fn test_shifted_blob_cost_decreases() {
        let size = Bounds2::new(32, 32);
        let reference = blob(size, 16.0, 16.0, 4.0);
        let study = blob(size, 18.0, 15.0, 4.0);
        let before = ssd_value(&study, &reference);

        let driver = FluidRegistration::new(FluidConfig {
            start_size: 32,
            max_level_iter: 50,
            ..FluidConfig::default()
        });
        let field = driver.run(&study, &reference).unwrap().into_field();
        assert_eq!(field.size(), size);

        let warped = deform(&study, &field, &Linear);
        let after = ssd_value(&warped, &reference);
        assert!(
            after < 0.5 * before,
            "cost did not improve: {before} -> {after}"
        );
    }

    #[test]
    fn test_identical_images_give_small_field() {
        let size = Bounds2::new(32, 32);
        let img = blob(size, 16.0, 16.0, 5.0);
        let driver = FluidRegistration::new(FluidConfig {
            start_size: 32,
            ..FluidConfig::default()
        });
        let field = driver.run(&img, &img).unwrap().into_field();
        assert!(field.max_norm() < 1e-3);
    }

    #[test]
    fn test_multi_resolution_field_matches_input_size() {
        let size = Bounds2::new(64, 48);
        let reference = blob(size, 32.0, 24.0, 6.0);
        let study = blob(size, 35.0, 22.0, 6.0);
        let driver = FluidRegistration::new(FluidConfig {
            start_size: 16,
            max_level_iter: 30,
            ..FluidConfig::default()
        });
        let transform = driver.run(&study, &reference).unwrap();
        assert_eq!(transform.field().size(), size);
    }

    #[test]
    fn test_direct_timestep_also_converges() {
        use crate::timestep::DirectTimeStep;

        let size = Bounds2::new(32, 32);
        let reference = blob(size, 16.0, 16.0, 4.0);
        let study = blob(size, 17.0, 16.0, 4.0);
        let before = ssd_value(&study, &reference);
        let driver = FluidRegistration::new(FluidConfig {
            start_size: 32,
            max_level_iter: 50,
            ..FluidConfig::default()
        })
        .with_timestep(Box::new(DirectTimeStep));
        let field = driver.run(&study, &reference).unwrap().into_field();
        let warped = deform(&study, &field, &Linear);
        assert!(ssd_value(&warped, &reference) < before);
    }

    #[test]
    fn test_empty_cost_list_is_rejected() {
        let driver = FluidRegistration::new(FluidConfig::default());
        assert!(driver.run_with_cost(&CostList::new()).is_err());
    }

    #[test]
    fn test_inertia_spans_flat_stretches_of_the_search() {
        use crate::cost::Cost2;
        use crate::timestep::DirectTimeStep;
        use fluidreg_core::interpolation::Interpolator;
        use fluidreg_core::transform::Transform2;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // Cost term that replays a fixed value sequence, one entry per
        // evaluation, with a constant interior force to keep the velocity
        // nonzero.
        struct ScriptedCost {
            size: Bounds2,
            script: Arc<Vec<f64>>,
            cursor: Arc<AtomicUsize>,
        }

        impl Cost2 for ScriptedCost {
            fn name(&self) -> &'static str {
                "scripted"
            }
            fn size(&self) -> Bounds2 {
                self.size
            }
            fn downscaled(&self, _factor: usize) -> Box<dyn Cost2> {
                Box::new(ScriptedCost {
                    size: self.size,
                    script: self.script.clone(),
                    cursor: self.cursor.clone(),
                })
            }
            fn transform(&mut self, _t: &dyn Transform2, _interp: &dyn Interpolator) {}
            fn value(&self) -> f64 {
                let i = self.cursor.fetch_add(1, Ordering::SeqCst);
                self.script[i.min(self.script.len() - 1)]
            }
            fn evaluate_force(&self, weight: f32, force: &mut VectorField2) -> f64 {
                let size = force.size();
                for y in 2..size.y - 2 {
                    for x in 2..size.x - 2 {
                        force[(x, y)] += Vec2f::new(weight, 0.0);
                    }
                }
                0.0
            }
        }

        let size = Bounds2::new(16, 16);
        let cursor = Arc::new(AtomicUsize::new(0));
        // Initial 100, two improvements, a flat stretch at the step floor, a
        // late recovery, then five non-improving values to run inertia out.
        let script = vec![100.0, 90.0, 89.0, 95.0, 96.0, 88.0, 95.0, 95.0, 95.0, 95.0, 95.0];
        let mut cost = CostList::new();
        cost.push(
            1.0,
            Box::new(ScriptedCost {
                size,
                script: Arc::new(script),
                cursor: cursor.clone(),
            }),
        )
        .unwrap();

        // min_step == max_step makes every decrease hit the floor at once.
        let driver = FluidRegistration::new(FluidConfig {
            min_step: 1.0,
            max_step: 1.0,
            ..FluidConfig::default()
        })
        .with_timestep(Box::new(DirectTimeStep));
        let mut result = VectorField2::new(size);
        driver.reg_level(&mut cost, &mut result, &Linear).unwrap();

        // The stretch at the floor spends inertia instead of ending the
        // level, so the recovery at 88 is reached and the run only stops
        // after five further non-improving values: one initial evaluation
        // plus ten iterations.
        assert_eq!(cursor.load(Ordering::SeqCst), 11);
        assert!(result.max_norm() > 0.0);
    }

    #[test]
    fn test_regrid_composition_matches_chained_deformation() {
        // Deforming by the composed field must match deforming twice.
        let size = Bounds2::new(32, 32);
        let img = blob(size, 16.0, 16.0, 5.0);
        let mut inner = VectorField2::new(size);
        let mut outer = VectorField2::new(size);
        for v in inner.iter_mut() {
            *v = Vec2f::new(0.75, -0.5);
        }
        for v in outer.iter_mut() {
            *v = Vec2f::new(-0.25, 0.5);
        }

        let chained = deform(&deform(&img, &outer, &Linear), &inner, &Linear);
        let mut composed = inner;
        composed.compose_with(&outer);
        let direct = deform(&img, &composed, &Linear);

        for y in 4..28 {
            for x in 4..28 {
                assert!(
                    (chained[(x, y)] - direct[(x, y)]).abs() < 0.5,
                    "mismatch at ({x}, {y})"
                );
            }
        }
    }
}
