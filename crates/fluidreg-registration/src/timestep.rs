//! Time-step control for the fluid driver.
//!
//! A [`StepSize`] converts the velocity field returned by the solver into a
//! pixel shift and adapts itself to the optimization progress. The
//! [`TimeStep`] trait turns a velocity into an update of the current
//! displacement and decides when the accumulated deformation has degraded
//! enough that the driver must regrid.

use fluidreg_core::spatial::Vec2f;
use fluidreg_core::vectorfield::VectorField2;
use tracing::debug;

/// Adaptive step length in pixels.
#[derive(Debug, Clone)]
pub struct StepSize {
    pub min: f32,
    pub max: f32,
    current: f32,
}

impl Default for StepSize {
    fn default() -> Self {
        Self::new(0.1, 2.0)
    }
}

impl StepSize {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            current: max,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Scale factor that limits the largest velocity to the current step.
    pub fn get_delta(&self, maxshift: f32) -> f32 {
        if maxshift > 0.0 {
            self.current / maxshift
        } else {
            0.0
        }
    }

    pub fn increase(&mut self) {
        self.current = (self.current * 1.5).min(self.max);
    }

    /// Halve the step. Returns false once the floor is passed, which the
    /// driver treats as a stopping signal.
    pub fn decrease(&mut self) -> bool {
        self.current *= 0.5;
        if self.current < self.min {
            self.current = self.min;
            return false;
        }
        true
    }
}

/// Update policy applied to the solver output each inner iteration.
pub trait TimeStep: Send + Sync {
    /// Turn the velocity `v` into a displacement update given the current
    /// local displacement `u`. Returns the largest norm in the updated field.
    fn calculate_perturbation(&self, v: &mut VectorField2, u: &VectorField2) -> f32;

    /// True when applying `delta * v` on top of `u` would fold the grid.
    fn regrid_requested(&self, u: &VectorField2, v: &VectorField2, delta: f32) -> bool;

    fn name(&self) -> &'static str;
}

/// Fluid-dynamic time step.
///
/// The velocity is corrected by the transport term `(grad u) v` so that the
/// update follows the material flow, and the Jacobian of the composed
/// deformation is monitored to trigger regridding before it folds.
#[derive(Debug, Clone)]
pub struct FluidTimeStep {
    /// Regrid once the minimal Jacobian determinant falls below this.
    pub regrid_thresh: f32,
}

impl Default for FluidTimeStep {
    fn default() -> Self {
        Self { regrid_thresh: 0.5 }
    }
}

fn jacobian_at(u: &VectorField2, v: &VectorField2, delta: f32, x: usize, y: usize) -> f32 {
    let dux = u[(x + 1, y)] - u[(x - 1, y)];
    let duy = u[(x, y + 1)] - u[(x, y - 1)];
    let dvx = v[(x + 1, y)] - v[(x - 1, y)];
    let dvy = v[(x, y + 1)] - v[(x, y - 1)];

    let a = 2.0 - dux.x - delta * dvx.x;
    let b = -duy.x - delta * dvy.x;
    let c = -dux.y - delta * dvx.y;
    let d = 2.0 - duy.y - delta * dvy.y;
    0.25 * (a * d - b * c)
}

impl TimeStep for FluidTimeStep {
    fn calculate_perturbation(&self, v: &mut VectorField2, u: &VectorField2) -> f32 {
        let size = v.size();
        let mut max_norm = 0.0f32;
        for y in 0..size.y {
            for x in 0..size.x {
                let on_border = x == 0 || y == 0 || x + 1 == size.x || y + 1 == size.y;
                if on_border {
                    v[(x, y)] = Vec2f::zeros();
                    continue;
                }
                let vv = v[(x, y)];
                let grad_x = u[(x + 1, y)] - u[(x - 1, y)];
                let grad_y = u[(x, y + 1)] - u[(x, y - 1)];
                let updated = vv - 0.5 * (grad_x * vv.x + grad_y * vv.y);
                v[(x, y)] = updated;
                max_norm = max_norm.max(updated.norm());
            }
        }
        max_norm
    }

    fn regrid_requested(&self, u: &VectorField2, v: &VectorField2, delta: f32) -> bool {
        let size = u.size();
        if size.x < 3 || size.y < 3 {
            return false;
        }
        let mut min_jac = f32::MAX;
        for y in 1..size.y - 1 {
            for x in 1..size.x - 1 {
                min_jac = min_jac.min(jacobian_at(u, v, delta, x, y));
            }
        }
        debug!(min_jac, "deformation jacobian");
        min_jac < self.regrid_thresh
    }

    fn name(&self) -> &'static str {
        "fluid"
    }
}

/// Direct time step: the velocity is applied as-is and no regridding occurs.
#[derive(Debug, Clone, Default)]
pub struct DirectTimeStep;

impl TimeStep for DirectTimeStep {
    fn calculate_perturbation(&self, v: &mut VectorField2, _u: &VectorField2) -> f32 {
        v.max_norm()
    }

    fn regrid_requested(&self, _u: &VectorField2, _v: &VectorField2, _delta: f32) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluidreg_core::spatial::Bounds2;

    #[test]
    fn test_step_size_adaptation() {
        let mut step = StepSize::new(0.1, 2.0);
        assert_eq!(step.current(), 2.0);
        step.increase();
        assert_eq!(step.current(), 2.0);
        assert!(step.decrease());
        assert_eq!(step.current(), 1.0);
        while step.current() > 0.1 {
            step.decrease();
        }
        assert!(!step.decrease());
        assert_eq!(step.current(), 0.1);
    }

    #[test]
    fn test_delta_limits_max_shift() {
        let step = StepSize::new(0.1, 2.0);
        assert!((step.get_delta(4.0) - 0.5).abs() < 1e-6);
        assert_eq!(step.get_delta(0.0), 0.0);
    }

    #[test]
    fn test_perturbation_zero_displacement_keeps_interior() {
        let size = Bounds2::new(8, 8);
        let u = VectorField2::new(size);
        let mut v = VectorField2::new(size);
        v[(3, 3)] = Vec2f::new(1.0, -2.0);
        v[(0, 4)] = Vec2f::new(9.0, 9.0);
        let max = FluidTimeStep::default().calculate_perturbation(&mut v, &u);
        assert_eq!(v[(3, 3)], Vec2f::new(1.0, -2.0));
        assert_eq!(v[(0, 4)], Vec2f::zeros());
        assert!((max - (5.0f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_perturbation_applies_transport_term() {
        let size = Bounds2::new(8, 8);
        let mut u = VectorField2::new(size);
        // u.x grows linearly in x, so (u(x+1)-u(x-1)).x = 0.4.
        for y in 0..8 {
            for x in 0..8 {
                u[(x, y)] = Vec2f::new(0.2 * x as f32, 0.0);
            }
        }
        let mut v = VectorField2::new(size);
        v[(4, 4)] = Vec2f::new(1.0, 0.0);
        FluidTimeStep::default().calculate_perturbation(&mut v, &u);
        // v -= 0.5 * 0.4 * v.x in the x component.
        assert!((v[(4, 4)].x - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_identity_deformation_never_regrids() {
        let size = Bounds2::new(8, 8);
        let u = VectorField2::new(size);
        let v = VectorField2::new(size);
        assert!(!FluidTimeStep::default().regrid_requested(&u, &v, 1.0));
    }

    #[test]
    fn test_steep_displacement_requests_regrid() {
        let size = Bounds2::new(8, 8);
        let mut u = VectorField2::new(size);
        for y in 0..8 {
            for x in 0..8 {
                u[(x, y)] = Vec2f::new(0.9 * x as f32, 0.0);
            }
        }
        let v = VectorField2::new(size);
        assert!(FluidTimeStep::default().regrid_requested(&u, &v, 1.0));
    }

    #[test]
    fn test_direct_step_passes_velocity_through() {
        let size = Bounds2::new(6, 6);
        let u = VectorField2::new(size);
        let mut v = VectorField2::new(size);
        v[(2, 2)] = Vec2f::new(3.0, 4.0);
        let max = DirectTimeStep.calculate_perturbation(&mut v, &u);
        assert_eq!(v[(2, 2)], Vec2f::new(3.0, 4.0));
        assert!((max - 5.0).abs() < 1e-6);
        assert!(!DirectTimeStep.regrid_requested(&u, &v, 1.0));
    }
}
