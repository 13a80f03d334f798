//! Weighted composition of cost terms.

use crate::cost::trait_::Cost2;
use crate::error::{RegistrationError, Result};
use fluidreg_core::interpolation::Interpolator;
use fluidreg_core::spatial::Bounds2;
use fluidreg_core::transform::Transform2;
use fluidreg_core::vectorfield::VectorField2;

struct CostTerm {
    weight: f64,
    cost: Box<dyn Cost2>,
}

/// Weighted sum of cost terms sharing one grid.
///
/// The total value is `sum(w_i * value_i)`; force evaluation accumulates
/// every term's weighted force into one shared field. All terms must be
/// defined on the same grid.
#[derive(Default)]
pub struct CostList {
    terms: Vec<CostTerm>,
}

impl CostList {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Add a term with the given weight.
    pub fn push(&mut self, weight: f64, cost: Box<dyn Cost2>) -> Result<()> {
        if let Some(first) = self.terms.first() {
            if first.cost.size() != cost.size() {
                return Err(RegistrationError::SizeMismatch {
                    expected: first.cost.size(),
                    actual: cost.size(),
                });
            }
        }
        self.terms.push(CostTerm { weight, cost });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Shared grid extent of all terms.
    ///
    /// Fails when the list is empty; an empty list has no grid to report.
    pub fn size(&self) -> Result<Bounds2> {
        self.terms
            .first()
            .map(|t| t.cost.size())
            .ok_or_else(|| RegistrationError::invalid_configuration("cost list is empty"))
    }

    /// Copy of the list with every term block-averaged by `factor`.
    pub fn downscaled(&self, factor: usize) -> CostList {
        CostList {
            terms: self
                .terms
                .iter()
                .map(|t| CostTerm {
                    weight: t.weight,
                    cost: t.cost.downscaled(factor),
                })
                .collect(),
        }
    }

    /// Deform every term's study image by `t`.
    pub fn transform(&mut self, t: &dyn Transform2, interp: &dyn Interpolator) {
        for term in &mut self.terms {
            term.cost.transform(t, interp);
        }
    }

    /// Weighted total cost of the current deformed state.
    pub fn value(&self) -> f64 {
        self.terms.iter().map(|t| t.weight * t.cost.value()).sum()
    }

    /// Weighted total cost, accumulating all weighted forces into `force`.
    pub fn evaluate_force(&self, force: &mut VectorField2) -> f64 {
        self.terms
            .iter()
            .map(|t| t.weight * t.cost.evaluate_force(t.weight as f32, force))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::ssd::SsdCost;
    use fluidreg_core::image::Image2;

    fn ramp(size: Bounds2, slope: f32) -> Image2 {
        let mut img = Image2::new(size);
        for y in 0..size.y {
            for x in 0..size.x {
                img[(x, y)] = slope * x as f32;
            }
        }
        img
    }

    #[test]
    fn test_weights_scale_the_total() {
        let size = Bounds2::new(8, 8);
        let a = ramp(size, 1.0);
        let b = ramp(size, 2.0);

        let mut single = CostList::new();
        single
            .push(1.0, Box::new(SsdCost::new(a.clone(), b.clone()).unwrap()))
            .unwrap();
        let mut double = CostList::new();
        double
            .push(2.0, Box::new(SsdCost::new(a, b).unwrap()))
            .unwrap();

        assert!((double.value() - 2.0 * single.value()).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_term_size_is_rejected() {
        let mut list = CostList::new();
        let a = Image2::new(Bounds2::new(8, 8));
        let b = Image2::new(Bounds2::new(4, 4));
        list.push(1.0, Box::new(SsdCost::new(a.clone(), a.clone()).unwrap()))
            .unwrap();
        assert!(list
            .push(1.0, Box::new(SsdCost::new(b.clone(), b).unwrap()))
            .is_err());
    }

    #[test]
    fn test_empty_list_has_no_size() {
        let list = CostList::new();
        assert!(list.size().is_err());
        assert_eq!(list.value(), 0.0);
    }

    #[test]
    fn test_downscaled_shrinks_grid() {
        let size = Bounds2::new(16, 16);
        let a = ramp(size, 1.0);
        let mut list = CostList::new();
        list.push(1.0, Box::new(SsdCost::new(a.clone(), a).unwrap()))
            .unwrap();
        let small = list.downscaled(4);
        assert_eq!(small.size().unwrap(), Bounds2::new(4, 4));
    }
}
