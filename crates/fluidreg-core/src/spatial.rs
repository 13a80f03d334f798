//! Spatial primitives: grid extents and small fixed-size linear algebra.

use std::fmt;
use std::ops::{Add, Sub};

/// 2-D vector in continuous pixel coordinates.
pub type Vec2f = nalgebra::Vector2<f32>;

/// 2x2 matrix, used for transform Jacobians.
pub type Mat2f = nalgebra::Matrix2<f32>;

/// Extent of a 2-D grid in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds2 {
    pub x: usize,
    pub y: usize,
}

impl Bounds2 {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Total number of grid elements.
    pub fn product(&self) -> usize {
        self.x * self.y
    }

    /// True if either extent is zero.
    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0
    }

    /// Continuous center of the grid.
    pub fn center(&self) -> Vec2f {
        Vec2f::new(self.x as f32 / 2.0, self.y as f32 / 2.0)
    }
}

impl fmt::Display for Bounds2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

impl Add for Bounds2 {
    type Output = Bounds2;

    fn add(self, rhs: Bounds2) -> Bounds2 {
        Bounds2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Bounds2 {
    type Output = Bounds2;

    fn sub(self, rhs: Bounds2) -> Bounds2 {
        Bounds2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Clip a centered window `[center-hw, center+hw]` to `[0, size)`.
///
/// Returns the half-open range `(begin, end)` along one axis.
pub fn clip_window(center: usize, hw: usize, size: usize) -> (usize, usize) {
    let begin = center.saturating_sub(hw);
    let end = (center + hw + 1).min(size);
    (begin, end)
}
