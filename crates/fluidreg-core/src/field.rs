//! Dense 2-D grid container.
//!
//! `Field2<T>` is the storage type behind images, masks and vector fields:
//! a row-major buffer with an explicit extent, per-row strided access and
//! clipped rectangular window iteration.

use crate::error::{CoreError, Result};
use crate::spatial::Bounds2;
use std::ops::{Index, IndexMut};

/// Dense row-major 2-D grid of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field2<T> {
    size: Bounds2,
    data: Vec<T>,
}

impl<T: Clone + Default> Field2<T> {
    /// Create a field of the given size filled with `T::default()`.
    ///
    /// # Panics
    /// Panics if the extent product overflows; use [`Field2::try_new`] where
    /// the size comes from untrusted input.
    pub fn new(size: Bounds2) -> Self {
        Self {
            data: vec![T::default(); size.product()],
            size,
        }
    }

    /// Fallible variant of [`Field2::new`].
    ///
    /// Oversized grids surface as [`CoreError::AllocationFailure`] instead
    /// of aborting at the allocation site.
    pub fn try_new(size: Bounds2) -> Result<Self> {
        let elems = (size.x as u128) * (size.y as u128);
        if elems > (isize::MAX as u128) / (std::mem::size_of::<T>().max(1) as u128) {
            return Err(CoreError::AllocationFailure { size: elems });
        }
        Ok(Self::new(size))
    }

    /// Reset every element to `T::default()`.
    pub fn clear(&mut self) {
        self.data.fill(T::default());
    }
}

impl<T> Field2<T> {
    /// Create a field from an existing buffer.
    ///
    /// # Panics
    /// Panics if the buffer length does not match the extent.
    pub fn from_vec(size: Bounds2, data: Vec<T>) -> Self {
        assert_eq!(data.len(), size.product(), "buffer length must match extent");
        Self { size, data }
    }

    pub fn size(&self) -> Bounds2 {
        self.size
    }

    pub fn width(&self) -> usize {
        self.size.x
    }

    pub fn height(&self) -> usize {
        self.size.y
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.data.fill(value);
    }

    /// Flat element access in row-major order.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// One grid row as a slice.
    pub fn row(&self, y: usize) -> &[T] {
        let w = self.size.x;
        &self.data[y * w..(y + 1) * w]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let w = self.size.x;
        &mut self.data[y * w..(y + 1) * w]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.size.x.max(1))
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        self.data.chunks_mut(self.size.x.max(1))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    /// Iterate a half-open rectangular window `[lo, hi)`.
    ///
    /// The caller is expected to have clipped the window to the grid, e.g.
    /// via [`crate::spatial::clip_window`]; each item carries a flag telling
    /// whether the element lies on the outermost ring of the grid.
    pub fn window(&self, lo: Bounds2, hi: Bounds2) -> impl Iterator<Item = (&T, bool)> {
        debug_assert!(hi.x <= self.size.x && hi.y <= self.size.y);
        let size = self.size;
        (lo.y..hi.y).flat_map(move |y| {
            self.row(y)[lo.x..hi.x].iter().enumerate().map(move |(i, v)| {
                let x = lo.x + i;
                let boundary = x == 0 || y == 0 || x + 1 == size.x || y + 1 == size.y;
                (v, boundary)
            })
        })
    }

    /// Checked single-element access.
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x < self.size.x && y < self.size.y {
            Some(&self.data[y * self.size.x + x])
        } else {
            None
        }
    }
}

impl<T> Index<(usize, usize)> for Field2<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        debug_assert!(x < self.size.x && y < self.size.y);
        &self.data[y * self.size.x + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Field2<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        debug_assert!(x < self.size.x && y < self.size.y);
        &mut self.data[y * self.size.x + x]
    }
}
