//! Grid geometry shared by every spatial operator.
//!
//! All grids are tori: every axis wraps, so the first and last cells along an
//! axis are neighbours. Data is laid out row-major as `z * H * W + y * W + x`.

use serde::{Deserialize, Serialize};

/// Extents of a 2D (`depth == 1`) or 3D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl GridShape {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Shorthand for a 2D grid.
    pub fn new_2d(width: usize, height: usize) -> Self {
        Self::new(width, height, 1)
    }

    /// Number of spatial axes (2 or 3).
    #[inline]
    pub fn ndim(&self) -> usize {
        if self.depth > 1 { 3 } else { 2 }
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extents as `[width, height, depth]`.
    #[inline]
    pub fn extents(&self) -> [usize; 3] {
        [self.width, self.height, self.depth]
    }

    /// Convert (x, y, z) coordinates to flat index.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// Convert flat index back to (x, y, z).
    #[inline]
    pub fn coords(&self, idx: usize) -> [usize; 3] {
        let x = idx % self.width;
        let y = (idx / self.width) % self.height;
        let z = idx / (self.width * self.height);
        [x, y, z]
    }

    /// Flat index of a possibly out-of-range integer position, wrapped onto
    /// the torus.
    #[inline]
    pub fn wrapped_index(&self, x: i64, y: i64, z: i64) -> usize {
        self.index(
            wrap_coord(x, self.width),
            wrap_coord(y, self.height),
            wrap_coord(z, self.depth),
        )
    }

    /// Number of cells in one slab of the outermost axis (a row in 2D, an
    /// XY plane in 3D).
    #[inline]
    pub fn slab_len(&self) -> usize {
        if self.ndim() == 3 {
            self.width * self.height
        } else {
            self.width
        }
    }

    /// Number of slabs along the outermost axis.
    #[inline]
    pub fn slab_count(&self) -> usize {
        if self.ndim() == 3 {
            self.depth
        } else {
            self.height
        }
    }
}

/// Wrap coordinate to periodic boundary.
///
/// Works for any distance outside the grid, so offsets spanning several grid
/// lengths wrap as many times as needed.
#[inline]
pub fn wrap_coord(coord: i64, size: usize) -> usize {
    coord.rem_euclid(size as i64) as usize
}

/// Signed minimum-image offset of `coord` from the origin on an axis of
/// length `size`, in `[-size/2, size/2)`.
#[inline]
pub fn periodic_offset(coord: usize, size: usize) -> i64 {
    let c = coord as i64;
    let s = size as i64;
    if c >= (s + 1) / 2 { c - s } else { c }
}
