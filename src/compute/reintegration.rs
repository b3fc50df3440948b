//! Reintegration tracking for mass-conservative state updates.
//!
//! Every source cell moves its whole mass to `position + dt * flow` and
//! splats it over the `2^D` cells surrounding that continuous destination
//! with bilinear (trilinear in 3D) weights. The weights of a single source
//! sum to one and deposits only ever add to a separate output buffer, so the
//! total mass is preserved exactly up to rounding.

use std::ops::Range;

use super::{GridShape, Vector};

/// Splat weights for a fractional offset `frac` in `[0, 1)^D`.
///
/// Corner `c` (bit 0 = x, bit 1 = y, bit 2 = z) covers cell `floor + c`.
/// Only the first `2^ndim` entries are meaningful; the rest are zero.
#[inline]
pub fn deposit_weights(frac: [f64; 3], ndim: usize) -> [f64; 8] {
    let mut weights = [0.0f64; 8];
    let corners = 1usize << ndim;
    for (c, w) in weights.iter_mut().enumerate().take(corners) {
        let mut weight = 1.0;
        for (axis, &f) in frac.iter().enumerate().take(ndim) {
            weight *= if c & (1 << axis) != 0 { f } else { 1.0 - f };
        }
        *w = weight;
    }
    weights
}

/// Visit the cells covering continuous position `dest` with their splat
/// weights.
///
/// Every axis is reduced onto the torus in floating point before the cell
/// index is taken, so destinations any number of grid lengths away wrap
/// without integer overflow. Non-finite positions produce NaN weights.
#[inline]
pub fn splat(shape: GridShape, dest: [f64; 3], mut visit: impl FnMut(usize, f64)) {
    let ndim = shape.ndim();
    let extents = shape.extents();
    let mut base = [0i64; 3];
    let mut frac = [0.0f64; 3];
    for axis in 0..3 {
        let p = dest[axis].rem_euclid(extents[axis] as f64);
        let cell = p.floor();
        frac[axis] = p - cell;
        // `p` can round up to exactly the extent; `wrapped_index` folds it back
        base[axis] = cell as i64;
    }
    let weights = deposit_weights(frac, ndim);

    for (c, &w) in weights.iter().enumerate().take(1 << ndim) {
        let ix = base[0] + (c & 1) as i64;
        let iy = base[1] + ((c >> 1) & 1) as i64;
        let iz = base[2] + ((c >> 2) & 1) as i64;
        visit(shape.wrapped_index(ix, iy, iz), w);
    }
}

/// Deposit `mass` at continuous position `dest` into `grid`.
#[inline]
pub fn deposit(grid: &mut [f64], shape: GridShape, mass: f64, dest: [f64; 3]) {
    splat(shape, dest, |idx, w| grid[idx] += mass * w);
}

/// Continuous destination of the cell at `idx` after moving along `flow`
/// for `dt`. In 2D the z coordinate stays put.
#[inline]
pub fn destination(shape: GridShape, idx: usize, flow: Vector, dt: f64) -> [f64; 3] {
    let [x, y, z] = shape.coords(idx);
    [
        x as f64 + dt * flow[0],
        y as f64 + dt * flow[1],
        if shape.ndim() == 3 {
            z as f64 + dt * flow[2]
        } else {
            z as f64
        },
    ]
}

/// Advect the source cells in `cells`, accumulating into `next`.
///
/// `next` is the full destination grid and is not cleared here, so several
/// ranges can be folded into one buffer or into per-worker buffers.
pub fn reintegrate_range(
    current: &[f64],
    flow: &[Vector],
    shape: GridShape,
    dt: f64,
    cells: Range<usize>,
    next: &mut [f64],
) {
    for idx in cells {
        let mass = current[idx];
        if mass == 0.0 {
            continue;
        }
        deposit(next, shape, mass, destination(shape, idx, flow[idx], dt));
    }
}

/// Advect a whole channel into a fresh (zeroed) destination buffer.
pub fn reintegrate_into(
    current: &[f64],
    flow: &[Vector],
    shape: GridShape,
    dt: f64,
    next: &mut [f64],
) {
    next.fill(0.0);
    reintegrate_range(current, flow, shape, dt, 0..shape.len(), next);
}

/// Calculate total mass in grid (for conservation checking).
pub fn total_mass(grid: &[f64]) -> f64 {
    grid.iter().sum()
}

/// Calculate total mass across all channels.
pub fn total_mass_all_channels(channels: &[Vec<f64>]) -> f64 {
    channels.iter().map(|c| total_mass(c)).sum()
}
