//! Gradient computation using Sobel filters.
//!
//! Along each axis the stencil is the central difference `[-1, 0, 1] / 2`
//! combined with `[1, 2, 1] / 4` smoothing on the remaining axes: the usual
//! 3x3 Sobel scaled by 1/8 in 2D and the 3x3x3 Sobel scaled by 1/32 in 3D.
//! Every cell, including edge cells, reads its neighbours through periodic
//! wrap.

use super::GridShape;

/// Per-cell gradient vector; the z component is zero on 2D grids.
pub type Vector = [f64; 3];

const DERIV: [f64; 3] = [-1.0, 0.0, 1.0];
const SMOOTH: [f64; 3] = [1.0, 2.0, 1.0];

/// Compute the gradient of a whole grid.
pub fn sobel_gradient(grid: &[f64], shape: GridShape) -> Vec<Vector> {
    let mut out = vec![[0.0; 3]; shape.len()];
    sobel_gradient_into(grid, shape, &mut out);
    out
}

/// Compute the gradient of a whole grid into a pre-allocated buffer.
#[inline]
pub fn sobel_gradient_into(grid: &[f64], shape: GridShape, out: &mut [Vector]) {
    sobel_gradient_chunk(grid, shape, 0, out);
}

/// Compute the gradient for the cells `offset..offset + out.len()`.
///
/// Reads the whole grid, writes only `out`, so disjoint chunks may run
/// concurrently.
pub fn sobel_gradient_chunk(grid: &[f64], shape: GridShape, offset: usize, out: &mut [Vector]) {
    if shape.ndim() == 3 {
        sobel_chunk_3d(grid, shape, offset, out);
    } else {
        sobel_chunk_2d(grid, shape, offset, out);
    }
}

fn sobel_chunk_2d(grid: &[f64], shape: GridShape, offset: usize, out: &mut [Vector]) {
    let width = shape.width;
    let height = shape.height;

    for (i, g) in out.iter_mut().enumerate() {
        let idx = offset + i;
        let x = idx % width;
        let y = idx / width;

        let y_prev = (y + height - 1) % height;
        let y_next = (y + 1) % height;
        let x_prev = (x + width - 1) % width;
        let x_next = (x + 1) % width;

        let row_prev = y_prev * width;
        let row_curr = y * width;
        let row_next = y_next * width;

        let tl = grid[row_prev + x_prev];
        let tc = grid[row_prev + x];
        let tr = grid[row_prev + x_next];
        let ml = grid[row_curr + x_prev];
        let mr = grid[row_curr + x_next];
        let bl = grid[row_next + x_prev];
        let bc = grid[row_next + x];
        let br = grid[row_next + x_next];

        // Sobel X: [-1, 0, 1; -2, 0, 2; -1, 0, 1]
        let gx = (-tl + tr - 2.0 * ml + 2.0 * mr - bl + br) * 0.125;

        // Sobel Y: [-1, -2, -1; 0, 0, 0; 1, 2, 1]
        let gy = (-tl - 2.0 * tc - tr + bl + 2.0 * bc + br) * 0.125;

        *g = [gx, gy, 0.0];
    }
}

fn sobel_chunk_3d(grid: &[f64], shape: GridShape, offset: usize, out: &mut [Vector]) {
    let [width, height, depth] = shape.extents();

    for (i, g) in out.iter_mut().enumerate() {
        let [x, y, z] = shape.coords(offset + i);
        let xs = [(x + width - 1) % width, x, (x + 1) % width];
        let ys = [(y + height - 1) % height, y, (y + 1) % height];
        let zs = [(z + depth - 1) % depth, z, (z + 1) % depth];

        let mut acc = [0.0f64; 3];
        for (kz, &sz) in zs.iter().enumerate() {
            for (ky, &sy) in ys.iter().enumerate() {
                for (kx, &sx) in xs.iter().enumerate() {
                    let v = grid[shape.index(sx, sy, sz)];
                    acc[0] += DERIV[kx] * SMOOTH[ky] * SMOOTH[kz] * v;
                    acc[1] += SMOOTH[kx] * DERIV[ky] * SMOOTH[kz] * v;
                    acc[2] += SMOOTH[kx] * SMOOTH[ky] * DERIV[kz] * v;
                }
            }
        }

        *g = acc.map(|a| a / 32.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_gradient_uniform() {
        // Uniform field should have zero gradient
        for shape in [GridShape::new_2d(16, 16), GridShape::new(8, 8, 8)] {
            let grid = vec![1.0; shape.len()];
            for g in sobel_gradient(&grid, shape) {
                for v in g {
                    assert!(v.abs() < 1e-12, "Expected zero gradient, got {}", v);
                }
            }
        }
    }

    #[test]
    fn test_gradient_linear_ramp_interior() {
        // d/dx of x is 1 away from the wrap seam
        let shape = GridShape::new_2d(16, 16);
        let mut grid = vec![0.0; shape.len()];
        for y in 0..16 {
            for x in 0..16 {
                grid[shape.index(x, y, 0)] = x as f64;
            }
        }

        let grad = sobel_gradient(&grid, shape);
        for y in 0..16 {
            for x in 1..15 {
                let g = grad[shape.index(x, y, 0)];
                assert!((g[0] - 1.0).abs() < 1e-12);
                assert!(g[1].abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_gradient_periodic_smooth() {
        // A sin wave along x: gradient follows cos including at the edges
        let shape = GridShape::new_2d(16, 16);
        let mut grid = vec![0.0; shape.len()];
        for y in 0..16 {
            for x in 0..16 {
                grid[shape.index(x, y, 0)] = (2.0 * PI * x as f64 / 16.0).sin();
            }
        }

        let grad = sobel_gradient(&grid, shape);
        for y in 0..16 {
            for x in 0..16 {
                let g = grad[shape.index(x, y, 0)];
                assert!(g[1].abs() < 1e-12);
                let expected_sign = (2.0 * PI * x as f64 / 16.0).cos();
                if expected_sign.abs() > 0.3 {
                    assert!(
                        g[0] * expected_sign > 0.0,
                        "X gradient sign mismatch at ({}, {}): got {}",
                        x,
                        y,
                        g[0]
                    );
                }
            }
        }
    }

    #[test]
    fn test_gradient_3d_axes() {
        // Each axis picks up only its own variation
        let shape = GridShape::new(8, 8, 8);
        for axis in 0..3 {
            let grid: Vec<f64> = (0..shape.len())
                .map(|i| (2.0 * PI * shape.coords(i)[axis] as f64 / 8.0).sin())
                .collect();
            let grad = sobel_gradient(&grid, shape);
            for (i, g) in grad.iter().enumerate() {
                for other in (0..3).filter(|&a| a != axis) {
                    assert!(g[other].abs() < 1e-12, "axis {} leaked into {}", axis, other);
                }
                let c = (2.0 * PI * shape.coords(i)[axis] as f64 / 8.0).cos();
                if c.abs() > 0.3 {
                    assert!(g[axis] * c > 0.0);
                }
            }
        }
    }

    #[test]
    fn test_3d_matches_2d_on_constant_depth() {
        // A field constant in z has the 2D gradient in x/y and zero in z
        let shape_2d = GridShape::new_2d(10, 12);
        let shape_3d = GridShape::new(10, 12, 4);
        let plane: Vec<f64> = (0..shape_2d.len())
            .map(|i| ((i * 31) % 17) as f64 / 17.0)
            .collect();
        let volume: Vec<f64> = (0..shape_3d.len())
            .map(|i| plane[i % shape_2d.len()])
            .collect();

        let g2 = sobel_gradient(&plane, shape_2d);
        let g3 = sobel_gradient(&volume, shape_3d);
        for (i, g) in g3.iter().enumerate() {
            let p = g2[i % shape_2d.len()];
            assert!((g[0] - p[0]).abs() < 1e-12);
            assert!((g[1] - p[1]).abs() < 1e-12);
            assert!(g[2].abs() < 1e-12);
        }
    }

    #[test]
    fn test_chunks_match_whole() {
        let shape = GridShape::new_2d(12, 9);
        let grid: Vec<f64> = (0..shape.len()).map(|i| (i as f64 * 0.7).cos()).collect();
        let whole = sobel_gradient(&grid, shape);

        let mut chunked = vec![[0.0; 3]; shape.len()];
        for (n, chunk) in chunked.chunks_mut(25).enumerate() {
            sobel_gradient_chunk(&grid, shape, n * 25, chunk);
        }
        assert_eq!(whole, chunked);
    }
}
