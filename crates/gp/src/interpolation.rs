//! Structured kernel interpolation on regular one-dimensional grids.
//!
//! A kernel matrix `K(x, x')` is approximated by `W T W'^T` where `T` is the kernel evaluated
//! on grid points and `W` holds cubic convolution interpolation weights (Keys kernel with
//! `a = -0.75`), four non-zero weights per input point.

use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Zip};

/// Number of grid points used to interpolate one input value
pub const N_INTERPOLATION_POINTS: usize = 4;
/// Minimum grid size allowing cubic interpolation with one spacing of padding
pub const MIN_GRID_SIZE: usize = 4;

const CUBIC_A: f64 = -0.75;

/// A regular one-dimensional grid covering `[lower, upper]` data bounds
/// padded with one spacing on each side.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<F: Float> {
    lower: F,
    upper: F,
    origin: F,
    spacing: F,
    size: usize,
}

impl<F: Float> Grid<F> {
    /// Build a grid of `size` points for data within `bounds` (lower, upper).
    ///
    /// Degenerate bounds (lower == upper) are widened by one on each side.
    pub fn new(bounds: (F, F), size: usize) -> Result<Self> {
        let (mut lower, mut upper) = bounds;
        if size < MIN_GRID_SIZE {
            return Err(GpError::InvalidValueError(format!(
                "Grid size should be at least {MIN_GRID_SIZE}, got {size}"
            )));
        }
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(GpError::InvalidValueError(format!(
                "Bad grid bounds ({lower}, {upper})"
            )));
        }
        if lower == upper {
            lower -= F::one();
            upper += F::one();
        }
        let spacing = (upper - lower) / F::cast(size - 3);
        Ok(Grid {
            lower,
            upper,
            origin: lower - spacing,
            spacing,
            size,
        })
    }

    /// Number of grid points
    pub fn size(&self) -> usize {
        self.size
    }

    /// Distance between two consecutive grid points
    pub fn spacing(&self) -> F {
        self.spacing
    }

    /// Data bounds covered by the grid
    pub fn bounds(&self) -> (F, F) {
        (self.lower, self.upper)
    }

    /// Grid point locations
    pub fn points(&self) -> Array1<F> {
        Array1::from_shape_fn(self.size, |k| self.origin + F::cast(k) * self.spacing)
    }

    /// Whether all `x` values lie within the grid bounds
    pub fn covers(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> bool {
        x.iter().all(|&v| v >= self.lower && v <= self.upper)
    }

    /// Compute interpolation weights of `x` values on the grid.
    /// Values outside grid bounds are clamped to the bounds, see [Grid::covers].
    pub fn interpolate(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Interpolation<F> {
        let n = x.len();
        let mut indices = Array2::<usize>::zeros((n, N_INTERPOLATION_POINTS));
        let mut weights = Array2::<F>::zeros((n, N_INTERPOLATION_POINTS));
        let last_left = self.size - 3;
        Zip::from(indices.rows_mut())
            .and(weights.rows_mut())
            .and(x)
            .for_each(|mut idx, mut w, &xi| {
                let xc = xi.max(self.lower).min(self.upper);
                let u = (xc - self.origin) / self.spacing;
                let left = u.floor().to_usize().unwrap_or(1).clamp(1, last_left);
                let t = u - F::cast(left);
                for (a, offset) in (-1i32..=2).enumerate() {
                    idx[a] = (left as i32 + offset) as usize;
                    w[a] = cubic_kernel(t - F::cast(offset));
                }
            });
        Interpolation {
            indices,
            weights,
            grid_size: self.size,
        }
    }
}

/// Keys cubic convolution kernel
fn cubic_kernel<F: Float>(s: F) -> F {
    let a = F::cast(CUBIC_A);
    let two = F::cast(2.);
    let three = F::cast(3.);
    let s = s.abs();
    if s <= F::one() {
        ((a + two) * s - (a + three)) * s * s + F::one()
    } else if s < two {
        ((a * s - F::cast(5.) * a) * s + F::cast(8.) * a) * s - F::cast(4.) * a
    } else {
        F::zero()
    }
}

/// Sparse interpolation matrix `W` of shape (n, grid_size)
/// with [N_INTERPOLATION_POINTS] non-zero values per row.
#[derive(Clone, Debug, PartialEq)]
pub struct Interpolation<F: Float> {
    indices: Array2<usize>,
    weights: Array2<F>,
    grid_size: usize,
}

impl<F: Float> Interpolation<F> {
    /// Number of interpolated points (rows of W)
    pub fn n_points(&self) -> usize {
        self.indices.nrows()
    }

    /// Number of grid points (columns of W)
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Grid indices (n, 4)
    pub fn indices(&self) -> &Array2<usize> {
        &self.indices
    }

    /// Interpolation weights (n, 4)
    pub fn weights(&self) -> &Array2<F> {
        &self.weights
    }

    /// `W u` for a vector `u` of grid values
    pub fn matvec(&self, u: &ArrayView1<F>) -> Array1<F> {
        let mut res = Array1::zeros(self.n_points());
        Zip::from(&mut res)
            .and(self.indices.rows())
            .and(self.weights.rows())
            .for_each(|r, idx, w| {
                *r = idx
                    .iter()
                    .zip(w.iter())
                    .fold(F::zero(), |acc, (&i, &wi)| acc + wi * u[i]);
            });
        res
    }

    /// `W^T v` for a vector `v` of point values
    pub fn rmatvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        let mut res = Array1::zeros(self.grid_size);
        Zip::from(self.indices.rows())
            .and(self.weights.rows())
            .and(v)
            .for_each(|idx, w, &vi| {
                idx.iter()
                    .zip(w.iter())
                    .for_each(|(&i, &wi)| res[i] += wi * vi);
            });
        res
    }

    /// `W P` for a (grid_size, p) matrix `P`
    pub fn left_apply(&self, p: &ArrayView2<F>) -> Array2<F> {
        let mut res = Array2::zeros((self.n_points(), p.ncols()));
        Zip::from(res.rows_mut())
            .and(self.indices.rows())
            .and(self.weights.rows())
            .for_each(|mut row, idx, w| {
                idx.iter()
                    .zip(w.iter())
                    .for_each(|(&i, &wi)| row.scaled_add(wi, &p.row(i)));
            });
        res
    }

    /// `T W^T` for a (grid_size, grid_size) dense matrix `T`, result is (grid_size, n)
    pub fn right_apply_transpose(&self, t: &ArrayView2<F>) -> Array2<F> {
        let mut res = Array2::zeros((t.nrows(), self.n_points()));
        Zip::from(res.columns_mut())
            .and(self.indices.rows())
            .and(self.weights.rows())
            .for_each(|mut col, idx, w| {
                idx.iter()
                    .zip(w.iter())
                    .for_each(|(&i, &wi)| col.scaled_add(wi, &t.column(i)));
            });
        res
    }

    /// Dense (n, grid_size) interpolation matrix
    pub fn to_dense(&self) -> Array2<F> {
        let mut res = Array2::zeros((self.n_points(), self.grid_size));
        Zip::from(res.rows_mut())
            .and(self.indices.rows())
            .and(self.weights.rows())
            .for_each(|mut row, idx, w| {
                idx.iter()
                    .zip(w.iter())
                    .for_each(|(&i, &wi)| row[i] += wi);
            });
        res
    }
}
