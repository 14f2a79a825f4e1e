//! Structured Kernel Interpolation for Products (SKIP).
//!
//! The covariance of a product kernel `k(x, x') = s prod_d k_d(x_d, x'_d)` is approximated
//! dimension-wise by interpolation on regular grids `K_d ≈ W_d T_d W_d^T` where `T_d` is a
//! symmetric Toeplitz matrix. Each `K_d` is compressed into a low rank root with Lanczos and
//! roots are merged by pairs through element-wise products, each merge being recompressed
//! to a maximal rank, giving `K ≈ s R R^T`.
//!
//! Reference:
//!
//! Gardner, J. R., Pleiss, G., Wu, R., Weinberger, K. Q., & Wilson, A. G. (2018).
//! Product Kernel Interpolation for Scalable Gaussian Processes. AISTATS.

use crate::errors::{GpError, Result};
use crate::interpolation::{Grid, Interpolation};
use crate::kernels::{GridKernel, Kernel, check_length};
use crate::lanczos::root_decomposition;
use crate::lazy::{HadamardRootOperator, InterpolatedOperator, LinearOperator, ToeplitzOperator};
use crate::utils::{column_bounds, inv_softplus, sigmoid, softplus};
use linfa::Float;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;

/// Default number of grid points per dimension
pub const SKIP_DEFAULT_GRID_SIZE: usize = 100;

/// SKIP kernel `s prod_d W_d T_d W_d^T` built over a 1D grid kernel
#[derive(Clone, Debug, PartialEq)]
pub struct SkipKernel<F: Float, K: GridKernel<F>> {
    base: K,
    raw_outputscale: F,
    grid_size: usize,
    grids: Vec<Grid<F>>,
}

impl<F: Float, K: GridKernel<F>> SkipKernel<F, K> {
    /// SKIP kernel over 1D `base` kernel, grids are not set yet
    pub fn new(base: K) -> Self {
        SkipKernel {
            base,
            raw_outputscale: F::zero(),
            grid_size: SKIP_DEFAULT_GRID_SIZE,
            grids: vec![],
        }
    }

    /// Set number of points of each dimension grid
    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set outputscale value
    pub fn with_outputscale(mut self, outputscale: F) -> Result<Self> {
        if !(outputscale > F::zero()) {
            return Err(GpError::InvalidValueError(format!(
                "Outputscale should be positive, got {outputscale}"
            )));
        }
        self.raw_outputscale = inv_softplus(outputscale);
        Ok(self)
    }

    /// Build grids from given per-dimension (lower, upper) bounds
    pub fn with_grid_bounds(mut self, bounds: &[(F, F)]) -> Result<Self> {
        self.grids = bounds
            .iter()
            .map(|&b| Grid::new(b, self.grid_size))
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    /// Build grids from the bounds of the given data points
    pub fn fit_grids(self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Self> {
        let bounds = column_bounds(x).to_vec();
        self.with_grid_bounds(&bounds)
    }

    /// Same kernel with grids extended to also cover `x`, `None` when grids already cover it
    pub fn extended_grids(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Option<Self>> {
        self.check_dim(x.ncols())?;
        if self
            .grids
            .iter()
            .zip(x.columns())
            .all(|(grid, col)| grid.covers(&col))
        {
            return Ok(None);
        }
        let bounds: Vec<(F, F)> = self
            .grids
            .iter()
            .zip(column_bounds(x).iter())
            .map(|(grid, &(lo, hi))| {
                let (glo, ghi) = grid.bounds();
                (glo.min(lo), ghi.max(hi))
            })
            .collect();
        Ok(Some(self.clone().with_grid_bounds(&bounds)?))
    }

    /// 1D base kernel
    pub fn base(&self) -> &K {
        &self.base
    }

    /// Mutable 1D base kernel
    pub fn base_mut(&mut self) -> &mut K {
        &mut self.base
    }

    /// Outputscale value
    pub fn outputscale(&self) -> F {
        softplus(self.raw_outputscale)
    }

    /// Derivative of the outputscale wrt its raw value
    pub fn outputscale_gradient(&self) -> F {
        sigmoid(self.raw_outputscale)
    }

    /// Grid size
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Dimension grids
    pub fn grids(&self) -> &[Grid<F>] {
        &self.grids
    }

    fn toeplitz(&self, d: usize) -> ToeplitzOperator<F> {
        let grid = &self.grids[d];
        ToeplitzOperator::new(self.base.grid_column(grid.spacing(), grid.size()))
    }

    /// Interpolated covariance operator `W_d T_d W_d^T` of dimension `d`
    pub fn dimension_operator(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        d: usize,
    ) -> InterpolatedOperator<F> {
        let interp = self.grids[d].interpolate(&x.column(d));
        InterpolatedOperator::new(interp.clone(), self.toeplitz(d), interp)
    }

    /// Low rank root `R` (n, k <= rank) such that `K(x, x) ≈ s R R^T`.
    ///
    /// Lanczos probe vectors are drawn from `seed` so that successive calls with the same
    /// arguments return the same root.
    pub fn root_decomposition(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        rank: usize,
        seed: u64,
    ) -> Result<Array2<F>> {
        self.check_dim(x.ncols())?;
        let x = x.view();
        let n = x.nrows();
        let now = Instant::now();
        let mut roots = (0..x.ncols())
            .into_par_iter()
            .map(|d| {
                let op = self.dimension_operator(&x, d);
                let init = probe_vector(n, seed.wrapping_add(d as u64));
                root_decomposition(&op, rank, &init.view())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut level = 0u64;
        while roots.len() > 1 {
            level += 1;
            roots = roots
                .par_chunks(2)
                .enumerate()
                .map(|(i, pair)| match pair {
                    [left, right] => {
                        let merge_seed = seed.wrapping_add(1000 * level + i as u64);
                        merge_roots(left, right, rank, merge_seed)
                    }
                    _ => Ok(pair[0].to_owned()),
                })
                .collect::<Result<Vec<_>>>()?;
        }
        debug!(
            "SKIP root decomposition ({n} points, {} dims) in {} ms",
            x.ncols(),
            now.elapsed().as_millis()
        );
        roots
            .pop()
            .ok_or_else(|| GpError::InvalidValueError("No input dimension".to_string()))
    }

    /// Product over dimensions of interpolated cross covariances `prod_d W1_d T_d W2_d^T`
    /// without the outputscale
    pub fn product_cross_covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let mut res = Array2::ones((x1.nrows(), x2.nrows()));
        for d in 0..x1.ncols() {
            res *= &self.dimension_cross_covariance(x1, x2, d);
        }
        res
    }

    fn dimension_cross_covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        d: usize,
    ) -> Array2<F> {
        let w1 = self.grids[d].interpolate(&x1.column(d));
        let w2 = self.grids[d].interpolate(&x2.column(d));
        interpolated_dense(&w1, &self.toeplitz(d).to_dense(), &w2)
    }

    /// Product over dimensions of interpolated variances without the outputscale
    pub fn product_diag(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        let mut res = Array1::ones(x.nrows());
        for d in 0..x.ncols() {
            res *= &self.dimension_operator(x, d).diag();
        }
        res
    }
}

fn interpolated_dense<F: Float>(w1: &Interpolation<F>, t: &Array2<F>, w2: &Interpolation<F>) -> Array2<F> {
    let tw = w2.right_apply_transpose(&t.view());
    w1.left_apply(&tw.view())
}

/// Standard normal probe vector drawn from a seeded generator
fn probe_vector<F: Float>(n: usize, seed: u64) -> Array1<F> {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    Array1::<f64>::random_using(n, StandardNormal, &mut rng).mapv(|v| F::cast(v))
}

/// Root of `(L L^T) ∘ (R R^T)` with at most `rank` columns
fn merge_roots<F: Float>(left: &Array2<F>, right: &Array2<F>, rank: usize, seed: u64) -> Result<Array2<F>> {
    let op = HadamardRootOperator::new(left.to_owned(), right.to_owned());
    if left.ncols() * right.ncols() <= rank {
        Ok(op.exact_root())
    } else {
        let init = probe_vector(op.nrows(), seed);
        root_decomposition(&op, rank, &init.view())
    }
}

impl<F: Float, K: GridKernel<F>> fmt::Display for SkipKernel<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Skip(outputscale={}, grid_size={}, {})",
            self.outputscale(),
            self.grid_size,
            self.base
        )
    }
}

impl<F: Float, K: GridKernel<F>> Kernel<F> for SkipKernel<F, K> {
    fn hyperparameters(&self) -> Array1<F> {
        let base = self.base.hyperparameters();
        std::iter::once(self.raw_outputscale)
            .chain(base.iter().cloned())
            .collect()
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(self.n_hyperparameters(), raw.len(), "skip kernel")?;
        self.raw_outputscale = raw[0];
        self.base.set_hyperparameters(&raw.slice(s![1..]))
    }

    fn n_hyperparameters(&self) -> usize {
        1 + self.base.n_hyperparameters()
    }

    fn check_dim(&self, nx: usize) -> Result<()> {
        if self.grids.len() != nx {
            return Err(GpError::InvalidValueError(format!(
                "SKIP kernel has {} grids, expected {nx}: grids have to be fitted first",
                self.grids.len()
            )));
        }
        self.base.check_dim(1)
    }

    fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        self.product_cross_covariance(x1, x2) * self.outputscale()
    }

    fn diag(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        self.product_diag(x) * self.outputscale()
    }

    fn covariance_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>> {
        let n = x.nrows();
        let nx = x.ncols();
        let s = self.outputscale();
        let covs: Vec<Array2<F>> = (0..nx)
            .map(|d| self.dimension_cross_covariance(x, x, d))
            .collect();
        let product = covs
            .iter()
            .fold(Array2::ones((n, n)), |acc, c| acc * c);
        let mut grads = vec![&product * self.outputscale_gradient()];
        let mut base_grads = vec![Array2::<F>::zeros((n, n)); self.base.n_hyperparameters()];
        for d in 0..nx {
            let others = covs
                .iter()
                .enumerate()
                .filter(|(e, _)| *e != d)
                .fold(Array2::ones((n, n)), |acc, (_, c)| acc * c);
            let grid = &self.grids[d];
            let w = grid.interpolate(&x.column(d));
            let columns = self.base.grid_column_gradients(grid.spacing(), grid.size());
            for (g, col) in base_grads.iter_mut().zip(columns) {
                let dt = ToeplitzOperator::new(col).to_dense();
                *g += &(&others * &interpolated_dense(&w, &dt, &w));
            }
        }
        grads.extend(base_grads.into_iter().map(|g| g * s));
        grads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{Matern52Kernel, RbfKernel};
    use crate::lazy::RootOperator;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand_distr::Uniform;

    fn random_x(n: usize, nx: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array2::random_using((n, nx), Uniform::new(-1., 1.), &mut rng)
    }

    #[test]
    fn test_skip_covariance_approaches_exact_kernel() {
        let x = random_x(30, 3, 0);
        let base = RbfKernel::<f64>::new(array![0.6]).unwrap();
        let skip = SkipKernel::new(base.clone())
            .with_grid_size(100)
            .fit_grids(&x)
            .unwrap();
        let exact = base.covariance(&x, &x) * skip.outputscale();
        assert_abs_diff_eq!(skip.covariance(&x, &x), exact, epsilon = 1e-3);
        assert_abs_diff_eq!(skip.diag(&x), exact.diag(), epsilon = 1e-3);
    }

    #[test]
    fn test_skip_root_decomposition() {
        let x = random_x(40, 4, 1);
        let skip = SkipKernel::new(RbfKernel::<f64>::new(array![1.5]).unwrap())
            .with_grid_size(30)
            .fit_grids(&x)
            .unwrap();
        let root = skip.root_decomposition(&x, 40, 7).unwrap();
        assert_eq!(root.nrows(), 40);
        assert!(root.ncols() <= 40);
        let k = skip.product_cross_covariance(&x, &x);
        assert_abs_diff_eq!(root.dot(&root.t()), k, epsilon = 1e-6);

        let again = skip.root_decomposition(&x, 40, 7).unwrap();
        assert_abs_diff_eq!(root, again);
    }

    #[test]
    fn test_skip_low_rank_root_is_close() {
        let x = random_x(60, 2, 2);
        let skip = SkipKernel::new(RbfKernel::<f64>::new(array![1.]).unwrap())
            .with_grid_size(50)
            .fit_grids(&x)
            .unwrap();
        let root = skip.root_decomposition(&x, 20, 0).unwrap();
        assert!(root.ncols() <= 20);
        let k = skip.product_cross_covariance(&x, &x);
        let err = (&root.dot(&root.t()) - &k).mapv(f64::abs).sum() / k.len() as f64;
        assert!(err < 1e-3, "mean abs error {err}");
    }

    #[test]
    fn test_merge_roots_exact_for_small_ranks() {
        let l = random_x(10, 2, 3);
        let r = random_x(10, 3, 4);
        let merged = merge_roots(&l, &r, 6, 0).unwrap();
        let expected = l.dot(&l.t()) * r.dot(&r.t());
        assert_eq!(merged.ncols(), 6);
        assert_abs_diff_eq!(merged.dot(&merged.t()), expected, epsilon = 1e-10);
        let op = RootOperator::new(merged);
        assert_abs_diff_eq!(op.diag(), expected.diag(), epsilon = 1e-10);
    }

    #[test]
    fn test_skip_gradients() {
        let x = random_x(8, 2, 5);
        let mut skip = SkipKernel::new(Matern52Kernel::<f64>::new(array![0.7]).unwrap())
            .with_grid_size(20)
            .with_outputscale(1.3)
            .unwrap()
            .fit_grids(&x)
            .unwrap();
        let grads = skip.covariance_gradients(&x);
        assert_eq!(grads.len(), 2);
        let raw = skip.hyperparameters();
        let e = 1e-6;
        for (i, g) in grads.iter().enumerate() {
            let mut rp = raw.clone();
            rp[i] += e;
            skip.set_hyperparameters(&rp.view()).unwrap();
            let kp = skip.covariance(&x, &x);
            rp[i] -= 2. * e;
            skip.set_hyperparameters(&rp.view()).unwrap();
            let km = skip.covariance(&x, &x);
            skip.set_hyperparameters(&raw.view()).unwrap();
            assert_abs_diff_eq!(*g, (kp - km) / (2. * e), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_skip_requires_grids() {
        let x = random_x(5, 2, 6);
        let skip = SkipKernel::new(RbfKernel::<f64>::default());
        assert!(skip.check_dim(2).is_err());
        assert!(skip.root_decomposition(&x, 5, 0).is_err());
        let skip = skip.with_grid_bounds(&[(-1., 1.), (-1., 1.)]).unwrap();
        assert!(skip.check_dim(2).is_ok());
        assert!(skip.clone().with_grid_size(2).with_grid_bounds(&[(0., 1.)]).is_err());
    }
}
