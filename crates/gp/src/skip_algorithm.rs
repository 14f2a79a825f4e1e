use crate::algorithm::check_training_data;
use crate::errors::{GpError, Result};
use crate::kernels::{GridKernel, Kernel};
use crate::likelihood::GaussianLikelihood;
use crate::mean_models::MeanModel;
use crate::optimization::{AdamParams, train};
use crate::parameters::GpComponents;
use crate::skip::SkipKernel;
use crate::skip_parameters::{SkipParams, SkipValidParams};
use crate::utils::{column_bounds, into_f64};

use finitediff::FiniteDiff;
use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa_linalg::{cholesky::*, triangular::*};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2, s};
use rayon::prelude::*;
use std::borrow::Cow;
use std::fmt;
use std::time::Instant;

/// Default number of Adam iterations for SKIP hyperparameters training
pub const SKIP_DEFAULT_N_ITER: usize = 25;
/// Default Adam learning rate for SKIP hyperparameters training
pub const SKIP_DEFAULT_LEARNING_RATE: f64 = 0.01;
/// Default maximal number of columns of the kernel root decomposition
pub const SKIP_DEFAULT_MAX_ROOT_RANK: usize = 30;

/// Number of prediction points handled by one parallel task
const PREDICTION_CHUNK_SIZE: usize = 512;

/// Woodbury algorithm data for the noisy covariance `K = s R R^T + a I`
/// where `a` is the noise variance plus nugget
#[derive(Clone, Debug)]
pub(crate) struct WoodburyData<F: Float> {
    /// Root decomposition R (n, k)
    root: Array2<F>,
    /// Cholesky factor (lower) of `M = (a / s) I + R^T R`
    chol: Array2<F>,
    /// `K^-1 (y - m(x))`
    alpha: Array1<F>,
    /// Diagonal shift `a`
    shift: F,
    /// Marginal log likelihood
    mll: F,
}

/// Solve `L L^T z = b`
fn cho_solve<F: Float>(chol: &Array2<F>, b: &Array2<F>) -> Result<Array2<F>> {
    let z = chol.solve_triangular(b, UPLO::Lower)?;
    Ok(chol.t().solve_triangular_into(z, UPLO::Upper)?)
}

/// Marginal log likelihood of `N(0, s R R^T + a I)` at `residuals` in O(n k^2) using
/// `K^-1 v = (v - R M^-1 R^T v) / a` and
/// `logdet(K) = n log(a) + k log(s / a) + logdet(M)`
pub(crate) fn woodbury_mll<F: Float>(
    root: Array2<F>,
    residuals: &Array1<F>,
    outputscale: F,
    shift: F,
) -> Result<WoodburyData<F>> {
    let (n, k) = root.dim();
    let mut m = root.t().dot(&root);
    let ratio = shift / outputscale;
    m.diag_mut().mapv_inplace(|v| v + ratio);
    let chol = m.cholesky()?;

    let rtr = root.t().dot(residuals).insert_axis(Axis(1));
    let u = cho_solve(&chol, &rtr)?.remove_axis(Axis(1));
    let alpha = (residuals - &root.dot(&u)) / shift;

    let logdet = F::cast(n) * shift.ln()
        + F::cast(k) * (outputscale / shift).ln()
        + F::cast(2.) * chol.diag().mapv(|v| v.ln()).sum();
    let mll = -F::cast(0.5)
        * (residuals.dot(&alpha)
            + logdet
            + F::cast(n) * F::cast(2. * std::f64::consts::PI).ln());
    if !mll.is_finite() {
        return Err(GpError::LikelihoodComputationError(format!(
            "Non finite marginal log likelihood (outputscale={outputscale}, shift={shift})"
        )));
    }
    Ok(WoodburyData {
        root,
        chol,
        alpha,
        shift,
        mll,
    })
}

/// Settings shared by likelihood evaluations during one fit
struct SkipProblem<'a, F: Float> {
    x: &'a Array2<F>,
    y: &'a Array1<F>,
    rank: usize,
    seed: u64,
    nugget: F,
}

impl<F: Float> SkipProblem<'_, F> {
    fn mll<Mean: MeanModel<F>, K: GridKernel<F>>(
        &self,
        components: &GpComponents<F, Mean, SkipKernel<F, K>>,
    ) -> Result<WoodburyData<F>> {
        let residuals = self.y - &components.mean.value(self.x);
        self.mll_with_residuals(&components.kernel, components.likelihood.noise(), &residuals)
    }

    fn mll_with_residuals<K: GridKernel<F>>(
        &self,
        kernel: &SkipKernel<F, K>,
        noise: F,
        residuals: &Array1<F>,
    ) -> Result<WoodburyData<F>> {
        let root = kernel.root_decomposition(self.x, self.rank, self.seed)?;
        woodbury_mll(root, residuals, kernel.outputscale(), noise + self.nugget)
    }

    /// Gradient wrt packed raw hyperparameters: analytic for mean, noise and outputscale,
    /// central finite differences for the base kernel (root recomputed with the same seed)
    fn mll_gradient<Mean: MeanModel<F>, K: GridKernel<F>>(
        &self,
        components: &GpComponents<F, Mean, SkipKernel<F, K>>,
        wb: &WoodburyData<F>,
    ) -> Result<Array1<F>> {
        let n = self.x.nrows();
        let half = F::cast(0.5);
        let alpha = &wb.alpha;
        let g = wb.root.t().dot(&wb.root);
        let linv_g = wb.chol.solve_triangular(&g, UPLO::Lower)?;
        let minv_g = wb.chol.t().solve_triangular(&linv_g, UPLO::Upper)?;
        let tr_minv_g = minv_g.diag().sum();
        let tr_g_minv_g = linv_g.mapv(|v| v * v).sum();
        let tr_kinv = (F::cast(n) - tr_minv_g) / wb.shift;
        let tr_kinv_rrt = (g.diag().sum() - tr_g_minv_g) / wb.shift;
        let rt_alpha = wb.root.t().dot(alpha);

        let mut grad = Array1::zeros(components.n_hyperparameters());
        for (i, dm) in components.mean.gradients(self.x).iter().enumerate() {
            grad[i] = dm.dot(alpha);
        }
        grad[components.noise_index()] =
            half * (alpha.dot(alpha) - tr_kinv) * components.likelihood.noise_gradient();
        let offset = components.kernel_offset();
        grad[offset] = half
            * (rt_alpha.dot(&rt_alpha) - tr_kinv_rrt)
            * components.kernel.outputscale_gradient();

        let residuals = self.y - &components.mean.value(self.x);
        let noise = components.likelihood.noise();
        // non finite value flags a failed likelihood evaluation
        let f = |p: &Array1<f64>| -> f64 {
            let mut kernel = components.kernel.clone();
            if kernel
                .base_mut()
                .set_hyperparameters(&p.mapv(|v| F::cast(v)).view())
                .is_err()
            {
                return f64::NAN;
            }
            match self.mll_with_residuals(&kernel, noise, &residuals) {
                Ok(wb) => into_f64(wb.mll),
                Err(_) => f64::NAN,
            }
        };
        let base = components.kernel.base().hyperparameters().mapv(into_f64);
        let base_grad = base.central_diff(&f);
        if base_grad.iter().any(|v| !v.is_finite()) {
            return Err(GpError::LikelihoodComputationError(format!(
                "Non finite base kernel gradient {base_grad} with {}",
                components.kernel
            )));
        }
        grad.slice_mut(s![offset + 1..])
            .assign(&base_grad.mapv(|v| F::cast(v)));
        Ok(grad)
    }
}

/// A GP regression model using Structured Kernel Interpolation for Products (SKIP).
///
/// The covariance is a product kernel over input dimensions where each 1D factor is
/// interpolated from a regular grid (see [SkipKernel]). Training uses a low rank root
/// decomposition `K ≈ s R R^T` with at most `max_root_rank` columns, so that marginal
/// likelihood and predictions scale linearly with the number of training points.
///
/// # Example
///
/// ```no_run
/// use skipgp_gp::SkipKriging;
/// use linfa::prelude::*;
/// use ndarray::{Array1, Array2, Axis};
/// use ndarray_rand::RandomExt;
/// use ndarray_rand::rand::SeedableRng;
/// use ndarray_rand::rand_distr::Uniform;
/// use rand_xoshiro::Xoshiro256Plus;
///
/// let mut rng = Xoshiro256Plus::seed_from_u64(42);
/// let xt = Array2::random_using((1000, 4), Uniform::new(-1., 1.), &mut rng);
/// let yt = xt.map_axis(Axis(1), |r| r.mapv(|v: f64| (3. * v).sin()).sum());
///
/// let gp = SkipKriging::params()
///     .n_iter(25)
///     .fit(&Dataset::new(xt.clone(), yt))
///     .expect("SKIP GP trained");
/// let ypred = gp.predict(&xt).expect("SKIP GP prediction");
/// ```
#[derive(Clone, Debug)]
pub struct SkipGaussianProcess<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> {
    /// Trained model components, kernel grids fitted
    components: GpComponents<F, Mean, SkipKernel<F, K>>,
    /// Training loss (-mll / n) before each Adam step
    loss_history: Vec<F>,
    /// Woodbury data with trained hyperparameters
    w_data: WoodburyData<F>,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: SkipValidParams<F, Mean, K>,
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> fmt::Display
    for SkipGaussianProcess<F, Mean, K>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SkipGP({}, root_rank={}, mll={})",
            self.components,
            self.root_rank(),
            self.w_data.mll
        )
    }
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> SkipGaussianProcess<F, Mean, K> {
    /// SKIP GP parameters contructor
    pub fn params<NewMean: MeanModel<F>, NewK: GridKernel<F>>(
        mean: NewMean,
        base: NewK,
    ) -> SkipParams<F, NewMean, NewK> {
        SkipParams::new(mean, base)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_input(x)?;
        let kernel = self.prediction_kernel(x)?;
        let s = kernel.outputscale();
        let mean = self.components.mean.value(x);
        let kalpha = self.by_chunks(x, |chunk| {
            let c = self.cross_covariance(&kernel, &chunk);
            Ok(c.dot(&self.w_data.alpha) * s)
        })?;
        Ok(mean + kalpha)
    }

    /// Predict variance values of the latent function at n given `x` points of nx components
    /// specified as a (n, nx) matrix. Returns n variance values as (n,) column vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_input(x)?;
        let kernel = self.prediction_kernel(x)?;
        self.by_chunks(x, |chunk| {
            let c = self.cross_covariance(&kernel, &chunk);
            self.chunk_variances(&kernel, &chunk, &c)
        })
    }

    /// Predict both output values and variance at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        self.check_input(x)?;
        let kernel = self.prediction_kernel(x)?;
        let s = kernel.outputscale();
        let x = x.view();
        let parts = x
            .axis_chunks_iter(Axis(0), PREDICTION_CHUNK_SIZE)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|chunk| -> Result<(Array1<F>, Array1<F>)> {
                let c = self.cross_covariance(&kernel, &chunk);
                let values = self.components.mean.value(&chunk) + c.dot(&self.w_data.alpha) * s;
                Ok((values, self.chunk_variances(&kernel, &chunk, &c)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let (values, variances): (Vec<_>, Vec<_>) = parts.into_iter().unzip();
        Ok((concat(values), concat(variances)))
    }

    /// Kernel used for predictions at `x`: training grids, extended when some inputs
    /// fall outside of them
    fn prediction_kernel(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Cow<'_, SkipKernel<F, K>>> {
        match self.components.kernel.extended_grids(x)? {
            Some(kernel) => {
                warn!("Prediction inputs outside of training grids: grids are extended");
                Ok(Cow::Owned(kernel))
            }
            None => Ok(Cow::Borrowed(&self.components.kernel)),
        }
    }

    /// Interpolated cross covariances (without outputscale) between `x` and training inputs
    fn cross_covariance(&self, kernel: &SkipKernel<F, K>, x: &ArrayView2<F>) -> Array2<F> {
        kernel.product_cross_covariance(x, &self.training_data.0)
    }

    /// `s k(x) - s^2 c^T K^-1 c` with `K^-1 = (I - R M^-1 R^T) / a`
    fn chunk_variances(
        &self,
        kernel: &SkipKernel<F, K>,
        x: &ArrayView2<F>,
        c: &Array2<F>,
    ) -> Result<Array1<F>> {
        let s = kernel.outputscale();
        let cr = c.dot(&self.w_data.root);
        let v = self.w_data.chol.solve_triangular(&cr.t(), UPLO::Lower)?;
        let quad = c.mapv(|w| w * w).sum_axis(Axis(1)) - v.mapv(|w| w * w).sum_axis(Axis(0));
        let var = kernel.product_diag(x) * s - quad * (s * s / self.w_data.shift);
        // Variance might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(var.mapv(|v| if v < F::zero() { F::zero() } else { v }))
    }

    fn by_chunks<G>(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>, compute: G) -> Result<Array1<F>>
    where
        G: Fn(ArrayView2<F>) -> Result<Array1<F>> + Send + Sync,
    {
        let x = x.view();
        let parts = x
            .axis_chunks_iter(Axis(0), PREDICTION_CHUNK_SIZE)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(compute)
            .collect::<Result<Vec<_>>>()?;
        Ok(concat(parts))
    }

    fn check_input(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        let nx = self.training_data.0.ncols();
        if x.ncols() != nx {
            return Err(GpError::InvalidValueError(format!(
                "Input dimension {} does not match training dimension {nx}",
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Trained mean model
    pub fn mean(&self) -> &Mean {
        &self.components.mean
    }

    /// Trained SKIP kernel
    pub fn kernel(&self) -> &SkipKernel<F, K> {
        &self.components.kernel
    }

    /// Trained likelihood
    pub fn likelihood(&self) -> &GaussianLikelihood<F> {
        &self.components.likelihood
    }

    /// Marginal log likelihood value with trained hyperparameters
    pub fn mll(&self) -> F {
        self.w_data.mll
    }

    /// Training loss history
    pub fn loss_history(&self) -> &[F] {
        &self.loss_history
    }

    /// Number of columns of the training covariance root decomposition
    pub fn root_rank(&self) -> usize {
        self.w_data.root.ncols()
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.ncols(), 1)
    }

    /// Parameters used to fit this model
    pub fn params_used(&self) -> &SkipValidParams<F, Mean, K> {
        &self.params
    }
}

fn concat<F: Float>(parts: Vec<Array1<F>>) -> Array1<F> {
    parts.into_iter().flat_map(|p| p.into_iter()).collect()
}

impl<F, D, Mean, K> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for SkipGaussianProcess<F, Mean, K>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    K: GridKernel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("SKIP GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

/// SKIP Gausssian Process adaptator to implement `linfa::Predict` trait for variance prediction.
pub struct SkipGpVariancePredictor<'a, F, Mean, K>(pub &'a SkipGaussianProcess<F, Mean, K>)
where
    F: Float,
    Mean: MeanModel<F>,
    K: GridKernel<F>;

impl<F, D, Mean, K> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for SkipGpVariancePredictor<'_, F, Mean, K>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    K: GridKernel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.0.predict_var(x).expect("SKIP GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for SkipValidParams<F, Mean, K>
{
    type Object = SkipGaussianProcess<F, Mean, K>;

    /// Fit SKIP GP hyperparameters by maximizing the approximated marginal likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records().to_owned();
        let y = dataset.targets().to_owned();
        check_training_data(&x, &y)?;
        let nx = x.ncols();

        let bounds = match &self.grid_bounds {
            Some(bounds) if bounds.len() != nx => {
                return Err(GpError::InvalidValueError(format!(
                    "Grid bounds given for {} dimensions, expected {nx}",
                    bounds.len()
                )));
            }
            Some(bounds) => bounds.clone(),
            None => column_bounds(&x).to_vec(),
        };
        let mut components = self.gp_params.components.clone();
        components.kernel = components.kernel.clone().with_grid_bounds(&bounds)?;
        components.check_dim(nx)?;

        let problem = SkipProblem {
            x: &x,
            y: &y,
            rank: self.max_root_rank,
            seed: self.seed,
            nugget: self.nugget(),
        };
        let n = F::cast(x.nrows());
        info!(
            "Training SKIP GP on {} points ({nx} dims, grid size {}, root rank {})",
            x.nrows(),
            self.grid_size(),
            self.max_root_rank
        );
        let now = Instant::now();
        let (raw, loss_history) = train(
            components.hyperparameters(),
            self.n_iter(),
            AdamParams::new(self.learning_rate()),
            |raw| {
                let mut trial = components.clone();
                trial.set_hyperparameters(&raw.view())?;
                let wb = problem.mll(&trial)?;
                let grad = problem.mll_gradient(&trial, &wb)?;
                Ok((-wb.mll / n, grad.mapv(|g| -g / n)))
            },
        )?;
        debug!("elapsed training = {:?} ms", now.elapsed().as_millis());

        components.set_hyperparameters(&raw.view())?;
        let w_data = problem.mll(&components)?;
        info!("Trained SKIP GP: {components}");
        Ok(SkipGaussianProcess {
            components,
            loss_history,
            w_data,
            training_data: (x, y),
            params: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::exact_mll;
    use crate::kernels::{Matern52Kernel, RbfKernel};
    use crate::mean_models::ConstantMean;
    use crate::skip_parameters::SkipKriging;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::{Dataset, Predict};
    use ndarray::{Array, array};
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use rand_xoshiro::Xoshiro256Plus;

    fn make_test_data(n: usize, nx: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let x = Array2::random_using((n, nx), Uniform::new(-1., 1.), &mut rng);
        let noise = Array1::random_using(n, Normal::new(0., 0.05).unwrap(), &mut rng);
        let y = x.map_axis(Axis(1), |r| {
            r.iter()
                .enumerate()
                .map(|(j, v)| (2f64 * v).sin() / (j + 1) as f64)
                .sum::<f64>()
        }) + noise;
        (x, y)
    }

    fn skip_components(
        x: &Array2<f64>,
        grid_size: usize,
    ) -> GpComponents<f64, ConstantMean<f64>, SkipKernel<f64, RbfKernel<f64>>> {
        let kernel = SkipKernel::new(RbfKernel::new(array![0.8]).unwrap())
            .with_grid_size(grid_size)
            .with_outputscale(1.2)
            .unwrap()
            .fit_grids(x)
            .unwrap();
        GpComponents::new(
            ConstantMean::new(0.1),
            kernel,
            GaussianLikelihood::new(0.05).unwrap(),
        )
    }

    #[test]
    fn test_woodbury_matches_dense() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let root = Array2::random_using((20, 5), Uniform::new(-1., 1.), &mut rng);
        let r = Array1::random_using(20, Uniform::new(-1., 1.), &mut rng);
        let (s, a) = (1.7, 0.3);
        let wb = woodbury_mll(root.clone(), &r, s, a).unwrap();

        let mut k = root.dot(&root.t()) * s;
        k.diag_mut().mapv_inplace(|v| v + a);
        let chol = k.cholesky().unwrap();
        let alpha = cho_solve(&chol, &r.clone().insert_axis(Axis(1)))
            .unwrap()
            .remove_axis(Axis(1));
        let logdet = 2. * chol.diag().mapv(f64::ln).sum();
        let mll = -0.5 * (r.dot(&alpha) + logdet + 20. * (2. * std::f64::consts::PI).ln());
        assert_abs_diff_eq!(wb.alpha, alpha, epsilon = 1e-10);
        assert_abs_diff_eq!(wb.mll, mll, epsilon = 1e-10);
    }

    #[test]
    fn test_skip_mll_approaches_dense_ski_mll() {
        let (x, y) = make_test_data(40, 2, 1);
        let components = skip_components(&x, 20);
        let (dense_mll, _) = exact_mll(&components, &x, &y, 0.).unwrap();
        let errors: Vec<f64> = [4, 40]
            .iter()
            .map(|&rank| {
                let problem = SkipProblem {
                    x: &x,
                    y: &y,
                    rank,
                    seed: 0,
                    nugget: 0.,
                };
                (problem.mll(&components).unwrap().mll - dense_mll).abs()
            })
            .collect();
        assert!(errors[1] < 1e-4 * dense_mll.abs().max(1.), "errors {errors:?}");
        assert!(errors[1] < errors[0], "errors {errors:?}");
    }

    #[test]
    fn test_skip_mll_gradient() {
        let (x, y) = make_test_data(15, 2, 2);
        let mut components = skip_components(&x, 12);
        let problem = SkipProblem {
            x: &x,
            y: &y,
            rank: 15,
            seed: 3,
            nugget: 0.,
        };
        let wb = problem.mll(&components).unwrap();
        let grad = problem.mll_gradient(&components, &wb).unwrap();
        assert_eq!(grad.len(), 4);

        let raw = components.hyperparameters();
        let e = 1e-5;
        for i in 0..raw.len() {
            let mut rp = raw.clone();
            rp[i] += e;
            components.set_hyperparameters(&rp.view()).unwrap();
            let plus = problem.mll(&components).unwrap().mll;
            rp[i] -= 2. * e;
            components.set_hyperparameters(&rp.view()).unwrap();
            let minus = problem.mll(&components).unwrap().mll;
            components.set_hyperparameters(&raw.view()).unwrap();
            assert_abs_diff_eq!(grad[i], (plus - minus) / (2. * e), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_skip_gp_fit_and_predict() {
        let (xt, yt) = make_test_data(300, 3, 4);
        let gp = SkipKriging::params()
            .grid_size(30)
            .max_root_rank(20)
            .n_iter(30)
            .learning_rate(0.05)
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("SKIP GP fit error");
        let history = gp.loss_history();
        assert_eq!(history.len(), 30);
        assert!(history[29] < history[0], "loss history {history:?}");
        assert!(gp.root_rank() <= 20);

        let (xv, yv) = make_test_data(100, 3, 5);
        let ypred = gp.predict(&xv).unwrap();
        let mae = (&ypred - &yv).mapv(f64::abs).mean().unwrap();
        let yv_mean = yv.mean().unwrap();
        let baseline = yv.mapv(|v| (v - yv_mean).abs()).mean().unwrap();
        assert!(mae < 0.5 * baseline, "mae {mae} vs baseline {baseline}");

        let (values, variances) = gp.predict_valvar(&xv).unwrap();
        assert_abs_diff_eq!(values, ypred, epsilon = 1e-12);
        assert_abs_diff_eq!(variances, gp.predict_var(&xv).unwrap(), epsilon = 1e-12);
        assert!(variances.iter().all(|&v| v >= 0.));

        let linfa_pred = Predict::<&Array2<f64>, Array1<f64>>::predict(&gp, &xv);
        assert_abs_diff_eq!(linfa_pred, ypred);
        let var = SkipGpVariancePredictor(&gp).predict(&xv);
        assert_abs_diff_eq!(var, variances);
    }

    #[test]
    fn test_chunked_prediction() {
        let (xt, yt) = make_test_data(50, 2, 6);
        let gp = SkipParams::new(ConstantMean::<f64>::default(), Matern52Kernel::default())
            .grid_size(16)
            .grid_bounds(Some(vec![(-1., 1.), (-1., 1.)]))
            .n_iter(0)
            .fit(&Dataset::new(xt.clone(), yt))
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let x = Array2::random_using((PREDICTION_CHUNK_SIZE + 100, 2), Uniform::new(-1., 1.), &mut rng);
        let c = gp.kernel().product_cross_covariance(&x, &xt);
        let expected = c.dot(&gp.w_data.alpha) * gp.kernel().outputscale() + gp.mean().constant();
        assert_abs_diff_eq!(gp.predict(&x).unwrap(), expected, epsilon = 1e-10);
        assert_eq!(gp.predict_var(&x).unwrap().len(), PREDICTION_CHUNK_SIZE + 100);
    }

    #[test]
    fn test_prediction_beyond_training_bounds() {
        let xt = Array::linspace(-0.9, 0.8, 30).insert_axis(Axis(1));
        let yt = xt.column(0).mapv(|v| 2. * v);
        let gp = SkipKriging::params()
            .grid_size(20)
            .n_iter(0)
            .fit(&Dataset::new(xt, yt))
            .unwrap();
        assert_abs_diff_eq!(gp.kernel().grids()[0].bounds().1, 0.8, epsilon = 1e-12);

        let at_max = gp.predict(&array![[0.8]]).unwrap();
        let beyond = gp.predict(&array![[1.0]]).unwrap();
        assert!(
            f64::abs(beyond[0] - at_max[0]) > 1e-3,
            "{} vs {}",
            beyond[0],
            at_max[0]
        );
        // trained grids are left untouched
        assert_abs_diff_eq!(gp.kernel().grids()[0].bounds().1, 0.8, epsilon = 1e-12);

        let extended = gp
            .kernel()
            .extended_grids(&array![[1.0]])
            .unwrap()
            .expect("grid extension");
        assert_abs_diff_eq!(extended.grids()[0].bounds().1, 1.0, epsilon = 1e-12);
        assert!(gp.kernel().extended_grids(&array![[0.5]]).unwrap().is_none());
    }

    #[test]
    fn test_skip_fit_errors() {
        let (xt, yt) = make_test_data(20, 2, 8);
        let dataset = Dataset::new(xt.clone(), yt);
        let bad_bounds = SkipKriging::params()
            .grid_size(10)
            .grid_bounds(Some(vec![(-1., 1.)]))
            .fit(&dataset);
        assert!(bad_bounds.is_err());
        let gp = SkipKriging::params()
            .grid_size(10)
            .grid_bounds(Some(vec![(-1., 1.), (-1., 1.)]))
            .n_iter(0)
            .fit(&dataset)
            .unwrap();
        assert_abs_diff_eq!(gp.kernel().grids()[0].bounds().0, -1.);
        assert!(gp.predict(&array![[0.]]).is_err());
    }
}
