use crate::errors::{GpError, Result};
use crate::kernels::{Kernel, RbfKernel, ScaleKernel};
use crate::likelihood::GaussianLikelihood;
use crate::mean_models::*;
use crate::optimization::{AdamParams, train};
use crate::parameters::{GpComponents, GpParams, GpValidParams};

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use linfa_linalg::{cholesky::*, triangular::*};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use std::fmt;
use std::time::Instant;

/// Default number of Adam iterations for hyperparameters training
pub const GP_DEFAULT_N_ITER: usize = 50;
/// Default Adam learning rate for hyperparameters training
pub const GP_DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Internal parameters computed Gp during training
/// used later on in prediction computations
#[derive(Clone, Debug)]
pub(crate) struct GpInnerParams<F: Float> {
    /// Cholesky decomposition (lower) of the noisy covariance matrix
    chol: Array2<F>,
    /// Solution of the linear equation system : \[K + sigma2 I\] alpha = y - m(x)
    alpha: Array1<F>,
}

/// A GP regression with exact inference.
///
/// The output is modeled as a latent gaussian process observed through gaussian noise:
///
/// `y(x) = m(x) + f(x) + e`
///
/// where:
/// * `m(x)` is the mean model,
/// * `f(x) ~ GP(0, k(x, x'))` with `k` the covariance kernel,
/// * `e ~ N(0, sigma2)` the observation noise of the [GaussianLikelihood].
///
/// Mean, kernel and noise hyperparameters are trained by maximizing the exact marginal
/// log likelihood with a fixed number of Adam iterations. The covariance matrix is factorized
/// with a Cholesky decomposition which is an O(n^3) operation: for large training sets,
/// see [crate::SkipGaussianProcess].
///
/// # Example
///
/// ```no_run
/// use skipgp_gp::{kernels::*, mean_models::*, GaussianProcess};
/// use linfa::prelude::*;
/// use ndarray::{arr2, Array, Array1, Array2, Axis};
///
/// // one-dimensional test function to approximate
/// fn xsinx(x: &Array2<f64>) -> Array1<f64> {
///     ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).remove_axis(Axis(1))
/// }
///
/// // training data
/// let xt = arr2(&[[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]]);
/// let yt = xsinx(&xt);
///
/// // GP with constant mean and scaled squared exponential kernel
/// let gp = GaussianProcess::<f64, ConstantMean<f64>, ScaleKernel<f64, RbfKernel<f64>>>::params(
///                 ConstantMean::default(),
///                 ScaleKernel::new(RbfKernel::new(Array1::from_elem(1, 5.)).unwrap()))
///                 .n_iter(100)
///                 .fit(&Dataset::new(xt, yt))
///                 .expect("GP trained");
///
/// // Use trained model for making predictions
/// let xtest = Array::linspace(0., 25., 26).insert_axis(Axis(1));
/// let ypred = gp.predict(&xtest).expect("GP prediction");
/// let yvariances = gp.predict_var(&xtest).expect("GP prediction");
///```
#[derive(Clone, Debug)]
pub struct GaussianProcess<F: Float, Mean: MeanModel<F>, K: Kernel<F>> {
    /// Trained model components
    components: GpComponents<F, Mean, K>,
    /// Marginal log likelihood with trained hyperparameters
    mll: F,
    /// Training loss (-mll / n) before each Adam step
    loss_history: Vec<F>,
    /// Gaussian process internal fitted params
    inner_params: GpInnerParams<F>,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: GpValidParams<F, Mean, K>,
}

/// Kriging as GP special case when using constant mean and scaled squared exponential kernel
pub type Kriging<F> = GpParams<F, ConstantMean<F>, ScaleKernel<F, RbfKernel<F>>>;

impl<F: Float> Kriging<F> {
    /// Kriging parameters constructor
    pub fn params() -> GpParams<F, ConstantMean<F>, ScaleKernel<F, RbfKernel<F>>> {
        GpParams::new(ConstantMean::default(), ScaleKernel::new(RbfKernel::default()))
    }
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> fmt::Display for GaussianProcess<F, Mean, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GP({}, mll={})", self.components, self.mll)
    }
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> GaussianProcess<F, Mean, K> {
    /// Gp parameters contructor
    pub fn params<NewMean: MeanModel<F>, NewK: Kernel<F>>(
        mean: NewMean,
        kernel: NewK,
    ) -> GpParams<F, NewMean, NewK> {
        GpParams::new(mean, kernel)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_input(x)?;
        let kx = self.components.kernel.covariance(x, &self.training_data.0);
        Ok(self.components.mean.value(x) + kx.dot(&self.inner_params.alpha))
    }

    /// Predict variance values of the latent function at n given `x` points of nx components
    /// specified as a (n, nx) matrix. Returns n variance values as (n,) column vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_input(x)?;
        let kx = self.components.kernel.covariance(x, &self.training_data.0);
        self.variances(x, &kx)
    }

    /// Predict both output values and variance at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        self.check_input(x)?;
        let kx = self.components.kernel.covariance(x, &self.training_data.0);
        let mean = self.components.mean.value(x) + kx.dot(&self.inner_params.alpha);
        Ok((mean, self.variances(x, &kx)?))
    }

    fn variances(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        kx: &Array2<F>,
    ) -> Result<Array1<F>> {
        let v = self
            .inner_params
            .chol
            .solve_triangular(&kx.t(), UPLO::Lower)?;
        let var = self.components.kernel.diag(x) - v.mapv(|w| w * w).sum_axis(Axis(0));
        // Variance might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(var.mapv(|v| if v < F::zero() { F::zero() } else { v }))
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

    /// Trained kernel
    pub fn kernel(&self) -> &K {
        &self.components.kernel
    }

    /// Trained likelihood
    pub fn likelihood(&self) -> &GaussianLikelihood<F> {
        &self.components.likelihood
    }

    /// Marginal log likelihood value with trained hyperparameters
    pub fn mll(&self) -> F {
        self.mll
    }

    /// Training loss history
    pub fn loss_history(&self) -> &[F] {
        &self.loss_history
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.ncols(), 1)
    }

    /// Parameters used to fit this model
    pub fn params_used(&self) -> &GpValidParams<F, Mean, K> {
        &self.params
    }
}

impl<F, D, Mean, K> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for GaussianProcess<F, Mean, K>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    K: Kernel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

/// Gausssian Process adaptator to implement `linfa::Predict` trait for variance prediction.
pub struct GpVariancePredictor<'a, F, Mean, K>(pub &'a GaussianProcess<F, Mean, K>)
where
    F: Float,
    Mean: MeanModel<F>,
    K: Kernel<F>;

impl<F, D, Mean, K> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for GpVariancePredictor<'_, F, Mean, K>
where
    F: Float,
    D: Data<Elem = F>,
    Mean: MeanModel<F>,
    K: Kernel<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.0.predict_var(x).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, Mean, K>
{
    type Object = GaussianProcess<F, Mean, K>;

    /// Fit GP hyperparameters by maximizing the exact marginal likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records().to_owned();
        let y = dataset.targets().to_owned();
        check_training_data(&x, &y)?;

        let mut components = self.components.clone();
        components.check_dim(x.ncols())?;
        let n = F::cast(x.nrows());

        let now = Instant::now();
        let (raw, loss_history) = train(
            components.hyperparameters(),
            self.n_iter,
            AdamParams::new(self.learning_rate),
            |raw| {
                let mut trial = components.clone();
                trial.set_hyperparameters(&raw.view())?;
                let (mll, inner) = exact_mll(&trial, &x, &y, self.nugget)?;
                let grad = exact_mll_gradient(&trial, &x, &inner)?;
                Ok((-mll / n, grad.mapv(|g| -g / n)))
            },
        )?;
        debug!("elapsed training = {:?} ms", now.elapsed().as_millis());

        components.set_hyperparameters(&raw.view())?;
        let (mll, inner_params) = exact_mll(&components, &x, &y, self.nugget)?;
        info!("Trained GP: {components}");
        Ok(GaussianProcess {
            components,
            mll,
            loss_history,
            inner_params,
            training_data: (x, y),
            params: self.clone(),
        })
    }
}

pub(crate) fn check_training_data<F: Float>(x: &Array2<F>, y: &Array1<F>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(GpError::InvalidValueError(
            "Training data should not be empty".to_string(),
        ));
    }
    if x.nrows() != y.len() {
        return Err(GpError::InvalidValueError(format!(
            "Training inputs ({}) and outputs ({}) sizes differ",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

/// Compute exact marginal log likelihood
/// `-0.5 r^T alpha - sum(log(diag(L))) - n/2 log(2 pi)`
/// where `r = y - m(x)`, `L` the cholesky factor of `K + (sigma2 + nugget) I`
/// and `alpha = (K + (sigma2 + nugget) I)^-1 r`
pub(crate) fn exact_mll<F: Float, Mean: MeanModel<F>, K: Kernel<F>>(
    components: &GpComponents<F, Mean, K>,
    x: &Array2<F>,
    y: &Array1<F>,
    nugget: F,
) -> Result<(F, GpInnerParams<F>)> {
    let n = x.nrows();
    let residuals = y - &components.mean.value(x);
    let mut k = components.kernel.covariance(x, x);
    let jitter = components.likelihood.noise() + nugget;
    k.diag_mut().mapv_inplace(|v| v + jitter);

    let chol = k.cholesky()?;
    let z = chol.solve_triangular(&residuals.view().insert_axis(Axis(1)), UPLO::Lower)?;
    let alpha = chol
        .t()
        .solve_triangular_into(z, UPLO::Upper)?
        .remove_axis(Axis(1));

    let logdet_half = chol.diag().mapv(|v| v.ln()).sum();
    let mll = -F::cast(0.5) * residuals.dot(&alpha)
        - logdet_half
        - F::cast(0.5) * F::cast(n) * F::cast(2. * std::f64::consts::PI).ln();
    if !mll.is_finite() {
        return Err(GpError::LikelihoodComputationError(format!(
            "Non finite marginal log likelihood with {components}"
        )));
    }
    Ok((mll, GpInnerParams { chol, alpha }))
}

/// Gradient of the exact marginal log likelihood wrt packed raw hyperparameters:
/// `dm^T alpha` for the mean and `0.5 (alpha^T dK alpha - tr(Kn^-1 dK))` for noise and kernel
fn exact_mll_gradient<F: Float, Mean: MeanModel<F>, K: Kernel<F>>(
    components: &GpComponents<F, Mean, K>,
    x: &Array2<F>,
    inner: &GpInnerParams<F>,
) -> Result<Array1<F>> {
    let n = x.nrows();
    let alpha = &inner.alpha;
    let linv = inner.chol.solve_triangular(&Array2::eye(n), UPLO::Lower)?;
    let kinv = linv.t().dot(&linv);
    let half = F::cast(0.5);

    let mut grad = Array1::zeros(components.n_hyperparameters());
    for (i, dm) in components.mean.gradients(x).iter().enumerate() {
        grad[i] = dm.dot(alpha);
    }
    grad[components.noise_index()] = half
        * (alpha.dot(alpha) - kinv.diag().sum())
        * components.likelihood.noise_gradient();
    let offset = components.kernel_offset();
    for (i, dk) in components.kernel.covariance_gradients(x).iter().enumerate() {
        let trace = Zip::from(&kinv)
            .and(dk)
            .fold(F::zero(), |acc, &a, &b| acc + a * b);
        grad[offset + i] = half * (alpha.dot(&dk.dot(alpha)) - trace);
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{Matern32Kernel, Matern52Kernel, ProductStructureKernel};
    use approx::assert_abs_diff_eq;
    use linfa::prelude::{Dataset, Predict};
    use ndarray::{Array, array};
    use ndarray_npy::write_npy;
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn xsinx(x: &Array2<f64>) -> Array1<f64> {
        ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).remove_axis(Axis(1))
    }

    #[test]
    fn test_mll_two_points() {
        let x = array![[0.], [1.]];
        let y = array![1., -1.];
        let kernel = RbfKernel::new(array![1.]).unwrap();
        let likelihood = GaussianLikelihood::new(0.5).unwrap();
        let components = GpComponents::new(ZeroMean(), kernel, likelihood);
        let (mll, inner) = exact_mll(&components, &x, &y, 0.).unwrap();

        // K = [[1.5, c], [c, 1.5]] with c = exp(-1/2)
        let c = (-0.5f64).exp();
        let det = 1.5 * 1.5 - c * c;
        let alpha = array![1.5 + c, -c - 1.5] / det;
        let expected =
            -0.5 * y.dot(&alpha) - 0.5 * det.ln() - (2. * std::f64::consts::PI).ln();
        assert_abs_diff_eq!(inner.alpha, alpha, epsilon = 1e-12);
        assert_abs_diff_eq!(mll, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_mll_gradient() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let x = Array2::random_using((12, 2), Uniform::new(-1., 1.), &mut rng);
        let y = x.column(0).mapv(|v: f64| (3. * v).sin()) + x.column(1);
        let mut components = GpComponents::new(
            ConstantMean::new(0.2),
            ScaleKernel::new(Matern52Kernel::<f64>::ard(2)),
            GaussianLikelihood::default(),
        );
        components
            .set_hyperparameters(&array![0.2, -1., 0.3, -0.5, 0.4].view())
            .unwrap();
        let (_, inner) = exact_mll(&components, &x, &y, 0.).unwrap();
        let grad = exact_mll_gradient(&components, &x, &inner).unwrap();

        let raw = components.hyperparameters();
        let e = 1e-6;
        for i in 0..raw.len() {
            let mut plus = components.clone();
            let mut rp = raw.clone();
            rp[i] += e;
            plus.set_hyperparameters(&rp.view()).unwrap();
            let mut minus = components.clone();
            let mut rm = raw.clone();
            rm[i] -= e;
            minus.set_hyperparameters(&rm.view()).unwrap();
            let fd = (exact_mll(&plus, &x, &y, 0.).unwrap().0
                - exact_mll(&minus, &x, &y, 0.).unwrap().0)
                / (2. * e);
            assert_abs_diff_eq!(grad[i], fd, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_training_decreases_loss() {
        let xt = array![[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]];
        let yt = xsinx(&xt);
        let gp = GaussianProcess::<f64, ConstantMean<f64>, ScaleKernel<f64, RbfKernel<f64>>>::params(
            ConstantMean::default(),
            ScaleKernel::new(RbfKernel::new(array![5.]).unwrap()),
        )
        .n_iter(100)
        .fit(&Dataset::new(xt.clone(), yt.clone()))
        .expect("GP fit error");
        let history = gp.loss_history();
        assert_eq!(history.len(), 100);
        assert!(history[99] < history[0]);
        assert!(gp.mll().is_finite());
        let ypred = gp.predict(&xt).unwrap();
        let err = (&ypred - &yt).mapv(f64::abs).mean().unwrap();
        assert!(err < 1., "mean abs error {err}");
        assert!(gp.predict_var(&xt).unwrap().iter().all(|&v| v >= 0.));
    }

    macro_rules! test_gp {
        ($regr:ident, $kernel:ident) => {
            paste! {

                #[test]
                fn [<test_gp_ $regr:snake _ $kernel:snake >]() {
                    let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
                    let xplot = Array::linspace(0., 4., 100).insert_axis(Axis(1));
                    let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
                    let gp = GpParams::new(
                            [<$regr Mean>]::<f64>::default(),
                            ScaleKernel::new([<$kernel Kernel>]::<f64>::default()),
                        )
                        .likelihood(GaussianLikelihood::new(1e-3).unwrap())
                        .fit(&Dataset::new(xt, yt))
                        .expect("GP fit error");
                    let yvals = gp
                        .predict(&array![[1.0], [3.5]])
                        .expect("prediction error");
                    let expected_y = array![1.0, 0.9];
                    assert_abs_diff_eq!(expected_y, yvals, epsilon = 0.5);

                    let (gpr_vals, gpr_vars) = gp.predict_valvar(&xplot).unwrap();
                    assert_abs_diff_eq!(gpr_vals, gp.predict(&xplot).unwrap(), epsilon = 1e-12);
                    assert!(gpr_vars.iter().all(|&v| v >= 0.));

                    let test_dir = "target/tests";
                    std::fs::create_dir_all(test_dir).ok();

                    let gp_vals_file = stringify!([<gp_vals_ $regr:snake _ $kernel:snake >]);
                    let file_path = format!("{}/{}.npy", test_dir, gp_vals_file);
                    write_npy(file_path, &gpr_vals).expect("gp vals saved");

                    let gp_vars_file = stringify!([<gp_vars_ $regr:snake _ $kernel:snake >]);
                    let file_path = format!("{}/{}.npy", test_dir, gp_vars_file);
                    write_npy(file_path, &gpr_vars).expect("gp vars saved");
                }
            }
        };
    }

    test_gp!(Constant, Rbf);
    test_gp!(Constant, Matern32);
    test_gp!(Constant, Matern52);

    #[test]
    fn test_product_structure_kernel_fit() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array2::random_using((30, 3), Uniform::new(-1., 1.), &mut rng);
        let yt = xt.map_axis(Axis(1), |r| r.mapv(|v: f64| (2. * v).sin()).sum());
        let gp = GpParams::new(
            ConstantMean::<f64>::default(),
            ScaleKernel::new(ProductStructureKernel::new(Matern32Kernel::<f64>::default())),
        )
        .n_iter(30)
        .fit(&Dataset::new(xt.clone(), yt.clone()))
        .expect("GP fit error");
        let ypred = gp.predict(&xt).unwrap();
        let err = (&ypred - &yt).mapv(f64::abs).mean().unwrap();
        assert!(err < 0.3, "mean abs error {err}");
    }

    #[test]
    fn test_linfa_predict() {
        let xt = array![[0.], [1.], [2.], [3.]];
        let yt = array![0., 1., 0., -1.];
        let gp = Kriging::params()
            .n_iter(0)
            .fit(&Dataset::new(xt.clone(), yt))
            .unwrap();
        assert_eq!(gp.params_used().n_iter(), 0);
        let pred: Array1<f64> = gp.predict(&xt).unwrap();
        let linfa_pred = Predict::<&Array2<f64>, Array1<f64>>::predict(&gp, &xt);
        assert_abs_diff_eq!(pred, linfa_pred);
        let var = GpVariancePredictor(&gp).predict(&xt);
        assert_abs_diff_eq!(var, gp.predict_var(&xt).unwrap());
    }

    #[test]
    fn test_fit_errors() {
        let params = Kriging::<f64>::params();
        let empty = Dataset::new(Array2::zeros((0, 1)), Array1::zeros(0));
        assert!(params.clone().fit(&empty).is_err());
        let gp = params
            .n_iter(0)
            .fit(&Dataset::new(array![[0.], [1.]], array![0., 1.]))
            .unwrap();
        assert!(gp.predict(&array![[0., 1.]]).is_err());
        let ard = Kriging::<f64>::params().kernel(ScaleKernel::new(RbfKernel::ard(2)));
        assert!(ard.fit(&Dataset::new(array![[0.], [1.]], array![0., 1.])).is_err());
    }
}
