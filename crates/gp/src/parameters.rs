use crate::errors::{GpError, Result};
use crate::kernels::{Kernel, check_length};
use crate::likelihood::GaussianLikelihood;
use crate::mean_models::MeanModel;
use crate::{GP_DEFAULT_LEARNING_RATE, GP_DEFAULT_N_ITER};
use linfa::{Float, ParamGuard};
use ndarray::{Array1, ArrayView1, s};
use std::fmt;

/// The learnable parts of a GP model: mean, kernel and likelihood.
///
/// Raw hyperparameters are packed in that order: mean ones, noise, kernel ones.
#[derive(Clone, Debug, PartialEq)]
pub struct GpComponents<F: Float, Mean: MeanModel<F>, K: Kernel<F>> {
    /// Mean model
    pub mean: Mean,
    /// Covariance kernel
    pub kernel: K,
    /// Observation model
    pub likelihood: GaussianLikelihood<F>,
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> GpComponents<F, Mean, K> {
    /// Gather GP model components
    pub fn new(mean: Mean, kernel: K, likelihood: GaussianLikelihood<F>) -> Self {
        GpComponents {
            mean,
            kernel,
            likelihood,
        }
    }

    /// Total number of raw hyperparameters
    pub fn n_hyperparameters(&self) -> usize {
        self.mean.n_hyperparameters() + 1 + self.kernel.n_hyperparameters()
    }

    /// Index of the raw noise in the packed vector
    pub fn noise_index(&self) -> usize {
        self.mean.n_hyperparameters()
    }

    /// Index of the first raw kernel hyperparameter in the packed vector
    pub fn kernel_offset(&self) -> usize {
        self.mean.n_hyperparameters() + 1
    }

    /// Packed raw hyperparameters
    pub fn hyperparameters(&self) -> Array1<F> {
        let mean = self.mean.hyperparameters();
        let lik = self.likelihood.hyperparameters();
        let kernel = self.kernel.hyperparameters();
        mean.iter()
            .chain(lik.iter())
            .chain(kernel.iter())
            .cloned()
            .collect()
    }

    /// Unpack raw hyperparameters
    pub fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(self.n_hyperparameters(), raw.len(), "GP")?;
        let (i, j) = (self.noise_index(), self.kernel_offset());
        self.mean.set_hyperparameters(&raw.slice(s![..i]))?;
        self.likelihood.set_hyperparameters(&raw.slice(s![i..j]))?;
        self.kernel.set_hyperparameters(&raw.slice(s![j..]))
    }

    /// Check components against the input dimension
    pub fn check_dim(&self, nx: usize) -> Result<()> {
        self.mean.check_dim(nx)?;
        self.kernel.check_dim(nx)
    }
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> fmt::Display for GpComponents<F, Mean, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mean={}, kernel={}, likelihood={}", self.mean, self.kernel, self.likelihood)
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GpValidParams<F: Float, Mean: MeanModel<F>, K: Kernel<F>> {
    /// Initial model components
    pub(crate) components: GpComponents<F, Mean, K>,
    /// Number of Adam iterations
    pub(crate) n_iter: usize,
    /// Adam learning rate
    pub(crate) learning_rate: F,
    /// Parameter to improve numerical stability
    pub(crate) nugget: F,
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> GpValidParams<F, Mean, K> {
    /// Get mean model
    pub fn mean(&self) -> &Mean {
        &self.components.mean
    }

    /// Get kernel k(x, x')
    pub fn kernel(&self) -> &K {
        &self.components.kernel
    }

    /// Get likelihood
    pub fn likelihood(&self) -> &GaussianLikelihood<F> {
        &self.components.likelihood
    }

    /// Get number of training iterations
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Get learning rate
    pub fn learning_rate(&self) -> F {
        self.learning_rate
    }

    /// Get nugget
    pub fn nugget(&self) -> F {
        self.nugget
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](struct.GaussianProcess.html).
pub struct GpParams<F: Float, Mean: MeanModel<F>, K: Kernel<F>>(GpValidParams<F, Mean, K>);

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> GpParams<F, Mean, K> {
    /// A constructor for GP parameters given mean and kernel models
    pub fn new(mean: Mean, kernel: K) -> GpParams<F, Mean, K> {
        Self(GpValidParams {
            components: GpComponents::new(mean, kernel, GaussianLikelihood::default()),
            n_iter: GP_DEFAULT_N_ITER,
            learning_rate: F::cast(GP_DEFAULT_LEARNING_RATE),
            nugget: F::cast(100.0) * F::epsilon(),
        })
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F, Mean, K>) -> Self {
        Self(params.clone())
    }

    /// Set mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.components.mean = mean;
        self
    }

    /// Set kernel.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.components.kernel = kernel;
        self
    }

    /// Set likelihood.
    pub fn likelihood(mut self, likelihood: GaussianLikelihood<F>) -> Self {
        self.0.components.likelihood = likelihood;
        self
    }

    /// Set the number of Adam iterations, 0 means hyperparameters are kept as is
    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.0.n_iter = n_iter;
        self
    }

    /// Set Adam learning rate
    pub fn learning_rate(mut self, learning_rate: F) -> Self {
        self.0.learning_rate = learning_rate;
        self
    }

    /// Set nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget = nugget;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> From<GpValidParams<F, Mean, K>>
    for GpParams<F, Mean, K>
{
    fn from(valid: GpValidParams<F, Mean, K>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, Mean: MeanModel<F>, K: Kernel<F>> ParamGuard for GpParams<F, Mean, K> {
    type Checked = GpValidParams<F, Mean, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_learning_rate(self.0.learning_rate)?;
        if !(self.0.nugget >= F::zero()) {
            return Err(GpError::InvalidValueError(format!(
                "Nugget should be positive, got {}",
                self.0.nugget
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

pub(crate) fn check_learning_rate<F: Float>(learning_rate: F) -> Result<()> {
    if learning_rate > F::zero() && learning_rate.is_finite() {
        Ok(())
    } else {
        Err(GpError::InvalidValueError(format!(
            "Learning rate should be positive, got {learning_rate}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::RbfKernel;
    use crate::mean_models::ConstantMean;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_components_packing() {
        let mut components = GpComponents::new(
            ConstantMean::new(1.),
            RbfKernel::<f64>::ard(2),
            GaussianLikelihood::default(),
        );
        assert_eq!(components.n_hyperparameters(), 4);
        assert_abs_diff_eq!(components.hyperparameters(), array![1., 0., 0., 0.]);
        components
            .set_hyperparameters(&array![2., -1., 0.5, 0.7].view())
            .unwrap();
        assert_abs_diff_eq!(components.mean.constant(), 2.);
        assert_abs_diff_eq!(components.kernel.hyperparameters(), array![0.5, 0.7]);
        assert!(components.set_hyperparameters(&array![1.].view()).is_err());
        assert!(components.check_dim(2).is_ok());
        assert!(components.check_dim(3).is_err());
    }

    #[test]
    fn test_params_check() {
        let params = GpParams::new(ConstantMean::<f64>::default(), RbfKernel::default());
        assert!(params.clone().check().is_ok());
        assert!(params.clone().learning_rate(0.).check().is_err());
        assert!(params.nugget(-1.).check().is_err());
    }
}
