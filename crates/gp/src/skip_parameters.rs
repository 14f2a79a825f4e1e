use crate::errors::{GpError, Result};
use crate::interpolation::MIN_GRID_SIZE;
use crate::kernels::{GridKernel, RbfKernel};
use crate::likelihood::GaussianLikelihood;
use crate::mean_models::{ConstantMean, MeanModel};
use crate::parameters::{GpComponents, GpValidParams, check_learning_rate};
use crate::skip::SkipKernel;
use crate::{SKIP_DEFAULT_LEARNING_RATE, SKIP_DEFAULT_MAX_ROOT_RANK, SKIP_DEFAULT_N_ITER};
use linfa::{Float, ParamGuard};

/// Default seed of the Lanczos probe vectors
pub const SKIP_DEFAULT_SEED: u64 = 0;

/// A set of validated SKIP GP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SkipValidParams<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> {
    /// gp
    pub(crate) gp_params: GpValidParams<F, Mean, SkipKernel<F, K>>,
    /// Maximal number of columns of the kernel root decomposition
    pub(crate) max_root_rank: usize,
    /// Seed of the Lanczos probe vectors
    pub(crate) seed: u64,
    /// Per-dimension grid bounds, training data bounds when not specified
    pub(crate) grid_bounds: Option<Vec<(F, F)>>,
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> SkipValidParams<F, Mean, K> {
    /// Get mean model
    pub fn mean(&self) -> &Mean {
        self.gp_params.mean()
    }

    /// Get SKIP kernel (grids are built at fit time)
    pub fn kernel(&self) -> &SkipKernel<F, K> {
        self.gp_params.kernel()
    }

    /// Get likelihood
    pub fn likelihood(&self) -> &GaussianLikelihood<F> {
        self.gp_params.likelihood()
    }

    /// Get grid size
    pub fn grid_size(&self) -> usize {
        self.kernel().grid_size()
    }

    /// Get maximal root decomposition rank
    pub fn max_root_rank(&self) -> usize {
        self.max_root_rank
    }

    /// Get number of training iterations
    pub fn n_iter(&self) -> usize {
        self.gp_params.n_iter()
    }

    /// Get learning rate
    pub fn learning_rate(&self) -> F {
        self.gp_params.learning_rate()
    }

    /// Get nugget
    pub fn nugget(&self) -> F {
        self.gp_params.nugget()
    }

    /// Get seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get grid bounds if any
    pub fn grid_bounds(&self) -> Option<&[(F, F)]> {
        self.grid_bounds.as_deref()
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [SKIP GP algorithm](struct.SkipGaussianProcess.html).
pub struct SkipParams<F: Float, Mean: MeanModel<F>, K: GridKernel<F>>(SkipValidParams<F, Mean, K>);

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> SkipParams<F, Mean, K> {
    /// A constructor for SKIP GP parameters given mean and 1D base kernel
    pub fn new(mean: Mean, base: K) -> SkipParams<F, Mean, K> {
        let gp_params = GpValidParams {
            components: GpComponents::new(mean, SkipKernel::new(base), GaussianLikelihood::default()),
            n_iter: SKIP_DEFAULT_N_ITER,
            learning_rate: F::cast(SKIP_DEFAULT_LEARNING_RATE),
            nugget: F::cast(100.0) * F::epsilon(),
        };
        Self(SkipValidParams {
            gp_params,
            max_root_rank: SKIP_DEFAULT_MAX_ROOT_RANK,
            seed: SKIP_DEFAULT_SEED,
            grid_bounds: None,
        })
    }

    /// A constructor for SKIP GP parameters from validated parameters
    pub fn new_from_valid(params: &SkipValidParams<F, Mean, K>) -> Self {
        Self(params.clone())
    }

    /// Set mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.gp_params.components.mean = mean;
        self
    }

    /// Set 1D base kernel, keeping outputscale and grid size.
    pub fn base(mut self, base: K) -> Self {
        *self.0.gp_params.components.kernel.base_mut() = base;
        self
    }

    /// Set likelihood.
    pub fn likelihood(mut self, likelihood: GaussianLikelihood<F>) -> Self {
        self.0.gp_params.components.likelihood = likelihood;
        self
    }

    /// Set initial outputscale value
    pub fn outputscale(mut self, outputscale: F) -> Result<Self> {
        let kernel = &mut self.0.gp_params.components.kernel;
        *kernel = kernel.clone().with_outputscale(outputscale)?;
        Ok(self)
    }

    /// Set the number of points of each dimension grid (at least 4)
    pub fn grid_size(mut self, grid_size: usize) -> Self {
        let kernel = &mut self.0.gp_params.components.kernel;
        *kernel = kernel.clone().with_grid_size(grid_size);
        self
    }

    /// Set the maximal number of columns of the kernel root decomposition
    pub fn max_root_rank(mut self, max_root_rank: usize) -> Self {
        self.0.max_root_rank = max_root_rank;
        self
    }

    /// Set the number of Adam iterations
    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.0.gp_params.n_iter = n_iter;
        self
    }

    /// Set Adam learning rate
    pub fn learning_rate(mut self, learning_rate: F) -> Self {
        self.0.gp_params.learning_rate = learning_rate;
        self
    }

    /// Set nugget.
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.gp_params.nugget = nugget;
        self
    }

    /// Set the seed of the Lanczos probe vectors
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set per-dimension grid bounds (lower, upper).
    ///
    /// When not set, grids span the training data bounds.
    pub fn grid_bounds(mut self, grid_bounds: Option<Vec<(F, F)>>) -> Self {
        self.0.grid_bounds = grid_bounds;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> From<SkipValidParams<F, Mean, K>>
    for SkipParams<F, Mean, K>
{
    fn from(valid: SkipValidParams<F, Mean, K>) -> Self {
        SkipParams(valid)
    }
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> ParamGuard for SkipParams<F, Mean, K> {
    type Checked = SkipValidParams<F, Mean, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_learning_rate(self.0.learning_rate())?;
        if !(self.0.nugget() >= F::zero()) {
            return Err(GpError::InvalidValueError(format!(
                "Nugget should be positive, got {}",
                self.0.nugget()
            )));
        }
        if self.0.grid_size() < MIN_GRID_SIZE {
            return Err(GpError::InvalidValueError(format!(
                "Grid size should be at least {MIN_GRID_SIZE}, got {}",
                self.0.grid_size()
            )));
        }
        if self.0.max_root_rank == 0 {
            return Err(GpError::InvalidValueError(
                "Root decomposition rank should be at least 1".to_string(),
            ));
        }
        // base kernel is evaluated on 1D grids
        self.0.kernel().base().check_dim(1)?;
        if let Some(bounds) = &self.0.grid_bounds
            && bounds.iter().any(|(lo, hi)| !(lo <= hi))
        {
            return Err(GpError::InvalidValueError(
                "Grid bounds should be given as (lower, upper)".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// SKIP GP with constant mean and RBF base kernel as used for tabular regression
pub type SkipKriging<F> = SkipParams<F, ConstantMean<F>, RbfKernel<F>>;

impl<F: Float> SkipKriging<F> {
    /// SKIP Kriging parameters constructor
    pub fn params() -> SkipParams<F, ConstantMean<F>, RbfKernel<F>> {
        SkipParams::new(ConstantMean::default(), RbfKernel::default())
    }
}

impl<F: Float, Mean: MeanModel<F>, K: GridKernel<F>> Default for SkipParams<F, Mean, K>
where
    Mean: Default,
    K: Default,
{
    fn default() -> Self {
        SkipParams::new(Mean::default(), K::default())
    }
}
