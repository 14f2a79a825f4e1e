//! A module for covariance kernels used to model the latent function of the GP model.
//!
//! Kernel hyperparameters are handled as unconstrained *raw* values, positive quantities
//! (lengthscales, outputscales, variances) being recovered through the softplus transform.
//!
//! The following kernels are implemented:
//! * stationary kernels with squared exponential, matern 3/2 and matern 5/2 profiles,
//! * scale kernel (outputscale times a base kernel),
//! * product structure kernel (product over input dimensions of a 1D base kernel),
//! * linear kernel,
//! * index and multitask kernels.

use crate::errors::{GpError, Result};
use crate::lazy::{KroneckerOperator, LinearOperator, MatmulOperator, RootOperator, ShiftedOperator};
use crate::utils::{inv_softplus, sigmoid, softplus};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2, Zip, s};
use paste::paste;
use std::convert::TryFrom;
use std::fmt;

/// A trait for covariance kernels used in GP regression
pub trait Kernel<F: Float>: Clone + fmt::Display + Send + Sync {
    /// Raw (unconstrained) hyperparameters
    fn hyperparameters(&self) -> Array1<F>;

    /// Set raw hyperparameters, length has to match [Kernel::n_hyperparameters]
    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()>;

    /// Number of raw hyperparameters
    fn n_hyperparameters(&self) -> usize {
        self.hyperparameters().len()
    }

    /// Check the kernel can handle inputs of dimension `nx`
    fn check_dim(&self, _nx: usize) -> Result<()> {
        Ok(())
    }

    /// Covariance matrix (n1, n2) between `x1` (n1, nx) and `x2` (n2, nx)
    fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F>;

    /// Diagonal of the covariance matrix of `x` with itself
    fn diag(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        let mut res = Array1::zeros(x.nrows());
        Zip::from(&mut res).and(x.rows()).for_each(|r, xi| {
            let xi = xi.insert_axis(Axis(0));
            *r = self.covariance(&xi, &xi)[[0, 0]];
        });
        res
    }

    /// Derivatives of `K(x, x)` wrt each raw hyperparameter
    fn covariance_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>>;
}

/// A trait for 1D stationary kernels evaluated on a regular grid
/// as needed by structured kernel interpolation
pub trait GridKernel<F: Float>: Kernel<F> {
    /// First column of the (size, size) symmetric Toeplitz covariance matrix of grid points
    /// separated by `spacing`
    fn grid_column(&self, spacing: F, size: usize) -> Array1<F>;

    /// Derivatives of [GridKernel::grid_column] wrt each raw hyperparameter
    fn grid_column_gradients(&self, spacing: F, size: usize) -> Vec<Array1<F>>;
}

/// A stationary kernel profile expressed on the squared scaled distance
/// `tau2 = sum_j ((x_j - x'_j) / l_j)^2`
pub trait Profile: Clone + Copy + Default + fmt::Display + Send + Sync {
    /// Kernel value `k(tau2)`
    fn value<F: Float>(&self, tau2: F) -> F;

    /// Derivative `dk/dtau2`
    fn dtau2<F: Float>(&self, tau2: F) -> F;
}

/// Squared exponential (RBF) profile: `exp(-tau2 / 2)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SquaredExponential();

impl Profile for SquaredExponential {
    fn value<F: Float>(&self, tau2: F) -> F {
        (-tau2 / F::cast(2.)).exp()
    }

    fn dtau2<F: Float>(&self, tau2: F) -> F {
        -(-tau2 / F::cast(2.)).exp() / F::cast(2.)
    }
}

/// Matern 3/2 profile: `(1 + sqrt(3) tau) exp(-sqrt(3) tau)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Matern32();

impl Profile for Matern32 {
    fn value<F: Float>(&self, tau2: F) -> F {
        let a = F::cast(3.).sqrt() * tau2.sqrt();
        (F::one() + a) * (-a).exp()
    }

    fn dtau2<F: Float>(&self, tau2: F) -> F {
        let a = F::cast(3.).sqrt() * tau2.sqrt();
        -F::cast(1.5) * (-a).exp()
    }
}

/// Matern 5/2 profile: `(1 + sqrt(5) tau + 5/3 tau^2) exp(-sqrt(5) tau)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Matern52();

impl Profile for Matern52 {
    fn value<F: Float>(&self, tau2: F) -> F {
        let a = F::cast(5.).sqrt() * tau2.sqrt();
        (F::one() + a + F::cast(5. / 3.) * tau2) * (-a).exp()
    }

    fn dtau2<F: Float>(&self, tau2: F) -> F {
        let a = F::cast(5.).sqrt() * tau2.sqrt();
        -F::cast(5. / 6.) * (F::one() + a) * (-a).exp()
    }
}

macro_rules! declare_profile_util_impls {
    ($profile:ident) => {
        paste! {
            impl fmt::Display for $profile {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}", stringify!($profile))
                }
            }

            impl From<$profile> for String {
                fn from(item: $profile) -> Self {
                    item.to_string()
                }
            }

            impl TryFrom<String> for $profile {
                type Error = &'static str;
                fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                    if s == stringify!($profile) {
                        Ok(Self::default())
                    } else {
                        Err(concat!("Bad string value for ", stringify!($profile)))
                    }
                }
            }

            #[doc = "Stationary kernel with " $profile " profile"]
            pub type [<$profile Kernel>]<F> = StationaryKernel<F, $profile>;
        }
    };
}

declare_profile_util_impls!(SquaredExponential);
declare_profile_util_impls!(Matern32);
declare_profile_util_impls!(Matern52);

/// Radial basis function kernel, alias of the squared exponential kernel
pub type RbfKernel<F> = StationaryKernel<F, SquaredExponential>;

/// Stationary kernel `k(tau2)` with either a single lengthscale shared by all
/// input dimensions or one lengthscale per dimension (ARD)
#[derive(Clone, Debug, PartialEq)]
pub struct StationaryKernel<F: Float, P: Profile> {
    raw_lengthscale: Array1<F>,
    profile: P,
}

impl<F: Float, P: Profile> Default for StationaryKernel<F, P> {
    /// Single lengthscale `softplus(0) = ln 2`
    fn default() -> Self {
        StationaryKernel {
            raw_lengthscale: Array1::zeros(1),
            profile: P::default(),
        }
    }
}

impl<F: Float, P: Profile> StationaryKernel<F, P> {
    /// Kernel with given positive lengthscale values
    pub fn new(lengthscale: Array1<F>) -> Result<Self> {
        if lengthscale.is_empty() || lengthscale.iter().any(|&l| !(l > F::zero())) {
            return Err(GpError::InvalidValueError(format!(
                "Lengthscales should be positive, got {lengthscale}"
            )));
        }
        Ok(StationaryKernel {
            raw_lengthscale: lengthscale.mapv(inv_softplus),
            profile: P::default(),
        })
    }

    /// Kernel with one lengthscale per input dimension (raw values initialized to 0)
    pub fn ard(dim: usize) -> Self {
        StationaryKernel {
            raw_lengthscale: Array1::zeros(dim.max(1)),
            profile: P::default(),
        }
    }

    /// Lengthscale values
    pub fn lengthscale(&self) -> Array1<F> {
        self.raw_lengthscale.mapv(softplus)
    }

    /// Kernel profile
    pub fn profile(&self) -> P {
        self.profile
    }

    fn squared_distances(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        lengthscale: &Array1<F>,
    ) -> Array2<F> {
        let inv_l = self.broadcast(lengthscale, x1.ncols()).mapv(|l| F::one() / l);
        let z1 = x1 * &inv_l;
        let z2 = x2 * &inv_l;
        let mut tau2 = Array2::zeros((x1.nrows(), x2.nrows()));
        Zip::from(tau2.rows_mut())
            .and(z1.rows())
            .par_for_each(|mut row, a| {
                Zip::from(&mut row).and(z2.rows()).for_each(|t, b| {
                    *t = Zip::from(&a)
                        .and(&b)
                        .fold(F::zero(), |acc, &u, &v| acc + (u - v) * (u - v));
                });
            });
        tau2
    }

    fn broadcast(&self, values: &Array1<F>, nx: usize) -> Array1<F> {
        if values.len() == 1 {
            Array1::from_elem(nx, values[0])
        } else {
            values.to_owned()
        }
    }
}

impl<F: Float, P: Profile> fmt::Display for StationaryKernel<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(lengthscale={})", self.profile, self.lengthscale())
    }
}

impl<F: Float, P: Profile> Kernel<F> for StationaryKernel<F, P> {
    fn hyperparameters(&self) -> Array1<F> {
        self.raw_lengthscale.to_owned()
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(self.raw_lengthscale.len(), raw.len(), "lengthscale")?;
        self.raw_lengthscale.assign(raw);
        Ok(())
    }

    fn check_dim(&self, nx: usize) -> Result<()> {
        let nl = self.raw_lengthscale.len();
        if nl == 1 || nl == nx {
            Ok(())
        } else {
            Err(GpError::InvalidValueError(format!(
                "Kernel has {nl} lengthscales, expected 1 or {nx}"
            )))
        }
    }

    fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let tau2 = self.squared_distances(x1, x2, &self.lengthscale());
        tau2.mapv(|t| self.profile.value(t))
    }

    fn diag(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.profile.value(F::zero()))
    }

    fn covariance_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>> {
        let lengthscale = self.lengthscale();
        let tau2 = self.squared_distances(x, x, &lengthscale);
        let dk = tau2.mapv(|t| self.profile.dtau2(t));
        if lengthscale.len() == 1 {
            // dtau2/dl = -2 tau2 / l
            let factor = -F::cast(2.) / lengthscale[0] * sigmoid(self.raw_lengthscale[0]);
            vec![dk * &tau2 * factor]
        } else {
            (0..lengthscale.len())
                .map(|j| {
                    let l = lengthscale[j];
                    let xj = x.column(j);
                    let factor = -F::cast(2.) / (l * l * l) * sigmoid(self.raw_lengthscale[j]);
                    let mut grad = dk.to_owned();
                    Zip::indexed(&mut grad).for_each(|(a, b), g| {
                        let d = xj[a] - xj[b];
                        *g *= factor * d * d;
                    });
                    grad
                })
                .collect()
        }
    }
}

impl<F: Float, P: Profile> GridKernel<F> for StationaryKernel<F, P> {
    fn grid_column(&self, spacing: F, size: usize) -> Array1<F> {
        let l = self.lengthscale()[0];
        Array1::from_shape_fn(size, |k| {
            let d = F::cast(k) * spacing / l;
            self.profile.value(d * d)
        })
    }

    fn grid_column_gradients(&self, spacing: F, size: usize) -> Vec<Array1<F>> {
        let l = self.lengthscale()[0];
        let factor = -F::cast(2.) / l * sigmoid(self.raw_lengthscale[0]);
        vec![Array1::from_shape_fn(size, |k| {
            let d = F::cast(k) * spacing / l;
            let tau2 = d * d;
            self.profile.dtau2(tau2) * tau2 * factor
        })]
    }
}

/// Base kernel scaled by a positive outputscale `s = softplus(raw)`
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleKernel<F: Float, K: Kernel<F>> {
    base: K,
    raw_outputscale: F,
}

impl<F: Float, K: Kernel<F>> ScaleKernel<F, K> {
    /// Scale kernel with raw outputscale initialized to 0
    pub fn new(base: K) -> Self {
        ScaleKernel {
            base,
            raw_outputscale: F::zero(),
        }
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

    /// Outputscale value
    pub fn outputscale(&self) -> F {
        softplus(self.raw_outputscale)
    }

    /// Scaled kernel
    pub fn base(&self) -> &K {
        &self.base
    }
}

impl<F: Float, K: Kernel<F>> fmt::Display for ScaleKernel<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Scale(outputscale={}, {})", self.outputscale(), self.base)
    }
}

impl<F: Float, K: Kernel<F>> Kernel<F> for ScaleKernel<F, K> {
    fn hyperparameters(&self) -> Array1<F> {
        let base = self.base.hyperparameters();
        std::iter::once(self.raw_outputscale)
            .chain(base.iter().cloned())
            .collect()
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(self.n_hyperparameters(), raw.len(), "scale kernel")?;
        self.raw_outputscale = raw[0];
        self.base.set_hyperparameters(&raw.slice(s![1..]))
    }

    fn n_hyperparameters(&self) -> usize {
        1 + self.base.n_hyperparameters()
    }

    fn check_dim(&self, nx: usize) -> Result<()> {
        self.base.check_dim(nx)
    }

    fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        self.base.covariance(x1, x2) * self.outputscale()
    }

    fn diag(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        self.base.diag(x) * self.outputscale()
    }

    fn covariance_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>> {
        let s = self.outputscale();
        let mut grads = vec![self.base.covariance(x, x) * sigmoid(self.raw_outputscale)];
        grads.extend(
            self.base
                .covariance_gradients(x)
                .into_iter()
                .map(|g| g * s),
        );
        grads
    }
}

/// Product over input dimensions of a 1D base kernel sharing its hyperparameters:
/// `k(x, x') = prod_d k_base(x_d, x'_d)`
#[derive(Clone, Debug, PartialEq)]
pub struct ProductStructureKernel<F: Float, K: Kernel<F>> {
    base: K,
    _phantom: std::marker::PhantomData<F>,
}

impl<F: Float, K: Kernel<F>> ProductStructureKernel<F, K> {
    /// Product structure over 1D `base` kernel
    pub fn new(base: K) -> Self {
        ProductStructureKernel {
            base,
            _phantom: std::marker::PhantomData,
        }
    }

    /// 1D base kernel
    pub fn base(&self) -> &K {
        &self.base
    }

    fn dimension_covariances(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Vec<Array2<F>> {
        (0..x1.ncols())
            .map(|d| {
                self.base
                    .covariance(&x1.slice(s![.., d..d + 1]), &x2.slice(s![.., d..d + 1]))
            })
            .collect()
    }
}

impl<F: Float, K: Kernel<F>> fmt::Display for ProductStructureKernel<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ProductStructure({})", self.base)
    }
}

impl<F: Float, K: Kernel<F>> Kernel<F> for ProductStructureKernel<F, K> {
    fn hyperparameters(&self) -> Array1<F> {
        self.base.hyperparameters()
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        self.base.set_hyperparameters(raw)
    }

    fn n_hyperparameters(&self) -> usize {
        self.base.n_hyperparameters()
    }

    fn check_dim(&self, _nx: usize) -> Result<()> {
        self.base.check_dim(1)
    }

    fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        self.dimension_covariances(x1, x2)
            .into_iter()
            .fold(Array2::ones((x1.nrows(), x2.nrows())), |acc, c| acc * c)
    }

    fn covariance_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>> {
        let n = x.nrows();
        let covs = self.dimension_covariances(x, x);
        let nx = covs.len();
        // prefix[d] = prod_{e < d} K_e, suffix[d] = prod_{e >= d} K_e
        let mut prefix = vec![Array2::ones((n, n))];
        for c in covs.iter() {
            let next = prefix[prefix.len() - 1].to_owned() * c;
            prefix.push(next);
        }
        let mut suffix = vec![Array2::ones((n, n)); nx + 1];
        for d in (0..nx).rev() {
            suffix[d] = &suffix[d + 1] * &covs[d];
        }
        let mut grads = vec![Array2::zeros((n, n)); self.n_hyperparameters()];
        for d in 0..nx {
            let others = &prefix[d] * &suffix[d + 1];
            let dgrads = self.base.covariance_gradients(&x.slice(s![.., d..d + 1]));
            grads
                .iter_mut()
                .zip(dgrads.iter())
                .for_each(|(g, dg)| *g += &(&others * dg));
        }
        grads
    }
}

/// Linear kernel `k(x, x') = (x - o)^T (x' - o) + v` with a positive variance `v`
/// and one offset per input dimension
#[derive(Clone, Debug, PartialEq)]
pub struct LinearKernel<F: Float> {
    raw_variance: F,
    offset: Array1<F>,
}

impl<F: Float> LinearKernel<F> {
    /// Linear kernel for inputs of dimension `nx` (raw variance and offsets initialized to 0)
    pub fn new(nx: usize) -> Self {
        LinearKernel {
            raw_variance: F::zero(),
            offset: Array1::zeros(nx),
        }
    }

    /// Variance value
    pub fn variance(&self) -> F {
        softplus(self.raw_variance)
    }

    /// Offset values
    pub fn offset(&self) -> &Array1<F> {
        &self.offset
    }

    /// Lazy covariance: a root operator `(X - o)(X - o)^T + v` when `x1` and `x2` are the same
    /// points, a matmul operator `(X1 - o)(X2 - o)^T + v` otherwise
    pub fn lazy_covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Box<dyn LinearOperator<F>> {
        let z1 = x1 - &self.offset;
        let base: Box<dyn LinearOperator<F>> = if x1 == x2 {
            Box::new(RootOperator::new(z1))
        } else {
            Box::new(MatmulOperator::new(z1, x2 - &self.offset))
        };
        Box::new(ShiftedOperator::new(base, self.variance()))
    }
}

impl<F: Float> fmt::Display for LinearKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Linear(variance={}, offset={})", self.variance(), self.offset)
    }
}

impl<F: Float> Kernel<F> for LinearKernel<F> {
    fn hyperparameters(&self) -> Array1<F> {
        std::iter::once(self.raw_variance)
            .chain(self.offset.iter().cloned())
            .collect()
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(self.n_hyperparameters(), raw.len(), "linear kernel")?;
        self.raw_variance = raw[0];
        self.offset.assign(&raw.slice(s![1..]));
        Ok(())
    }

    fn n_hyperparameters(&self) -> usize {
        1 + self.offset.len()
    }

    fn check_dim(&self, nx: usize) -> Result<()> {
        if self.offset.len() == nx {
            Ok(())
        } else {
            Err(GpError::InvalidValueError(format!(
                "Linear kernel built for dimension {}, got {nx}",
                self.offset.len()
            )))
        }
    }

    fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let z1 = x1 - &self.offset;
        let z2 = x2 - &self.offset;
        z1.dot(&z2.t()) + self.variance()
    }

    fn diag(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        let z = x - &self.offset;
        (&z * &z).sum_axis(Axis(1)) + self.variance()
    }

    fn covariance_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>> {
        let n = x.nrows();
        let mut grads = vec![Array2::from_elem((n, n), sigmoid(self.raw_variance))];
        for j in 0..self.offset.len() {
            let z = x.column(j).mapv(|v| v - self.offset[j]);
            grads.push(Array2::from_shape_fn((n, n), |(a, b)| -(z[a] + z[b])));
        }
        grads
    }
}

/// Task covariance `B = W W^T + diag(exp(log_var))` of a multitask model
/// where `W` is a (n_tasks, rank) factor
#[derive(Clone, Debug, PartialEq)]
pub struct IndexKernel<F: Float> {
    covar_factor: Array2<F>,
    log_var: Array1<F>,
}

impl<F: Float> IndexKernel<F> {
    /// Index kernel with a zero factor and unit variances, i.e. `B = I`
    pub fn new(n_tasks: usize, rank: usize) -> Self {
        IndexKernel {
            covar_factor: Array2::zeros((n_tasks, rank)),
            log_var: Array1::zeros(n_tasks),
        }
    }

    /// Set the (n_tasks, rank) factor `W`
    pub fn with_covar_factor(mut self, covar_factor: Array2<F>) -> Result<Self> {
        if covar_factor.nrows() != self.n_tasks() {
            return Err(GpError::InvalidValueError(format!(
                "Covariance factor should have {} rows, got {}",
                self.n_tasks(),
                covar_factor.nrows()
            )));
        }
        self.covar_factor = covar_factor;
        Ok(self)
    }

    /// Number of tasks
    pub fn n_tasks(&self) -> usize {
        self.log_var.len()
    }

    /// Raw hyperparameters: flattened factor followed by log variances
    pub fn hyperparameters(&self) -> Array1<F> {
        self.covar_factor
            .iter()
            .chain(self.log_var.iter())
            .cloned()
            .collect()
    }

    /// Set raw hyperparameters
    pub fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        let nw = self.covar_factor.len();
        check_length(nw + self.log_var.len(), raw.len(), "index kernel")?;
        let rank = self.covar_factor.ncols();
        self.covar_factor = Array2::from_shape_fn(self.covar_factor.dim(), |(i, j)| raw[i * rank + j]);
        self.log_var.assign(&raw.slice(s![nw..]));
        Ok(())
    }

    /// Dense (n_tasks, n_tasks) task covariance matrix
    pub fn covariance_matrix(&self) -> Array2<F> {
        self.covar_factor.dot(&self.covar_factor.t()) + Array2::from_diag(&self.log_var.mapv(|v| v.exp()))
    }
}

/// Multitask kernel `B ⊗ K(x1, x2)` combining an [IndexKernel] over tasks
/// with a data kernel
#[derive(Clone, Debug, PartialEq)]
pub struct MultitaskKernel<F: Float, K: Kernel<F>> {
    task_covar: IndexKernel<F>,
    data_covar: K,
}

impl<F: Float, K: Kernel<F>> MultitaskKernel<F, K> {
    /// Multitask kernel over `n_tasks` with a task covariance factor of given `rank`
    pub fn new(data_covar: K, n_tasks: usize, rank: usize) -> Self {
        MultitaskKernel {
            task_covar: IndexKernel::new(n_tasks, rank),
            data_covar,
        }
    }

    /// Set the task covariance kernel
    pub fn with_task_covar(mut self, task_covar: IndexKernel<F>) -> Self {
        self.task_covar = task_covar;
        self
    }

    /// Number of tasks
    pub fn n_tasks(&self) -> usize {
        self.task_covar.n_tasks()
    }

    /// Task covariance kernel
    pub fn task_covar(&self) -> &IndexKernel<F> {
        &self.task_covar
    }

    /// Data covariance kernel
    pub fn data_covar(&self) -> &K {
        &self.data_covar
    }

    /// Size of the multitask covariance between `n1` and `n2` points
    pub fn size(&self, n1: usize, n2: usize) -> (usize, usize) {
        (self.n_tasks() * n1, self.n_tasks() * n2)
    }

    /// Lazy Kronecker covariance `B ⊗ K(x1, x2)`
    pub fn covariance_operator(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> KroneckerOperator<F> {
        KroneckerOperator::new(
            self.task_covar.covariance_matrix(),
            self.data_covar.covariance(x1, x2),
        )
    }

    /// Dense multitask covariance `B ⊗ K(x1, x2)`
    pub fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        self.covariance_operator(x1, x2).to_dense()
    }
}

pub(crate) fn check_length(expected: usize, actual: usize, what: &str) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(GpError::InvalidValueError(format!(
            "Bad number of {what} hyperparameters: expected {expected}, got {actual}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array};
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use rand_xoshiro::Xoshiro256Plus;

    fn random_x(n: usize, nx: usize) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        Array2::random_using((n, nx), Uniform::new(-1., 1.), &mut rng)
    }

    /// Central finite differences of K(x, x) wrt raw hyperparameters
    fn fd_gradients<K: Kernel<f64>>(kernel: &K, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let raw = kernel.hyperparameters();
        let e = 1e-6;
        (0..raw.len())
            .map(|i| {
                let mut kp = kernel.clone();
                let mut km = kernel.clone();
                let mut rp = raw.clone();
                let mut rm = raw.clone();
                rp[i] += e;
                rm[i] -= e;
                kp.set_hyperparameters(&rp.view()).unwrap();
                km.set_hyperparameters(&rm.view()).unwrap();
                (kp.covariance(x, x) - km.covariance(x, x)) / (2. * e)
            })
            .collect()
    }

    fn check_gradients<K: Kernel<f64>>(kernel: &K, x: &Array2<f64>) {
        let grads = kernel.covariance_gradients(x);
        let fds = fd_gradients(kernel, x);
        assert_eq!(grads.len(), kernel.n_hyperparameters());
        for (g, fd) in grads.iter().zip(fds.iter()) {
            assert_abs_diff_eq!(g, fd, epsilon = 1e-6);
        }
    }

    macro_rules! test_profile {
        ($profile:ident) => {
            paste! {
                #[test]
                fn [<test_ $profile:snake _gradients>]() {
                    let x = random_x(6, 3);
                    let kernel = [<$profile Kernel>]::<f64>::new(array![0.7]).unwrap();
                    check_gradients(&kernel, &x);
                    let mut ard = [<$profile Kernel>]::<f64>::ard(3);
                    ard.set_hyperparameters(&array![-0.3, 0.2, 0.9].view()).unwrap();
                    check_gradients(&ard, &x);
                }

                #[test]
                fn [<test_ $profile:snake _grid_column>]() {
                    let kernel = [<$profile Kernel>]::<f64>::new(array![0.3]).unwrap();
                    let grid = Array::linspace(0., 1.5, 7).insert_axis(Axis(1));
                    let col = kernel.grid_column(0.25, 7);
                    assert_abs_diff_eq!(
                        col,
                        kernel.covariance(&grid, &grid).column(0).to_owned(),
                        epsilon = 1e-12
                    );
                    let e = 1e-6;
                    let mut kp = kernel.clone();
                    let mut km = kernel.clone();
                    let raw = kernel.hyperparameters();
                    kp.set_hyperparameters(&(&raw + e).view()).unwrap();
                    km.set_hyperparameters(&(&raw - e).view()).unwrap();
                    let fd = (kp.grid_column(0.25, 7) - km.grid_column(0.25, 7)) / (2. * e);
                    assert_abs_diff_eq!(kernel.grid_column_gradients(0.25, 7)[0], fd, epsilon = 1e-6);
                }

                #[test]
                fn [<test_ $profile:snake _utils>]() {
                    assert_eq!(stringify!($profile), $profile::default().to_string());
                    assert!($profile::try_from(stringify!($profile).to_string()).is_ok());
                    assert!($profile::try_from("Foo".to_string()).is_err());
                }
            }
        };
    }

    test_profile!(SquaredExponential);
    test_profile!(Matern32);
    test_profile!(Matern52);

    #[test]
    fn test_rbf_values() {
        let kernel = RbfKernel::<f64>::new(array![2.]).unwrap();
        let x1 = array![[0., 0.]];
        let x2 = array![[1., 1.], [0., 0.]];
        let k = kernel.covariance(&x1, &x2);
        assert_abs_diff_eq!(k, array![[(-0.25f64).exp(), 1.]], epsilon = 1e-12);
        assert_abs_diff_eq!(kernel.diag(&x2), array![1., 1.]);
    }

    #[test]
    fn test_bad_lengthscales() {
        assert!(RbfKernel::<f64>::new(array![0.]).is_err());
        assert!(RbfKernel::<f64>::new(array![]).is_err());
        let kernel = RbfKernel::<f64>::ard(3);
        assert!(kernel.check_dim(2).is_err());
        assert!(kernel.check_dim(3).is_ok());
        let mut kernel = RbfKernel::<f64>::default();
        assert!(kernel.set_hyperparameters(&array![1., 2.].view()).is_err());
    }

    #[test]
    fn test_scale_kernel() {
        let x = random_x(5, 2);
        let kernel = ScaleKernel::new(Matern52Kernel::<f64>::default())
            .with_outputscale(2.5)
            .unwrap();
        assert_abs_diff_eq!(kernel.outputscale(), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(kernel.diag(&x), Array1::from_elem(5, 2.5), epsilon = 1e-12);
        check_gradients(&kernel, &x);
    }

    #[test]
    fn test_product_structure_kernel() {
        let x = random_x(7, 3);
        let base = RbfKernel::<f64>::new(array![0.8]).unwrap();
        let kernel = ProductStructureKernel::new(base.clone());
        // the product of 1D rbf kernels is the rbf kernel
        assert_abs_diff_eq!(kernel.covariance(&x, &x), base.covariance(&x, &x), epsilon = 1e-12);
        check_gradients(&kernel, &x);
        let kernel = ProductStructureKernel::new(Matern32Kernel::<f64>::new(array![0.5]).unwrap());
        check_gradients(&kernel, &x);
    }

    #[test]
    fn test_linear_kernel() {
        let x = random_x(6, 2);
        let mut kernel = LinearKernel::<f64>::new(2);
        kernel
            .set_hyperparameters(&array![0.3, 0.1, -0.2].view())
            .unwrap();
        check_gradients(&kernel, &x);
        let dense = kernel.covariance(&x, &x);
        assert_abs_diff_eq!(kernel.diag(&x), dense.diag(), epsilon = 1e-12);
        assert_abs_diff_eq!(kernel.lazy_covariance(&x, &x).to_dense(), dense, epsilon = 1e-12);
        let x2 = random_x(3, 2) * 2.;
        assert_abs_diff_eq!(
            kernel.lazy_covariance(&x, &x2).to_dense(),
            kernel.covariance(&x, &x2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_multitask_kernel() {
        let x1 = random_x(4, 2);
        let x2 = random_x(3, 2);
        let task = IndexKernel::new(2, 1)
            .with_covar_factor(array![[1.], [0.5]])
            .unwrap();
        let b = task.covariance_matrix();
        assert_abs_diff_eq!(b, array![[2., 0.5], [0.5, 1.25]], epsilon = 1e-12);
        let kernel = MultitaskKernel::new(RbfKernel::<f64>::default(), 2, 1).with_task_covar(task);
        let k = kernel.data_covar().covariance(&x1, &x2);
        let mk = kernel.covariance(&x1, &x2);
        assert_eq!(mk.dim(), kernel.size(4, 3));
        assert_abs_diff_eq!(mk, ndarray::linalg::kron(&b, &k), epsilon = 1e-12);
        let v = Array::linspace(0., 1., 6);
        assert_abs_diff_eq!(
            kernel.covariance_operator(&x1, &x2).matvec(&v.view()),
            mk.dot(&v),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_index_kernel_hyperparameters() {
        let mut task = IndexKernel::<f64>::new(2, 2);
        assert_abs_diff_eq!(task.covariance_matrix(), Array2::eye(2));
        task.set_hyperparameters(&array![1., 0., 0., 1., 0., 0.].view())
            .unwrap();
        assert_abs_diff_eq!(task.covariance_matrix(), Array2::eye(2) * 2.);
        assert_eq!(task.hyperparameters().len(), 6);
        assert!(task.set_hyperparameters(&array![1.].view()).is_err());
    }
}
