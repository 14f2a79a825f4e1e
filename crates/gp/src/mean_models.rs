//! A module for mean models of the GP model.
//!
//! The following models are implemented:
//! * zero,
//! * constant,
//! * linear (affine)

use crate::errors::Result;
use crate::kernels::check_length;
use linfa::Float;
use ndarray::{Array1, ArrayBase, ArrayView1, Data, Ix2, s};
use std::fmt;

/// A trait for mean models used in GP regression
pub trait MeanModel<F: Float>: Clone + fmt::Display + Send + Sync {
    /// Raw hyperparameters of the mean model
    fn hyperparameters(&self) -> Array1<F>;

    /// Set raw hyperparameters, length has to match [MeanModel::n_hyperparameters]
    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()>;

    /// Number of raw hyperparameters
    fn n_hyperparameters(&self) -> usize {
        self.hyperparameters().len()
    }

    /// Check the model can handle inputs of dimension `nx`
    fn check_dim(&self, _nx: usize) -> Result<()> {
        Ok(())
    }

    /// Mean values at the given `x` data points specified as (n, nx) matrix.
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F>;

    /// Derivatives of mean values wrt each raw hyperparameter
    fn gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>>;
}

/// A zero function as mean of the GP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ZeroMean();

impl<F: Float> MeanModel<F> for ZeroMean {
    fn hyperparameters(&self) -> Array1<F> {
        Array1::zeros(0)
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(0, raw.len(), "zero mean")
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }

    fn gradients(&self, _x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>> {
        vec![]
    }
}

impl fmt::Display for ZeroMean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ZeroMean")
    }
}

/// A constant function as mean of the GP, the constant is learnt
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ConstantMean<F: Float> {
    constant: F,
}

impl<F: Float> ConstantMean<F> {
    /// Constant mean initialized with given value
    pub fn new(constant: F) -> Self {
        ConstantMean { constant }
    }

    /// Constant value
    pub fn constant(&self) -> F {
        self.constant
    }
}

impl<F: Float> MeanModel<F> for ConstantMean<F> {
    fn hyperparameters(&self) -> Array1<F> {
        Array1::from_elem(1, self.constant)
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(1, raw.len(), "constant mean")?;
        self.constant = raw[0];
        Ok(())
    }

    fn n_hyperparameters(&self) -> usize {
        1
    }

    /// m(x) = c
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.constant)
    }

    /// dm/dc = [1, ..., 1]
    fn gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>> {
        vec![Array1::ones(x.nrows())]
    }
}

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConstantMean(constant={})", self.constant)
    }
}

/// An affine function as mean of the GP
#[derive(Clone, Debug, PartialEq)]
pub struct LinearMean<F: Float> {
    weights: Array1<F>,
    bias: F,
}

impl<F: Float> LinearMean<F> {
    /// Linear mean for inputs of dimension `nx`, weights and bias initialized to 0
    pub fn new(nx: usize) -> Self {
        LinearMean {
            weights: Array1::zeros(nx),
            bias: F::zero(),
        }
    }

    /// Weights
    pub fn weights(&self) -> &Array1<F> {
        &self.weights
    }

    /// Bias
    pub fn bias(&self) -> F {
        self.bias
    }
}

impl<F: Float> MeanModel<F> for LinearMean<F> {
    fn hyperparameters(&self) -> Array1<F> {
        self.weights
            .iter()
            .cloned()
            .chain(std::iter::once(self.bias))
            .collect()
    }

    fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        let nx = self.weights.len();
        check_length(nx + 1, raw.len(), "linear mean")?;
        self.weights.assign(&raw.slice(s![..nx]));
        self.bias = raw[nx];
        Ok(())
    }

    fn check_dim(&self, nx: usize) -> Result<()> {
        check_length(self.weights.len() + 1, nx + 1, "linear mean")
    }

    /// m(x) = w^T x + b
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        x.dot(&self.weights) + self.bias
    }

    /// dm/dw_j = x_j, dm/db = 1
    fn gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>> {
        x.columns()
            .into_iter()
            .map(|c| c.to_owned())
            .chain(std::iter::once(Array1::ones(x.nrows())))
            .collect()
    }
}

impl<F: Float> fmt::Display for LinearMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LinearMean(weights={}, bias={})", self.weights, self.bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_constant() {
        let x = array![[1., 2.], [3., 4.], [5., 6.]];
        let mut mean = ConstantMean::new(0.);
        mean.set_hyperparameters(&array![2.5].view()).unwrap();
        assert_abs_diff_eq!(mean.value(&x), array![2.5, 2.5, 2.5]);
        assert_abs_diff_eq!(mean.gradients(&x)[0], array![1., 1., 1.]);
        assert!(mean.set_hyperparameters(&array![1., 2.].view()).is_err());
    }

    #[test]
    fn test_linear() {
        let x = array![[1., 2.], [3., 4.]];
        let mut mean = LinearMean::new(2);
        mean.set_hyperparameters(&array![1., -1., 0.5].view())
            .unwrap();
        assert_abs_diff_eq!(mean.value(&x), array![-0.5, -0.5]);
        let grads = mean.gradients(&x);
        assert_eq!(grads.len(), 3);
        assert_abs_diff_eq!(grads[1], array![2., 4.]);
        assert_abs_diff_eq!(grads[2], array![1., 1.]);
        assert!(mean.check_dim(3).is_err());
    }

    #[test]
    fn test_zero() {
        let x = array![[1.], [2.]];
        assert_abs_diff_eq!(MeanModel::<f64>::value(&ZeroMean(), &x), array![0., 0.]);
        assert_eq!(MeanModel::<f64>::n_hyperparameters(&ZeroMean()), 0);
    }

    #[test]
    fn test_utils() {
        assert_eq!("ZeroMean", ZeroMean().to_string());
        assert_eq!("ConstantMean(constant=1)", ConstantMean::new(1.).to_string());
    }
}
