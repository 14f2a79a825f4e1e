use crate::errors::{GpError, Result};
use crate::utils::into_f64;
use linfa::Float;
use log::{debug, info};
use ndarray::{Array1, ArrayView1, Zip};
use std::time::Instant;

/// Adam first moment decay rate
pub const ADAM_BETA1: f64 = 0.9;
/// Adam second moment decay rate
pub const ADAM_BETA2: f64 = 0.999;
/// Adam denominator regularization
pub const ADAM_EPSILON: f64 = 1e-8;

/// Adam optimizer settings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdamParams<F: Float> {
    /// Step size
    pub learning_rate: F,
    /// First moment decay rate
    pub beta1: F,
    /// Second moment decay rate
    pub beta2: F,
    /// Denominator regularization
    pub eps: F,
}

impl<F: Float> AdamParams<F> {
    /// Default decay rates with the given learning rate
    pub fn new(learning_rate: F) -> Self {
        AdamParams {
            learning_rate,
            beta1: F::cast(ADAM_BETA1),
            beta2: F::cast(ADAM_BETA2),
            eps: F::cast(ADAM_EPSILON),
        }
    }
}

/// Adam stochastic gradient descent state
#[derive(Clone, Debug)]
pub struct Adam<F: Float> {
    params: AdamParams<F>,
    m: Array1<F>,
    v: Array1<F>,
    t: i32,
}

impl<F: Float> Adam<F> {
    /// Optimizer over `dim` parameters
    pub fn new(params: AdamParams<F>, dim: usize) -> Self {
        Adam {
            params,
            m: Array1::zeros(dim),
            v: Array1::zeros(dim),
            t: 0,
        }
    }

    /// Update `x` in place with a descent step along `grad`
    pub fn step(&mut self, x: &mut Array1<F>, grad: &ArrayView1<F>) {
        let AdamParams {
            learning_rate,
            beta1,
            beta2,
            eps,
        } = self.params;
        self.t += 1;
        let bias1 = F::one() - beta1.powi(self.t);
        let bias2 = F::one() - beta2.powi(self.t);
        Zip::from(x)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|xi, mi, vi, &gi| {
                *mi = beta1 * *mi + (F::one() - beta1) * gi;
                *vi = beta2 * *vi + (F::one() - beta2) * gi * gi;
                let m_hat = *mi / bias1;
                let v_hat = *vi / bias2;
                *xi -= learning_rate * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

/// Minimize `objective` starting from `x0` with a fixed number of Adam iterations.
///
/// The objective returns the loss and its gradient. Returns the final parameters
/// and the loss history (loss evaluated before each step).
pub(crate) fn train<F, O>(
    x0: Array1<F>,
    n_iter: usize,
    adam: AdamParams<F>,
    mut objective: O,
) -> Result<(Array1<F>, Vec<F>)>
where
    F: Float,
    O: FnMut(&Array1<F>) -> Result<(F, Array1<F>)>,
{
    let mut x = x0;
    let mut optimizer = Adam::new(adam, x.len());
    let mut history = Vec::with_capacity(n_iter);
    for i in 0..n_iter {
        let now = Instant::now();
        let (loss, grad) = objective(&x)?;
        if !loss.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Err(GpError::LikelihoodComputationError(format!(
                "Non finite loss or gradient at iteration {}/{n_iter} (loss={loss})",
                i + 1
            )));
        }
        info!("Iter {}/{} - Loss: {:.3}", i + 1, n_iter, into_f64(loss));
        debug!("elapsed iteration = {:?} ms", now.elapsed().as_millis());
        history.push(loss);
        optimizer.step(&mut x, &grad.view());
    }
    Ok((x, history))
}
