//! Gaussian observation model `y = f(x) + e` with `e ~ N(0, sigma2)`

use crate::errors::{GpError, Result};
use crate::kernels::check_length;
use crate::utils::{inv_softplus, sigmoid, softplus};
use linfa::Float;
use ndarray::{Array1, ArrayView1};
use std::fmt;

/// Lower bound added to the noise variance
pub const NOISE_FLOOR: f64 = 1e-4;

/// Homoskedastic gaussian likelihood with noise variance `softplus(raw) + noise_floor`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianLikelihood<F: Float> {
    raw_noise: F,
    noise_floor: F,
}

impl<F: Float> Default for GaussianLikelihood<F> {
    fn default() -> Self {
        GaussianLikelihood {
            raw_noise: F::zero(),
            noise_floor: F::cast(NOISE_FLOOR),
        }
    }
}

impl<F: Float> GaussianLikelihood<F> {
    /// Likelihood with given initial noise variance, has to be greater than the noise floor
    pub fn new(noise: F) -> Result<Self> {
        Self::default().with_noise(noise)
    }

    /// Set the initial noise variance
    pub fn with_noise(mut self, noise: F) -> Result<Self> {
        if !(noise > self.noise_floor) {
            return Err(GpError::InvalidValueError(format!(
                "Noise variance should be greater than {}, got {noise}",
                self.noise_floor
            )));
        }
        self.raw_noise = inv_softplus(noise - self.noise_floor);
        Ok(self)
    }

    /// Set the noise floor
    pub fn with_noise_floor(mut self, noise_floor: F) -> Result<Self> {
        if noise_floor < F::zero() {
            return Err(GpError::InvalidValueError(format!(
                "Noise floor should be positive, got {noise_floor}"
            )));
        }
        self.noise_floor = noise_floor;
        Ok(self)
    }

    /// Noise variance
    pub fn noise(&self) -> F {
        softplus(self.raw_noise) + self.noise_floor
    }

    /// Derivative of the noise variance wrt its raw value
    pub fn noise_gradient(&self) -> F {
        sigmoid(self.raw_noise)
    }

    /// Raw hyperparameters (noise only)
    pub fn hyperparameters(&self) -> Array1<F> {
        Array1::from_elem(1, self.raw_noise)
    }

    /// Set the raw noise value
    pub fn set_hyperparameters(&mut self, raw: &ArrayView1<F>) -> Result<()> {
        check_length(1, raw.len(), "likelihood")?;
        self.raw_noise = raw[0];
        Ok(())
    }
}

impl<F: Float> fmt::Display for GaussianLikelihood<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Gaussian(noise={})", self.noise())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_noise() {
        let lik = GaussianLikelihood::<f64>::default();
        assert_abs_diff_eq!(lik.noise(), std::f64::consts::LN_2 + 1e-4, epsilon = 1e-12);
        assert_abs_diff_eq!(lik.noise_gradient(), 0.5);
    }

    #[test]
    fn test_noise_init() {
        let lik = GaussianLikelihood::<f64>::new(0.3).unwrap();
        assert_abs_diff_eq!(lik.noise(), 0.3, epsilon = 1e-12);
        assert!(GaussianLikelihood::<f64>::new(1e-5).is_err());
        let lik = GaussianLikelihood::<f64>::default()
            .with_noise_floor(0.)
            .unwrap()
            .with_noise(1e-5)
            .unwrap();
        assert_abs_diff_eq!(lik.noise(), 1e-5, epsilon = 1e-12);
    }
}
