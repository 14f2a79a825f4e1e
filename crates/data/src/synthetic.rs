use crate::dataset::TabularData;
use crate::errors::{DataError, Result};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{Normal, Uniform};
use rand_xoshiro::Xoshiro256Plus;
use std::f64::consts::PI;

/// Additive test function `sum_j sin(pi x_j) + 0.5 cos(2 pi x_j) / (j + 1)`
pub fn additive_function(x: &Array2<f64>) -> Array1<f64> {
    x.map_axis(Axis(1), |row| {
        row.iter()
            .enumerate()
            .map(|(j, &v)| (PI * v).sin() + 0.5 * (2. * PI * v).cos() / (j + 1) as f64)
            .sum()
    })
}

/// Generate `n` samples of [additive_function] of `dim` inputs uniformly drawn in [-1, 1]
/// with gaussian observation noise of standard deviation `noise_std`
pub fn synthetic(n: usize, dim: usize, noise_std: f64, seed: u64) -> Result<TabularData> {
    if n == 0 || dim == 0 {
        return Err(DataError::Empty(format!(
            "synthetic data of {n} samples in dimension {dim}"
        )));
    }
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let x = Array2::random_using((n, dim), Uniform::new(-1., 1.), &mut rng);
    let mut y = additive_function(&x);
    if noise_std > 0. {
        let normal = Normal::new(0., noise_std).map_err(|e| DataError::Parse(e.to_string()))?;
        y += &Array1::random_using(n, normal, &mut rng);
    } else if noise_std < 0. || noise_std.is_nan() {
        return Err(DataError::Parse(format!(
            "Noise standard deviation should be positive, got {noise_std}"
        )));
    }
    TabularData::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_additive_function() {
        let x = array![[0., 0.], [0.5, -1.]];
        // 0.5 + 0.25
        assert_abs_diff_eq!(additive_function(&x)[0], 0.75, epsilon = 1e-12);
        // 1 - 0.5 + 0 - 0.25
        assert_abs_diff_eq!(additive_function(&x)[1], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_synthetic() {
        let data = synthetic(200, 3, 0.1, 0).unwrap();
        assert_eq!(data.nsamples(), 200);
        assert_eq!(data.nfeatures(), 3);
        assert!(data.x().iter().all(|v| (-1. ..=1.).contains(v)));
        assert_eq!(data, synthetic(200, 3, 0.1, 0).unwrap());
        assert_ne!(data, synthetic(200, 3, 0.1, 1).unwrap());

        let exact = synthetic(50, 2, 0., 3).unwrap();
        assert_abs_diff_eq!(exact.y(), &additive_function(exact.x()), epsilon = 1e-12);
        assert!(synthetic(0, 2, 0., 0).is_err());
        assert!(synthetic(10, 2, -1., 0).is_err());
    }
}
