use linfa::Float;
use ndarray::{Array1, ArrayBase, Axis, Data, Ix2};

/// Softplus transform mapping an unconstrained raw value to a positive value
pub fn softplus<F: Float>(raw: F) -> F {
    // log(1 + exp(x)) written to stay finite for large x
    if raw > F::cast(20.) {
        raw + (-raw).exp().ln_1p()
    } else {
        raw.exp().ln_1p()
    }
}

/// Inverse of the softplus transform, `value` has to be positive
pub fn inv_softplus<F: Float>(value: F) -> F {
    value + (-(-value).exp()).ln_1p()
}

/// Derivative of softplus wrt its raw argument
pub fn sigmoid<F: Float>(raw: F) -> F {
    F::one() / (F::one() + (-raw).exp())
}

#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

/// Column-wise (min, max) bounds of a (n, nx) matrix
pub fn column_bounds<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<(F, F)> {
    x.axis_iter(Axis(1))
        .map(|col| {
            col.iter().fold((F::infinity(), F::neg_infinity()), |(lo, up), &v| {
                (lo.min(v), up.max(v))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_softplus_roundtrip() {
        for v in [1e-4, 0.1, 0.693, 3., 50.] {
            assert_abs_diff_eq!(softplus(inv_softplus(v)), v, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(softplus(0.), std::f64::consts::LN_2, epsilon = 1e-12);
        assert_abs_diff_eq!(softplus(100.), 100., epsilon = 1e-12);
    }

    #[test]
    fn test_sigmoid_is_softplus_derivative() {
        let e = 1e-6;
        for raw in [-3., 0., 0.5, 4.] {
            let fd = (softplus(raw + e) - softplus(raw - e)) / (2. * e);
            assert_abs_diff_eq!(sigmoid(raw), fd, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_column_bounds() {
        let x = array![[1., -2.], [3., 4.], [0., 1.]];
        let bounds = column_bounds(&x);
        assert_eq!(bounds[0], (0., 3.));
        assert_eq!(bounds[1], (-2., 4.));
    }
}
