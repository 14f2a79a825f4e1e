//! Lanczos tridiagonalization and root decompositions of symmetric positive
//! semi-definite [LinearOperator]s.

use crate::errors::{GpError, Result};
use crate::lazy::LinearOperator;
use linfa::Float;
use linfa_linalg::eigh::*;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, s};

/// Relative tolerance on the off-diagonal term stopping Lanczos iterations
pub const LANCZOS_TOLERANCE: f64 = 1e-10;

/// Result of a Lanczos tridiagonalization `A Q ≈ Q T`
#[derive(Clone, Debug)]
pub struct LanczosDecomposition<F: Float> {
    /// Orthonormal basis (n, k)
    pub q: Array2<F>,
    /// Diagonal of T (k,)
    pub alpha: Array1<F>,
    /// Off diagonal of T (k-1,)
    pub beta: Array1<F>,
}

impl<F: Float> LanczosDecomposition<F> {
    /// Number of Lanczos vectors
    pub fn rank(&self) -> usize {
        self.alpha.len()
    }

    /// Dense (k, k) tridiagonal matrix
    pub fn tridiagonal(&self) -> Array2<F> {
        let k = self.rank();
        let mut t = Array2::from_diag(&self.alpha);
        for i in 0..k.saturating_sub(1) {
            t[[i, i + 1]] = self.beta[i];
            t[[i + 1, i]] = self.beta[i];
        }
        t
    }
}

/// Lanczos iterations with full re-orthogonalization starting from `init`.
///
/// At most `max_iter` vectors are generated (bounded by the operator size). Iterations stop
/// early when the new off-diagonal term falls below `tol` relative to the largest diagonal term.
pub fn lanczos_tridiag<F: Float>(
    op: &dyn LinearOperator<F>,
    init: &ArrayView1<F>,
    max_iter: usize,
    tol: F,
) -> Result<LanczosDecomposition<F>> {
    let (n, nc) = op.shape();
    if n != nc {
        return Err(GpError::LanczosError(format!(
            "Operator should be square, got ({n}, {nc})"
        )));
    }
    if init.len() != n {
        return Err(GpError::LanczosError(format!(
            "Initial vector size {} does not match operator size {n}",
            init.len()
        )));
    }
    let k_max = max_iter.min(n);
    if k_max == 0 {
        return Err(GpError::LanczosError("No Lanczos iteration requested".to_string()));
    }
    let norm = init.dot(init).sqrt();
    if !(norm > F::zero()) || !norm.is_finite() {
        return Err(GpError::LanczosError(
            "Initial vector should be non zero and finite".to_string(),
        ));
    }

    let mut q_mat = Array2::zeros((n, k_max));
    let mut q = init.mapv(|v| v / norm);
    let mut alpha = Vec::with_capacity(k_max);
    let mut beta = Vec::with_capacity(k_max);
    let mut scale = F::zero();
    for j in 0..k_max {
        q_mat.column_mut(j).assign(&q);
        let mut w = op.matvec(&q.view());
        let a = q.dot(&w);
        scale = scale.max(a.abs());
        alpha.push(a);

        // twice is enough
        for _ in 0..2 {
            let basis = q_mat.slice(s![.., ..=j]);
            let coefs = basis.t().dot(&w);
            w = w - basis.dot(&coefs);
        }
        if j + 1 == k_max {
            break;
        }
        let b = w.dot(&w).sqrt();
        if b <= tol * scale || !b.is_finite() {
            debug!("Lanczos breakdown at iteration {} (beta={})", j + 1, b);
            break;
        }
        beta.push(b);
        q = w.mapv(|v| v / b);
    }

    let k = alpha.len();
    Ok(LanczosDecomposition {
        q: q_mat.slice(s![.., ..k]).to_owned(),
        alpha: Array1::from(alpha),
        beta: Array1::from(beta),
    })
}

/// Root decomposition `op ≈ R R^T` with `R` of at most `rank` columns computed as
/// `Q V sqrt(max(Λ, 0))` where `T = V Λ V^T` is the Lanczos tridiagonal matrix.
pub fn root_decomposition<F: Float>(
    op: &dyn LinearOperator<F>,
    rank: usize,
    init: &ArrayView1<F>,
) -> Result<Array2<F>> {
    let lanczos = lanczos_tridiag(op, init, rank, F::cast(LANCZOS_TOLERANCE))?;
    let (eigvals, eigvecs) = lanczos.tridiagonal().eigh_into()?;
    let sqrt_eigvals = eigvals.mapv(|v| if v > F::zero() { v.sqrt() } else { F::zero() });
    Ok(lanczos.q.dot(&(eigvecs * &sqrt_eigvals)))
}
