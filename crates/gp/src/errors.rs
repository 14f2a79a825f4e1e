use thiserror::Error;

/// A result type for GP regression algorithm
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`GaussianProcess`](crate::GaussianProcess) or a [`SkipGaussianProcess`](crate::SkipGaussianProcess) algorithm
#[derive(Error, Debug)]
pub enum GpError {
    /// When likelihood computation fails (non finite loss, ill conditioned matrices)
    #[error("LikelihoodComputation computation error: {0}")]
    LikelihoodComputationError(String),
    #[error(transparent)]
    /// When linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When Lanczos iterations cannot produce a decomposition
    #[error("Lanczos error: {0}")]
    LanczosError(String),
    /// When an IO error occurs
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When error dur to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
