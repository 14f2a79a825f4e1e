//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! with hyperparameters trained by gradient descent on the marginal likelihood.
//!
//! Exact inference is implemented by [GaussianProcess] parameterized by [GpParams]. Its complexity
//! is O(N^3) in processing time and O(N^2) in memory where N is the number of training points.
//!
//! Structured Kernel Interpolation for Products (SKIP) is implemented by [SkipGaussianProcess]
//! parameterized by [SkipParams]. Product kernels are interpolated dimension-wise on regular grids
//! and compressed into a low rank root decomposition with Lanczos iterations, reducing
//! complexity to O(N.K^2) where K is the maximal root rank.
//!
//! Building blocks are exposed as modules:
//! * [kernels] and [mean_models] define the prior,
//! * [likelihood] the gaussian observation model,
//! * [lazy], [interpolation], [lanczos] and [skip] the structured linear algebra,
//! * [metrics] the evaluation of trained models.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
pub mod interpolation;
pub mod kernels;
pub mod lanczos;
pub mod lazy;
pub mod likelihood;
pub mod mean_models;
pub mod metrics;
pub mod skip;
mod skip_algorithm;

mod parameters;
mod skip_parameters;
mod utils;

mod optimization;

pub use algorithm::*;
pub use errors::*;
pub use optimization::{Adam, AdamParams};
pub use parameters::*;
pub use skip_algorithm::*;
pub use skip_parameters::*;
pub use utils::{inv_softplus, sigmoid, softplus};
