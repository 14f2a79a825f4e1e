//! Regression datasets for Gaussian Process experiments.
//!
//! * [fetch_cached] retrieves a dataset file, downloading it only when absent,
//! * [load_matrix] reads a numeric matrix from delimited text or `.npy` files,
//! * [TabularData] holds features and targets, normalizes features to [-1, 1]
//!   and splits samples into `linfa` train and test datasets,
//! * [synthetic] generates reproducible data from an additive test function.
#![warn(missing_docs)]
mod dataset;
mod download;
mod errors;
mod loader;
mod synthetic;

pub use dataset::*;
pub use download::*;
pub use errors::*;
pub use loader::*;
pub use synthetic::*;
