//! Gaussian Process regression on tabular datasets with Structured Kernel Interpolation
//! for Products (SKIP).
//!
//! The experiment pipeline fetches a dataset once (cached by file name), scales features
//! to [-1, 1], keeps the first 80% of the rows for training, trains the GP hyperparameters
//! with Adam on the negative marginal log likelihood and reports the mean absolute error
//! on the remaining rows.
//!
//! ```no_run
//! use skipgp::{ExperimentConfig, run};
//!
//! // downloads `elevators.mat` on first run
//! let config = ExperimentConfig::default();
//! let report = run(&config).expect("Experiment run");
//! println!("Test MAE: {}", report.mae);
//! ```
//!
//! Models and data handling live in the [skipgp_gp] and [skipgp_data] crates,
//! re-exported as [gp] and [data].
#![warn(missing_docs)]
pub mod config;
pub mod experiment;

pub use config::*;
pub use experiment::*;

pub use skipgp_data as data;
pub use skipgp_gp as gp;
