use crate::errors::{DataError, Result};
use linfa::Dataset;
use log::{info, warn};
use ndarray::{Array1, Array2, Axis, Ix1, s};
use ndarray_stats::QuantileExt;

/// Default fraction of rows used for training
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Regression data: features `x` (n, nx) and scalar targets `y` (n,)
#[derive(Clone, Debug, PartialEq)]
pub struct TabularData {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl TabularData {
    /// Data from features and targets, sizes have to match
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(DataError::Shape(format!(
                "{} feature rows for {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(DataError::Empty("no sample or no feature".to_string()));
        }
        Ok(TabularData { x, y })
    }

    /// Data from a matrix whose last column is the target
    pub fn from_matrix(matrix: Array2<f64>) -> Result<Self> {
        if matrix.ncols() < 2 {
            return Err(DataError::Shape(format!(
                "Expected at least 2 columns (features and target), got {}",
                matrix.ncols()
            )));
        }
        let nx = matrix.ncols() - 1;
        let x = matrix.slice(s![.., ..nx]).to_owned();
        let y = matrix.column(nx).to_owned();
        Self::new(x, y)
    }

    /// Features
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Targets
    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    /// Number of samples
    pub fn nsamples(&self) -> usize {
        self.x.nrows()
    }

    /// Number of features
    pub fn nfeatures(&self) -> usize {
        self.x.ncols()
    }

    /// Scale each feature column to [-1, 1] with `2 (x - min) / (max - min) - 1`.
    ///
    /// Constant columns are set to 0. Targets are left untouched.
    pub fn normalize_features(mut self) -> Self {
        for (j, mut col) in self.x.axis_iter_mut(Axis(1)).enumerate() {
            let min = *col.min_skipnan();
            let max = *col.max_skipnan();
            let range = max - min;
            if range > 0. {
                col.mapv_inplace(|v| 2. * (v - min) / range - 1.);
            } else {
                warn!("Feature {j} is constant ({min}), set to 0");
                col.fill(0.);
            }
        }
        self
    }

    /// Ordered split: the first `floor(train_fraction * n)` rows are used for training,
    /// the remaining ones for testing.
    pub fn split(
        &self,
        train_fraction: f64,
    ) -> Result<(Dataset<f64, f64, Ix1>, Dataset<f64, f64, Ix1>)> {
        if !(train_fraction > 0. && train_fraction < 1.) {
            return Err(DataError::Shape(format!(
                "Train fraction should be in (0, 1), got {train_fraction}"
            )));
        }
        let n = self.nsamples();
        let n_train = (train_fraction * n as f64).floor() as usize;
        if n_train == 0 || n_train == n {
            return Err(DataError::Shape(format!(
                "Split of {n} samples with fraction {train_fraction} leaves an empty set"
            )));
        }
        info!("Split {n} samples into {n_train} training and {} test samples", n - n_train);
        let train = Dataset::new(
            self.x.slice(s![..n_train, ..]).to_owned(),
            self.y.slice(s![..n_train]).to_owned(),
        );
        let test = Dataset::new(
            self.x.slice(s![n_train.., ..]).to_owned(),
            self.y.slice(s![n_train..]).to_owned(),
        );
        Ok((train, test))
    }
}
