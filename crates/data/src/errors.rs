use std::path::PathBuf;
use thiserror::Error;

/// A result type for dataset handling
pub type Result<T> = std::result::Result<T, DataError>;

/// An error when fetching, loading or preparing a dataset
#[derive(Error, Debug)]
pub enum DataError {
    /// When an IO error occurs
    #[error("IO error")]
    Io(#[from] std::io::Error),
    /// When the download fails (connection, non success status)
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// When delimited text cannot be read
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// When a .npy file cannot be read
    #[error(transparent)]
    Npy(#[from] ndarray_npy::ReadNpyError),
    /// When a .mat file cannot be read
    #[error("MAT file error: {0}")]
    Mat(String),
    /// When a cell is not a number or rows are ragged
    #[error("Parse error: {0}")]
    Parse(String),
    /// When array sizes are not consistent
    #[error("Shape error: {0}")]
    Shape(String),
    /// When the dataset is not cached and no url is given
    #[error("No dataset at {} and no url to download it from", .0.display())]
    MissingSource(PathBuf),
    /// When there is no data
    #[error("Empty dataset: {0}")]
    Empty(String),
}
