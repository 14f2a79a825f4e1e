//! Experiment configuration.
//!
//! An [ExperimentConfig] is read from a JSON file, any missing field takes its default value.
//! Defaults reproduce the reference experiment: SKIP GP with an RBF base kernel
//! trained on 80% of the `elevators` dataset.
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use skipgp_data::{DEFAULT_TRAIN_FRACTION, Delimiter};
use skipgp_gp::{SKIP_DEFAULT_LEARNING_RATE, SKIP_DEFAULT_MAX_ROOT_RANK, SKIP_DEFAULT_N_ITER};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default cached dataset path
pub const DEFAULT_DATA_PATH: &str = "elevators.mat";
/// Download url of the `elevators` dataset: a MATLAB level 5 file whose `data`
/// variable is a 16599 x 19 matrix, the last column being the target
pub const DEFAULT_DATA_URL: &str =
    "https://drive.google.com/uc?export=download&id=1jhWL3YUHvXIaftia4qeAyDwVxo6j1alk";
/// Default number of grid points per input dimension
pub const DEFAULT_GRID_SIZE: usize = 100;

/// GP inference method
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inference {
    /// Structured kernel interpolation for products, scales to large datasets
    #[default]
    Skip,
    /// Dense Cholesky based inference
    Exact,
}

/// Base kernel of the product structure
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelSpec {
    /// Squared exponential
    #[default]
    Rbf,
    /// Matern 3/2
    Matern32,
    /// Matern 5/2
    Matern52,
    /// Linear (dot product), exact inference only
    Linear,
}

macro_rules! impl_choice {
    ($type:ty, $what:expr, $($name:literal => $value:path),+) => {
        impl FromStr for $type {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_lowercase().as_str() {
                    $($name => Ok($value),)+
                    _ => bail!("Unknown {} '{}'", $what, s),
                }
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                let name = match self {
                    $($value => $name,)+
                };
                write!(f, "{name}")
            }
        }
    };
}

impl_choice!(Inference, "inference", "skip" => Inference::Skip, "exact" => Inference::Exact);
impl_choice!(
    KernelSpec,
    "kernel",
    "rbf" => KernelSpec::Rbf,
    "matern32" => KernelSpec::Matern32,
    "matern52" => KernelSpec::Matern52,
    "linear" => KernelSpec::Linear
);

/// Dataset source and preparation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Local dataset file, `.mat`, `.npy` or delimited text whose last column is the target
    pub path: PathBuf,
    /// Url to download the dataset from when `path` does not exist, the downloaded
    /// file is read according to the `path` extension
    pub url: Option<String>,
    /// Fraction of the first rows used for training
    pub train_fraction: f64,
    /// Field separator of text files: comma, semicolon, tab or whitespace
    pub delimiter: String,
    /// Number of synthetic samples to generate instead of reading `path`
    pub synthetic: Option<usize>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            path: PathBuf::from(DEFAULT_DATA_PATH),
            url: Some(DEFAULT_DATA_URL.to_string()),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            delimiter: "comma".to_string(),
            synthetic: None,
        }
    }
}

/// GP model structure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Inference method
    pub inference: Inference,
    /// Base kernel
    pub kernel: KernelSpec,
    /// Grid points per dimension (SKIP)
    pub grid_size: usize,
    /// Maximal rank of the kernel root decomposition (SKIP)
    pub max_root_rank: usize,
    /// Only use the first `max_train` training samples
    pub max_train: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            inference: Inference::Skip,
            kernel: KernelSpec::Rbf,
            grid_size: DEFAULT_GRID_SIZE,
            max_root_rank: SKIP_DEFAULT_MAX_ROOT_RANK,
            max_train: None,
        }
    }
}

/// Hyperparameters training
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of Adam iterations
    pub n_iter: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Seed of Lanczos probe vectors and synthetic data
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            n_iter: SKIP_DEFAULT_N_ITER,
            learning_rate: SKIP_DEFAULT_LEARNING_RATE,
            seed: 0,
        }
    }
}

/// Reporting options
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// JSON file where the experiment report is written
    pub output: Option<PathBuf>,
}

/// Full experiment configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dataset
    pub data: DataConfig,
    /// Model
    pub model: ModelConfig,
    /// Training
    pub training: TrainingConfig,
    /// Report
    pub report: ReportConfig,
}

impl ExperimentConfig {
    /// Read a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config: ExperimentConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Parsed text delimiter
    pub fn delimiter(&self) -> Result<Delimiter> {
        Ok(self.data.delimiter.parse()?)
    }

    /// Check option consistency
    pub fn validate(&self) -> Result<()> {
        if !(self.data.train_fraction > 0. && self.data.train_fraction < 1.) {
            bail!(
                "Train fraction should be in (0, 1), got {}",
                self.data.train_fraction
            );
        }
        self.delimiter()?;
        if self.model.inference == Inference::Skip && self.model.kernel == KernelSpec::Linear {
            bail!("Linear kernel is not a grid kernel, use exact inference");
        }
        if self.model.max_train == Some(0) {
            bail!("max_train should be positive");
        }
        if self.data.synthetic == Some(0) {
            bail!("synthetic sample number should be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExperimentConfig::default();
        assert_eq!(config.data.path, PathBuf::from("elevators.mat"));
        assert_eq!(config.data.train_fraction, 0.8);
        assert_eq!(config.model.inference, Inference::Skip);
        assert_eq!(config.model.kernel, KernelSpec::Rbf);
        assert_eq!(config.model.grid_size, 100);
        assert_eq!(config.model.max_root_rank, 30);
        assert_eq!(config.training.n_iter, 25);
        assert_eq!(config.training.learning_rate, 0.01);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_data_source() {
        let data = DataConfig::default();
        let url = data.url.as_deref().unwrap();
        assert!(url.starts_with("https://"));
        assert_eq!(url, DEFAULT_DATA_URL);
        // the downloaded file is read from the cached path extension
        assert_eq!(data.path.extension().unwrap(), "mat");

        let data: DataConfig = serde_json::from_str(r#"{"url": null}"#).unwrap();
        assert!(data.url.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config: ExperimentConfig = serde_json::from_str(
            r#"{"model": {"inference": "exact", "kernel": "matern52"}, "training": {"n_iter": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.model.inference, Inference::Exact);
        assert_eq!(config.model.kernel, KernelSpec::Matern52);
        assert_eq!(config.model.grid_size, 100);
        assert_eq!(config.training.n_iter, 5);
        assert_eq!(config.training.learning_rate, 0.01);
        assert_eq!(config.data, DataConfig::default());
    }

    #[test]
    fn test_json_roundtrip_file() {
        let dir = PathBuf::from("target/tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("experiment.json");
        let mut config = ExperimentConfig::default();
        config.data.synthetic = Some(100);
        config.model.kernel = KernelSpec::Matern32;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(ExperimentConfig::from_file(&path).unwrap(), config);
        assert!(ExperimentConfig::from_file(dir.join("missing.json")).is_err());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = ExperimentConfig::default();
        config.model.kernel = KernelSpec::Linear;
        assert!(config.validate().is_err());
        config.model.inference = Inference::Exact;
        assert!(config.validate().is_ok());

        let mut config = ExperimentConfig::default();
        config.data.train_fraction = 1.;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.data.delimiter = "|".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_choices_from_str() {
        assert_eq!("EXACT".parse::<Inference>().unwrap(), Inference::Exact);
        assert_eq!("matern32".parse::<KernelSpec>().unwrap(), KernelSpec::Matern32);
        assert_eq!(KernelSpec::Matern52.to_string(), "matern52");
        assert!("cubic".parse::<KernelSpec>().is_err());
    }
}
