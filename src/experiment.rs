//! Regression experiment: load, normalize, split, train, predict and score.
use crate::config::{DataConfig, ExperimentConfig, Inference, KernelSpec};
use anyhow::{Context, Result, bail};
use linfa::prelude::*;
use log::info;
use ndarray::{Array1, Array2, Ix1, s};
use serde::{Deserialize, Serialize};
use skipgp_data::{CsvOptions, TabularData, fetch_cached, load_matrix_with, synthetic};
use skipgp_gp::kernels::{
    GridKernel, Kernel, LinearKernel, Matern32Kernel, Matern52Kernel, ProductStructureKernel,
    RbfKernel, ScaleKernel,
};
use skipgp_gp::mean_models::ConstantMean;
use skipgp_gp::metrics::{mean_absolute_error, r2_score, root_mean_squared_error};
use skipgp_gp::{GpParams, SkipParams};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

/// Input dimension of generated data
pub const SYNTHETIC_DIM: usize = 4;
/// Observation noise standard deviation of generated data
pub const SYNTHETIC_NOISE_STD: f64 = 0.05;

type RegressionDataset = Dataset<f64, f64, Ix1>;

/// Outcome of an experiment run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Dataset description
    pub dataset: String,
    /// Inference method
    pub inference: Inference,
    /// Base kernel
    pub kernel: KernelSpec,
    /// Number of training samples
    pub n_train: usize,
    /// Number of test samples
    pub n_test: usize,
    /// Number of input features
    pub n_features: usize,
    /// Mean absolute error on the test set
    pub mae: f64,
    /// Root mean squared error on the test set
    pub rmse: f64,
    /// Coefficient of determination on the test set
    pub r2: f64,
    /// Training loss (negative marginal log likelihood per sample) before each step
    pub loss_history: Vec<f64>,
    /// Marginal log likelihood of the trained model
    pub mll: f64,
    /// Trained hyperparameters
    pub model: String,
    /// Total duration in seconds
    pub elapsed_secs: f64,
}

struct TrainedModel {
    predictions: Array1<f64>,
    loss_history: Vec<f64>,
    mll: f64,
    summary: String,
}

/// Load the dataset described by `config`, either generated or read from a file
/// downloaded once from `config.url`
pub fn load_data(config: &DataConfig, seed: u64) -> Result<TabularData> {
    if let Some(n) = config.synthetic {
        info!("Generate {n} synthetic samples in dimension {SYNTHETIC_DIM}");
        return Ok(synthetic(n, SYNTHETIC_DIM, SYNTHETIC_NOISE_STD, seed)?);
    }
    let path = fetch_cached(&config.path, config.url.as_deref())?;
    let options = CsvOptions {
        delimiter: config.delimiter.parse()?,
        header: None,
    };
    let matrix = load_matrix_with(&path, &options)
        .with_context(|| format!("Cannot load dataset {}", path.display()))?;
    let data = TabularData::from_matrix(matrix)?;
    info!(
        "Loaded {} samples with {} features from {}",
        data.nsamples(),
        data.nfeatures(),
        path.display()
    );
    Ok(data)
}

fn truncate(dataset: RegressionDataset, max_samples: Option<usize>) -> RegressionDataset {
    match max_samples {
        Some(n) if n < dataset.nsamples() => {
            info!("Use the first {n} of {} training samples", dataset.nsamples());
            Dataset::new(
                dataset.records().slice(s![..n, ..]).to_owned(),
                dataset.targets().slice(s![..n]).to_owned(),
            )
        }
        _ => dataset,
    }
}

fn train_skip<K: GridKernel<f64>>(
    base: K,
    config: &ExperimentConfig,
    train: &RegressionDataset,
    xtest: &Array2<f64>,
) -> Result<TrainedModel> {
    // features are scaled to [-1, 1] over the whole dataset, test points included
    let gp = SkipParams::new(ConstantMean::default(), base)
        .grid_size(config.model.grid_size)
        .grid_bounds(Some(vec![(-1., 1.); train.nfeatures()]))
        .max_root_rank(config.model.max_root_rank)
        .n_iter(config.training.n_iter)
        .learning_rate(config.training.learning_rate)
        .seed(config.training.seed)
        .fit(train)?;
    Ok(TrainedModel {
        predictions: gp.predict(xtest)?,
        loss_history: gp.loss_history().to_vec(),
        mll: gp.mll(),
        summary: gp.to_string(),
    })
}

fn train_exact<K: Kernel<f64>>(
    kernel: K,
    config: &ExperimentConfig,
    train: &RegressionDataset,
    xtest: &Array2<f64>,
) -> Result<TrainedModel> {
    let gp = GpParams::new(ConstantMean::default(), kernel)
        .n_iter(config.training.n_iter)
        .learning_rate(config.training.learning_rate)
        .fit(train)?;
    Ok(TrainedModel {
        predictions: gp.predict(xtest)?,
        loss_history: gp.loss_history().to_vec(),
        mll: gp.mll(),
        summary: gp.to_string(),
    })
}

fn train_model(
    config: &ExperimentConfig,
    train: &RegressionDataset,
    xtest: &Array2<f64>,
) -> Result<TrainedModel> {
    match (config.model.inference, config.model.kernel) {
        (Inference::Skip, KernelSpec::Rbf) => {
            train_skip(RbfKernel::<f64>::default(), config, train, xtest)
        }
        (Inference::Skip, KernelSpec::Matern32) => {
            train_skip(Matern32Kernel::<f64>::default(), config, train, xtest)
        }
        (Inference::Skip, KernelSpec::Matern52) => {
            train_skip(Matern52Kernel::<f64>::default(), config, train, xtest)
        }
        (Inference::Skip, KernelSpec::Linear) => {
            bail!("Linear kernel is not a grid kernel, use exact inference")
        }
        (Inference::Exact, KernelSpec::Rbf) => train_exact(
            ScaleKernel::new(ProductStructureKernel::new(RbfKernel::<f64>::default())),
            config,
            train,
            xtest,
        ),
        (Inference::Exact, KernelSpec::Matern32) => train_exact(
            ScaleKernel::new(ProductStructureKernel::new(Matern32Kernel::<f64>::default())),
            config,
            train,
            xtest,
        ),
        (Inference::Exact, KernelSpec::Matern52) => train_exact(
            ScaleKernel::new(ProductStructureKernel::new(Matern52Kernel::<f64>::default())),
            config,
            train,
            xtest,
        ),
        (Inference::Exact, KernelSpec::Linear) => train_exact(
            LinearKernel::<f64>::new(train.nfeatures()),
            config,
            train,
            xtest,
        ),
    }
}

/// Run the experiment described by `config`
pub fn run(config: &ExperimentConfig) -> Result<ExperimentReport> {
    config.validate()?;
    let now = Instant::now();

    let data = load_data(&config.data, config.training.seed)?.normalize_features();
    let dataset = match config.data.synthetic {
        Some(n) => format!("synthetic({n}, {SYNTHETIC_DIM})"),
        None => config.data.path.display().to_string(),
    };
    let (train, test) = data.split(config.data.train_fraction)?;
    let train = truncate(train, config.model.max_train);

    info!(
        "Train {} GP with {} kernel on {} samples",
        config.model.inference,
        config.model.kernel,
        train.nsamples()
    );
    let model = train_model(config, &train, test.records())?;

    let mae = mean_absolute_error(&model.predictions, test.targets())?;
    let rmse = root_mean_squared_error(&model.predictions, test.targets())?;
    let r2 = r2_score(&model.predictions, test.targets())?;
    info!("Test MAE = {mae}, RMSE = {rmse}, R2 = {r2}");

    let report = ExperimentReport {
        dataset,
        inference: config.model.inference,
        kernel: config.model.kernel,
        n_train: train.nsamples(),
        n_test: test.nsamples(),
        n_features: train.nfeatures(),
        mae,
        rmse,
        r2,
        loss_history: model.loss_history,
        mll: model.mll,
        model: model.summary,
        elapsed_secs: now.elapsed().as_secs_f64(),
    };
    if let Some(output) = &config.report.output {
        write_report(&report, output)?;
    }
    Ok(report)
}

/// Write `report` as pretty printed JSON
pub fn write_report(report: &ExperimentReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .with_context(|| format!("Cannot create report file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    info!("Report written in {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use skipgp_data::DataError;
    use std::path::PathBuf;

    fn synthetic_config(n: usize, inference: Inference, kernel: KernelSpec) -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.data.synthetic = Some(n);
        config.model.inference = inference;
        config.model.kernel = kernel;
        config.model.grid_size = 30;
        config.model.max_root_rank = 15;
        config.training.n_iter = 10;
        config.training.learning_rate = 0.05;
        config
    }

    /// MAE of predicting the training mean
    fn baseline_mae(config: &ExperimentConfig) -> f64 {
        let data = load_data(&config.data, config.training.seed).unwrap();
        let (train, test) = data.split(config.data.train_fraction).unwrap();
        let mean = train.targets().mean().unwrap();
        test.targets().mapv(|v| (v - mean).abs()).mean().unwrap()
    }

    #[test]
    fn test_skip_experiment() {
        let config = synthetic_config(300, Inference::Skip, KernelSpec::Rbf);
        let report = run(&config).unwrap();
        assert_eq!(report.n_train, 240);
        assert_eq!(report.n_test, 60);
        assert_eq!(report.n_features, SYNTHETIC_DIM);
        assert_eq!(report.loss_history.len(), 10);
        assert!(report.mae.is_finite());
        assert!(report.rmse >= report.mae);
    }

    #[test]
    fn test_exact_experiment() {
        let mut config = synthetic_config(300, Inference::Exact, KernelSpec::Matern52);
        config.training.n_iter = 20;
        config.model.max_train = Some(200);
        let report = run(&config).unwrap();
        assert_eq!(report.n_train, 200);
        assert_eq!(report.n_test, 60);
        assert!(report.loss_history.first() > report.loss_history.last());
        assert!(report.mae < 0.75 * baseline_mae(&config));
        assert!(report.r2 > 0. && report.r2 <= 1.);
    }

    #[test]
    fn test_csv_experiment_with_report() {
        let dir = PathBuf::from("target/tests/experiment");
        std::fs::create_dir_all(&dir).unwrap();
        let csv = dir.join("linear.csv");
        let mut content = String::from("x1,x2,y\n");
        for i in 0..40 {
            let (x1, x2) = (i as f64, (i % 7) as f64);
            content.push_str(&format!("{x1},{x2},{}\n", 0.1 * (2. * x1 - x2) + 1.));
        }
        std::fs::write(&csv, content).unwrap();

        let mut config = ExperimentConfig::default();
        config.data.path = csv;
        config.model.inference = Inference::Exact;
        config.model.kernel = KernelSpec::Linear;
        config.training.n_iter = 30;
        config.training.learning_rate = 0.1;
        config.report.output = Some(dir.join("report.json"));
        let report = run(&config).unwrap();
        assert_eq!(report.n_features, 2);
        assert_eq!(report.n_train, 32);
        assert!(report.mae < 1.);

        let written: ExperimentReport = serde_json::from_reader(
            File::open(dir.join("report.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written.n_test, 8);
        assert_eq!(written.loss_history, report.loss_history);
    }

    #[test]
    fn test_missing_dataset() {
        let mut config = ExperimentConfig::default();
        config.data.path = PathBuf::from("target/tests/experiment/missing.csv");
        config.data.url = None;
        let err = run(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::MissingSource(_))
        ));
    }

    #[test]
    fn test_skip_linear_rejected() {
        let config = synthetic_config(100, Inference::Skip, KernelSpec::Linear);
        assert!(run(&config).is_err());
    }
}
