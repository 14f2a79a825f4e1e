use clap::Parser;
use log::info;
use skipgp::{ExperimentConfig, Inference, KernelSpec, run};
use std::path::PathBuf;

/// Train a SKIP Gaussian Process on a tabular dataset and report the test mean absolute error
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON experiment configuration, flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Dataset file (.csv or .npy), the last column is the target
    #[arg(short, long)]
    data: Option<PathBuf>,
    /// Url to download the dataset from when the file is not cached
    #[arg(long)]
    url: Option<String>,
    /// Inference method: skip or exact
    #[arg(long)]
    inference: Option<Inference>,
    /// Base kernel: rbf, matern32, matern52 or linear (exact only)
    #[arg(short, long)]
    kernel: Option<KernelSpec>,
    /// Number of training iterations
    #[arg(short = 'n', long)]
    iterations: Option<usize>,
    /// Adam learning rate
    #[arg(long)]
    lr: Option<f64>,
    /// Grid points per input dimension
    #[arg(long)]
    grid_size: Option<usize>,
    /// Maximal rank of the kernel root decomposition
    #[arg(long)]
    root_rank: Option<usize>,
    /// Only use the first training samples
    #[arg(long)]
    max_train: Option<usize>,
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
    /// Generate this number of synthetic samples instead of loading a dataset
    #[arg(long)]
    synthetic: Option<usize>,
    /// JSON file where the experiment report is written
    #[arg(short, long)]
    report: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_file(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(path) = self.data {
            config.data.path = path;
        }
        if self.url.is_some() {
            config.data.url = self.url;
        }
        if self.synthetic.is_some() {
            config.data.synthetic = self.synthetic;
        }
        if let Some(inference) = self.inference {
            config.model.inference = inference;
        }
        if let Some(kernel) = self.kernel {
            config.model.kernel = kernel;
        }
        if let Some(grid_size) = self.grid_size {
            config.model.grid_size = grid_size;
        }
        if let Some(rank) = self.root_rank {
            config.model.max_root_rank = rank;
        }
        if self.max_train.is_some() {
            config.model.max_train = self.max_train;
        }
        if let Some(n_iter) = self.iterations {
            config.training.n_iter = n_iter;
        }
        if let Some(lr) = self.lr {
            config.training.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if self.report.is_some() {
            config.report.output = self.report;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::new().filter_or("SKIPGP_LOG", "info");
    let mut builder = env_logger::Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let config = Args::parse().into_config()?;
    let report = run(&config)?;
    info!("Trained model: {}", report.model);
    info!("Elapsed: {:.1} s", report.elapsed_secs);
    println!("Test MAE: {}", report.mae);
    Ok(())
}
