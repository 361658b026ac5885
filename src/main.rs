/* Hyperparameter search for MobileNetV3 on CIFAR-10.

   The dataset can be downloaded from https://www.cs.toronto.edu/~kriz/cifar.html, the
   binary version files should be placed in the data/ directory.

   Each trial trains a fresh network for a fixed number of epochs and reports its test
   accuracy; the most accurate trial is printed at the end.
*/
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mobilenet_search::search::SamplerKind;
use mobilenet_search::vision::{cifar, Architecture};
use mobilenet_search::{Search, SearchConfig, Trainer};
use tch::Device;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mobilenet-search", about = "MobileNet hyperparameter search on CIFAR-10")]
struct Args {
    /// JSON configuration file, flags below take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with the CIFAR-10 binary files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    trials: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum)]
    sampler: Option<SamplerKind>,

    #[arg(long, value_enum)]
    architecture: Option<Architecture>,

    /// Train on the cpu even when cuda is available.
    #[arg(long)]
    cpu: bool,

    /// Write every trial of the study to this JSON file.
    #[arg(long)]
    study_out: Option<PathBuf>,
}

impl Args {
    fn search_config(&self) -> anyhow::Result<SearchConfig> {
        let mut config = match &self.config {
            Some(path) => SearchConfig::from_file(path)?,
            None => SearchConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(trials) = self.trials {
            config.n_trials = trials;
        }
        if let Some(epochs) = self.epochs {
            config.train.epochs = epochs;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(sampler) = self.sampler {
            config.sampler = sampler;
        }
        if let Some(architecture) = self.architecture {
            config.train.architecture = architecture;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mobilenet_search=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.search_config()?;
    if let Some(seed) = config.seed {
        tch::manual_seed(seed as i64);
    }
    let device = if args.cpu { Device::Cpu } else { Device::cuda_if_available() };

    let dataset = cifar::load_dir(&config.data_dir)
        .with_context(|| format!("cannot load cifar-10 from {:?}", config.data_dir))?;
    info!(
        train = dataset.train_size(),
        test = dataset.test_size(),
        ?device,
        trials = config.n_trials,
        architecture = %config.train.architecture,
        "starting search"
    );

    let trainer = Trainer::new(&dataset, config.train.clone(), device);
    let mut search = Search::new(&config)?;
    let study = search.optimize(|params| trainer.train_and_evaluate(params));

    if let Some(path) = &args.study_out {
        study.save(path)?;
        info!(path = %path.display(), "study written");
    }

    let best = study.best_trial()?;
    println!("Best trial:");
    println!("  Accuracy: {}", best.value.unwrap_or(f64::NAN));
    println!("  Best hyperparameters: {}", best.params);
    Ok(())
}
