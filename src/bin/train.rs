//! RBM training binary.
//!
//! Trains a Restricted Boltzmann Machine with CD-k on a CSV matrix of visible
//! vectors (or generated bars-and-stripes patterns). Writes JSONL metrics and
//! periodic checkpoints.

use clap::Parser;
use ndarray::Array2;
use rbm::checkpoint::{load_checkpoint, save_checkpoint};
use rbm::data::{bars_and_stripes, load_matrix_csv, train_eval_split};
use rbm::{
    Config, CrossEntropyForm, FileStatsStorage, JsonlObserver, Rbm, RbmResult, StorageObserver,
    Trainer, VisibleBiasUpdate,
};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rbm-train", about = "Train a binary RBM with contrastive divergence")]
struct Args {
    /// CSV/whitespace matrix of visible vectors in [0, 1]; bars-and-stripes if omitted
    #[arg(long)]
    data: Option<PathBuf>,

    /// Grid side for generated bars-and-stripes data
    #[arg(long, default_value_t = 4)]
    bars_side: usize,

    /// JSON config file; command-line hyperparameters are ignored when given
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of hidden units
    #[arg(long, default_value_t = 16)]
    hidden: usize,

    /// Number of training epochs
    #[arg(long, default_value_t = 100)]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Learning rate
    #[arg(long, default_value_t = 0.1)]
    learning_rate: f64,

    /// Gibbs steps per update
    #[arg(long, default_value_t = 1)]
    k: usize,

    /// Seed for initialization, sampling and shuffling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Accumulate the visible bias instead of overwriting it each step
    #[arg(long, default_value_t = false)]
    accumulate_visible_bias: bool,

    /// Score reconstructions with min(1, x) in place of (1 - x)
    #[arg(long, default_value_t = false)]
    legacy_cross_entropy: bool,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = 0.0)]
    eval_fraction: f64,

    /// Output metrics file (JSONL)
    #[arg(long, default_value = "data/output/metrics.jsonl")]
    metrics_file: PathBuf,

    /// Also log every CD step to the metrics file
    #[arg(long, default_value_t = false)]
    log_steps: bool,

    /// Checkpoint directory
    #[arg(long, default_value = "data/checkpoints")]
    checkpoint_dir: PathBuf,

    /// Save checkpoint every N epochs
    #[arg(long, default_value_t = 10)]
    checkpoint_every: usize,

    /// Resume from checkpoint file
    #[arg(long)]
    resume: Option<PathBuf>,

    /// JSON stats storage file receiving a parameter snapshot per epoch
    #[arg(long)]
    stats_file: Option<PathBuf>,

    /// Session id under which snapshots are stored
    #[arg(long, default_value = "rbm")]
    session_id: String,

    /// Worker id under which snapshots are stored
    #[arg(long, default_value = "worker-0")]
    worker_id: String,
}

impl Args {
    fn to_config(&self) -> RbmResult<Config> {
        if let Some(ref path) = self.config {
            return Config::load_from_file(path);
        }
        let config = Config {
            learning_rate: self.learning_rate,
            k: self.k,
            batch_size: self.batch_size,
            seed: self.seed,
            visible_bias_update: if self.accumulate_visible_bias {
                VisibleBiasUpdate::Accumulate
            } else {
                VisibleBiasUpdate::Overwrite
            },
            cross_entropy: if self.legacy_cross_entropy {
                CrossEntropyForm::LegacyMinimum
            } else {
                CrossEntropyForm::Complement
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rbm=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Training failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> RbmResult<()> {
    let config = args.to_config()?;

    let data: Array2<f64> = match args.data {
        Some(ref path) => load_matrix_csv(path)?,
        None => bars_and_stripes(args.bars_side)?,
    };
    let (train, eval) = train_eval_split(&data, args.eval_fraction);

    if let Some(parent) = args.metrics_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(&args.checkpoint_dir)?;

    // Initialize or resume model
    let (mut rbm, start_epoch) = if let Some(ref ckpt_path) = args.resume {
        eprintln!("Resuming from checkpoint: {}", ckpt_path.display());
        let (checkpoint, rbm) = load_checkpoint(ckpt_path, Some(config.seed))?;
        eprintln!(
            "  Resumed at epoch {}, cross-entropy={}",
            checkpoint.epoch,
            checkpoint
                .cross_entropy
                .map_or_else(|| "n/a".to_string(), |ce| format!("{:.4}", ce))
        );
        (rbm, checkpoint.epoch)
    } else {
        (Rbm::uniform(train.ncols(), args.hidden, config.seed)?, 0)
    };

    // Open metrics file (append mode so a dashboard can tail it)
    let metrics_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.metrics_file)?;
    let mut jsonl = JsonlObserver::new(BufWriter::new(metrics_file));
    if args.log_steps {
        jsonl = jsonl.with_steps();
    }

    let mut trainer = Trainer::new(config.clone())?.with_observer(Box::new(jsonl));
    if let Some(ref stats_path) = args.stats_file {
        let storage = Arc::new(FileStatsStorage::open(stats_path)?);
        trainer.add_observer(Box::new(StorageObserver::new(
            storage,
            args.session_id.as_str(),
            args.worker_id.as_str(),
        )));
        eprintln!("Stats storage: {}", stats_path.display());
    }
    trainer.set_epoch(start_epoch);

    eprintln!("RBM Training");
    eprintln!("  Visible: {}, Hidden: {}", rbm.n_visible(), rbm.n_hidden());
    eprintln!(
        "  Train rows: {}, Eval rows: {}",
        train.nrows(),
        eval.nrows()
    );
    eprintln!("  Batch size: {}, Epochs: {}", config.batch_size, args.epochs);
    eprintln!(
        "  Learning rate: {}, k: {}, seed: {}",
        config.learning_rate, config.k, config.seed
    );
    eprintln!("  Metrics: {}", args.metrics_file.display());
    eprintln!();

    for _ in 0..args.epochs {
        let metrics = trainer.train_epoch(&mut rbm, &train, true)?;
        let eval_ce = if eval.nrows() > 0 {
            Some(rbm.cross_entropy_of(&eval, config.cross_entropy)?)
        } else {
            None
        };

        eprintln!(
            "Epoch {:4} | cross-entropy: {:.4} | eval: {} | |dW|: {:.4} | {:.2}s",
            metrics.epoch,
            metrics.cross_entropy,
            eval_ce.map_or_else(|| "-".to_string(), |ce| format!("{:.4}", ce)),
            metrics.mean_weight_gradient_norm,
            metrics.elapsed_secs
        );

        if args.checkpoint_every > 0 && metrics.epoch % args.checkpoint_every == 0 {
            let ckpt_path = args
                .checkpoint_dir
                .join(format!("epoch_{:04}.json", metrics.epoch));
            match save_checkpoint(&rbm, &ckpt_path, metrics.epoch, metrics.cross_entropy) {
                Ok(()) => eprintln!("  Checkpoint saved: {}", ckpt_path.display()),
                Err(e) => eprintln!("  Warning: checkpoint save failed: {e}"),
            }
        }
    }

    let final_path = args.checkpoint_dir.join("final.json");
    let final_ce = rbm.cross_entropy_of(&train, config.cross_entropy)?;
    save_checkpoint(&rbm, &final_path, trainer.epochs(), final_ce)?;
    eprintln!();
    eprintln!("Final checkpoint: {}", final_path.display());
    std::io::stderr().flush()?;
    Ok(())
}
