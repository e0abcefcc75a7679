//! # RBM (Restricted Boltzmann Machines)
//!
//! Unsupervised training of binary Restricted Boltzmann Machines with k-step
//! contrastive divergence (CD-k).
//!
//! ## Overview
//!
//! An RBM is a two-layer undirected generative model: a visible layer and a hidden
//! layer joined by a weight matrix, with no connections inside a layer. Training
//! approximates the log-likelihood gradient by comparing data-driven statistics
//! (positive phase) with statistics from a short Gibbs chain (negative phase).
//!
//! ## Structure
//!
//! - [`core`] — Parameter state, propagation, conditional sampling, reconstruction
//! - [`sampling`] — Seedable elementwise Bernoulli sampler
//! - [`training`] — CD-k gradient computation, in-place updates, mini-batch epochs
//! - [`observer`] — Observers notified after every training step and epoch
//! - [`checkpoint`] — JSON snapshots of model parameters
//! - [`storage`] — Key/value storage of opaque training records
//! - [`data`] — Dataset loading and synthetic binary patterns
//! - [`utils`] — Math utilities
//!
//! ## Example
//!
//! ```rust
//! use ndarray::Array2;
//! use rbm::{contrastive_divergence, Rbm};
//!
//! let mut rbm = Rbm::uniform(6, 4, 7).unwrap();
//! let batch = Array2::from_elem((3, 6), 1.0);
//! contrastive_divergence(&mut rbm, 0.1, 1, Some(&batch)).unwrap();
//! let error = rbm.reconstruction_cross_entropy().unwrap();
//! assert!(error.is_finite());
//! ```

pub mod checkpoint;
pub mod core;
pub mod data;
pub mod observer;
pub mod sampling;
pub mod storage;
pub mod training;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use crate::core::{GenerativeLayer, GibbsStep, LayerSample, Rbm, RbmError, RbmParams, RbmResult};
pub use checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
pub use observer::{EpochEvent, JsonlObserver, StepEvent, StorageObserver, TrainingObserver};
pub use sampling::BernoulliSampler;
pub use storage::{FileStatsStorage, InMemoryStatsStorage, StatsStorage, StorageKey, UpdateRecord};
pub use training::{
    apply_gradients, compute_gradients, contrastive_divergence, contrastive_divergence_with,
    CdGradients, EpochMetrics, Trainer,
};

/// How the visible bias absorbs its gradient after a CD step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibleBiasUpdate {
    /// `visible_bias = lr * grad`. The bias only reflects the latest batch.
    #[default]
    Overwrite,
    /// `visible_bias += lr * grad`, symmetric with the hidden bias.
    Accumulate,
}

/// The complement term used by the reconstruction cross-entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossEntropyForm {
    /// `(1 - x) * ln(1 - p)`
    #[default]
    Complement,
    /// `min(1, x) * ln(1 - p)`. Matches scores produced by older tooling.
    LegacyMinimum,
}

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Step size applied to every gradient
    pub learning_rate: f64,
    /// Gibbs steps per CD call
    pub k: usize,
    /// Rows per mini-batch in [`Trainer::train_epoch`]
    pub batch_size: usize,
    /// Seed for the model sampler and the epoch shuffler
    pub seed: u64,
    pub visible_bias_update: VisibleBiasUpdate,
    pub cross_entropy: CrossEntropyForm,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            k: 1,
            batch_size: 10,
            seed: 42,
            visible_bias_update: VisibleBiasUpdate::Overwrite,
            cross_entropy: CrossEntropyForm::Complement,
        }
    }
}

impl Config {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> RbmResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RbmError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> RbmResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check the hyperparameters the CD step relies on.
    ///
    /// # Errors
    /// - `InvalidParameter` if `learning_rate` is not strictly positive, `k == 0`
    ///   or `batch_size == 0`
    pub fn validate(&self) -> RbmResult<()> {
        training::validate_hyperparameters(self.learning_rate, self.k)?;
        if self.batch_size == 0 {
            return Err(RbmError::InvalidParameter(
                "Batch size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
