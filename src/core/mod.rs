//! Core RBM structures and operations.
//!
//! This module provides the model itself:
//! - Parameter state (weights, hidden bias, visible bias)
//! - Deterministic propagation between layers
//! - Conditional Bernoulli sampling of one layer given the other
//! - The hidden → visible → hidden Gibbs transition
//! - Mean-field reconstruction and its cross-entropy
//!
//! ## Conditionals
//!
//! ```text
//! P(h = 1 | v) = σ(v W + b_h)
//! P(v = 1 | h) = σ(h Wᵀ + b_v)
//! ```
//!
//! Rows are samples; `W` has shape `(n_visible, n_hidden)`.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

use crate::sampling::BernoulliSampler;
use crate::training::CdGradients;
use crate::utils::sigmoid_matrix;
use crate::CrossEntropyForm;

/// Error type for RBM operations.
#[derive(Debug)]
pub enum RbmError {
    /// Input or parameter shape disagrees with the model dimensions
    DimensionMismatch(String),
    /// Hyperparameter or argument outside its valid range
    InvalidParameter(String),
    /// Stats storage failure
    Storage(String),
    /// JSON encoding or decoding failure
    Serialization(String),
    /// Filesystem failure
    Io(std::io::Error),
}

impl fmt::Display for RbmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RbmError::DimensionMismatch(msg) => write!(f, "Dimension mismatch: {}", msg),
            RbmError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            RbmError::Storage(msg) => write!(f, "Storage error: {}", msg),
            RbmError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            RbmError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl Error for RbmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RbmError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RbmError {
    fn from(value: std::io::Error) -> Self {
        RbmError::Io(value)
    }
}

impl From<serde_json::Error> for RbmError {
    fn from(value: serde_json::Error) -> Self {
        RbmError::Serialization(value.to_string())
    }
}

pub type RbmResult<T> = Result<T, RbmError>;

/// Capability shared by layer-wise pretrainable models.
///
/// A stacking framework only needs to move activations through a layer and to
/// train it in place; the sampling machinery stays inside the implementation.
pub trait GenerativeLayer {
    fn n_visible(&self) -> usize;

    fn n_hidden(&self) -> usize;

    /// Visible activations → hidden probabilities.
    fn prop_up(&self, v: &Array2<f64>) -> RbmResult<Array2<f64>>;

    /// Hidden activations → visible probabilities.
    fn prop_down(&self, h: &Array2<f64>) -> RbmResult<Array2<f64>>;

    /// Run one unsupervised training step on `input` (or the stored batch).
    fn train(
        &mut self,
        learning_rate: f64,
        k: usize,
        input: Option<&Array2<f64>>,
    ) -> RbmResult<CdGradients>;
}

/// Weight matrix and bias vectors of an RBM.
///
/// Serialized with non-finite entries kept (see [`crate::utils::serde_float`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbmParams {
    /// Shape `(n_visible, n_hidden)`
    #[serde(with = "crate::utils::serde_float::array2")]
    pub weights: Array2<f64>,
    /// Length `n_hidden`
    #[serde(with = "crate::utils::serde_float::array1")]
    pub hidden_bias: Array1<f64>,
    /// Length `n_visible`
    #[serde(with = "crate::utils::serde_float::array1")]
    pub visible_bias: Array1<f64>,
}

impl RbmParams {
    /// All-zero parameters.
    pub fn zeros(n_visible: usize, n_hidden: usize) -> Self {
        Self {
            weights: Array2::zeros((n_visible, n_hidden)),
            hidden_bias: Array1::zeros(n_hidden),
            visible_bias: Array1::zeros(n_visible),
        }
    }

    /// Weights from U(-1/n_visible, 1/n_visible), biases zero.
    ///
    /// # Errors
    /// - `InvalidParameter` if either dimension is zero
    pub fn uniform<R: Rng + ?Sized>(
        n_visible: usize,
        n_hidden: usize,
        rng: &mut R,
    ) -> RbmResult<Self> {
        check_layer_sizes(n_visible, n_hidden)?;
        let a = 1.0 / n_visible as f64;
        Ok(Self {
            weights: Array2::random_using((n_visible, n_hidden), Uniform::new(-a, a), rng),
            hidden_bias: Array1::zeros(n_hidden),
            visible_bias: Array1::zeros(n_visible),
        })
    }

    pub fn n_visible(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_hidden(&self) -> usize {
        self.weights.ncols()
    }

    /// Check that every tensor agrees with the declared layer sizes.
    ///
    /// # Errors
    /// - `DimensionMismatch` naming the first inconsistent tensor
    pub fn validate(&self, n_visible: usize, n_hidden: usize) -> RbmResult<()> {
        if self.weights.dim() != (n_visible, n_hidden) {
            return Err(RbmError::DimensionMismatch(format!(
                "Weights: expected ({}, {}), got {:?}",
                n_visible,
                n_hidden,
                self.weights.dim()
            )));
        }
        if self.hidden_bias.len() != n_hidden {
            return Err(RbmError::DimensionMismatch(format!(
                "Hidden bias: expected {}, got {}",
                n_hidden,
                self.hidden_bias.len()
            )));
        }
        if self.visible_bias.len() != n_visible {
            return Err(RbmError::DimensionMismatch(format!(
                "Visible bias: expected {}, got {}",
                n_visible,
                self.visible_bias.len()
            )));
        }
        Ok(())
    }
}

/// Probabilities of a layer together with one Bernoulli draw from them.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSample {
    pub mean: Array2<f64>,
    pub sample: Array2<f64>,
}

/// Result of one hidden → visible → hidden Gibbs transition.
#[derive(Debug, Clone, PartialEq)]
pub struct GibbsStep {
    pub visible_mean: Array2<f64>,
    pub visible_sample: Array2<f64>,
    pub hidden_mean: Array2<f64>,
    pub hidden_sample: Array2<f64>,
}

/// A binary Restricted Boltzmann Machine.
///
/// # State
///
/// - **Parameters:** owned [`RbmParams`], updated in place by training
/// - **Sampler:** owned [`BernoulliSampler`]; every stochastic call advances it
/// - **Input:** the most recent training batch, reused when a step receives none
///
/// Stochastic and mutating operations take `&mut self`. Workers that train in
/// parallel should each own a [`fork`](Rbm::fork) of the model.
#[derive(Debug, Clone)]
pub struct Rbm {
    n_visible: usize,
    n_hidden: usize,
    pub(crate) params: RbmParams,
    pub(crate) sampler: BernoulliSampler,
    pub(crate) input: Option<Array2<f64>>,
}

impl Rbm {
    /// Build a model from externally initialized parameters.
    ///
    /// # Errors
    /// - `InvalidParameter` if either layer size is zero
    /// - `DimensionMismatch` if a parameter tensor disagrees with the layer sizes
    pub fn new(
        n_visible: usize,
        n_hidden: usize,
        params: RbmParams,
        sampler: BernoulliSampler,
    ) -> RbmResult<Self> {
        check_layer_sizes(n_visible, n_hidden)?;
        params.validate(n_visible, n_hidden)?;
        Ok(Self {
            n_visible,
            n_hidden,
            params,
            sampler,
            input: None,
        })
    }

    /// Build a model with an initial training batch.
    ///
    /// # Errors
    /// As [`Rbm::new`], plus `DimensionMismatch` for a malformed batch.
    pub fn with_input(
        input: Array2<f64>,
        n_visible: usize,
        n_hidden: usize,
        params: RbmParams,
        sampler: BernoulliSampler,
    ) -> RbmResult<Self> {
        let mut rbm = Self::new(n_visible, n_hidden, params, sampler)?;
        rbm.check_batch(&input)?;
        rbm.input = Some(input);
        Ok(rbm)
    }

    /// Zero-initialized model with a seeded sampler.
    pub fn zeros(n_visible: usize, n_hidden: usize, seed: u64) -> RbmResult<Self> {
        Self::new(
            n_visible,
            n_hidden,
            RbmParams::zeros(n_visible, n_hidden),
            BernoulliSampler::seeded(seed),
        )
    }

    /// Uniformly initialized model; initialization draws from the seeded sampler.
    pub fn uniform(n_visible: usize, n_hidden: usize, seed: u64) -> RbmResult<Self> {
        let mut sampler = BernoulliSampler::seeded(seed);
        let params = RbmParams::uniform(n_visible, n_hidden, sampler.rng_mut())?;
        Self::new(n_visible, n_hidden, params, sampler)
    }

    /// Independent copy with a fresh sampler, for a separate worker.
    pub fn fork(&self, seed: u64) -> Self {
        Self {
            sampler: BernoulliSampler::seeded(seed),
            ..self.clone()
        }
    }

    pub fn n_visible(&self) -> usize {
        self.n_visible
    }

    pub fn n_hidden(&self) -> usize {
        self.n_hidden
    }

    pub fn params(&self) -> &RbmParams {
        &self.params
    }

    /// Replace the parameters wholesale.
    ///
    /// # Errors
    /// - `DimensionMismatch` if the new parameters have a different shape
    pub fn set_params(&mut self, params: RbmParams) -> RbmResult<()> {
        params.validate(self.n_visible, self.n_hidden)?;
        self.params = params;
        Ok(())
    }

    /// The batch used when a training step receives no input.
    pub fn input(&self) -> Option<&Array2<f64>> {
        self.input.as_ref()
    }

    /// Validate a non-empty batch of visible vectors.
    pub(crate) fn check_batch(&self, v: &Array2<f64>) -> RbmResult<()> {
        if v.nrows() == 0 {
            return Err(RbmError::DimensionMismatch(
                "Input batch has no rows".to_string(),
            ));
        }
        self.check_visible(v)
    }

    fn check_visible(&self, v: &Array2<f64>) -> RbmResult<()> {
        if v.ncols() != self.n_visible {
            return Err(RbmError::DimensionMismatch(format!(
                "Visible dimension: expected {}, got {}",
                self.n_visible,
                v.ncols()
            )));
        }
        Ok(())
    }

    fn check_hidden(&self, h: &Array2<f64>) -> RbmResult<()> {
        if h.ncols() != self.n_hidden {
            return Err(RbmError::DimensionMismatch(format!(
                "Hidden dimension: expected {}, got {}",
                self.n_hidden,
                h.ncols()
            )));
        }
        Ok(())
    }

    /// Hidden unit probabilities: `σ(v W + b_h)`.
    pub fn prop_up(&self, v: &Array2<f64>) -> RbmResult<Array2<f64>> {
        self.check_visible(v)?;
        let pre = v.dot(&self.params.weights) + &self.params.hidden_bias;
        Ok(sigmoid_matrix(pre))
    }

    /// Visible unit probabilities: `σ(h Wᵀ + b_v)`.
    pub fn prop_down(&self, h: &Array2<f64>) -> RbmResult<Array2<f64>> {
        self.check_hidden(h)?;
        let pre = h.dot(&self.params.weights.t()) + &self.params.visible_bias;
        Ok(sigmoid_matrix(pre))
    }

    /// Sample the hidden layer given visible activity.
    pub fn sample_h_given_v(&mut self, v: &Array2<f64>) -> RbmResult<LayerSample> {
        let mean = self.prop_up(v)?;
        let sample = self.sampler.sample(&mean);
        Ok(LayerSample { mean, sample })
    }

    /// Sample the visible layer given hidden activity.
    pub fn sample_v_given_h(&mut self, h: &Array2<f64>) -> RbmResult<LayerSample> {
        let mean = self.prop_down(h)?;
        let sample = self.sampler.sample(&mean);
        Ok(LayerSample { mean, sample })
    }

    /// One Gibbs transition starting from hidden state `h`.
    ///
    /// The hidden layer is resampled from the visible *sample*, not its mean.
    pub fn gibbs_hvh(&mut self, h: &Array2<f64>) -> RbmResult<GibbsStep> {
        let visible = self.sample_v_given_h(h)?;
        let hidden = self.sample_h_given_v(&visible.sample)?;
        Ok(GibbsStep {
            visible_mean: visible.mean,
            visible_sample: visible.sample,
            hidden_mean: hidden.mean,
            hidden_sample: hidden.sample,
        })
    }

    /// Deterministic mean-field reconstruction: `prop_down(prop_up(v))`.
    pub fn reconstruct(&self, v: &Array2<f64>) -> RbmResult<Array2<f64>> {
        let h = self.prop_up(v)?;
        self.prop_down(&h)
    }

    /// Reconstruction cross-entropy of the stored batch.
    ///
    /// # Errors
    /// - `InvalidParameter` if no batch has been stored yet
    pub fn reconstruction_cross_entropy(&self) -> RbmResult<f64> {
        self.reconstruction_cross_entropy_with(CrossEntropyForm::Complement)
    }

    /// Reconstruction cross-entropy of the stored batch, scored with the complement
    /// term chosen by `form`.
    pub fn reconstruction_cross_entropy_with(&self, form: CrossEntropyForm) -> RbmResult<f64> {
        let input = self.input.as_ref().ok_or_else(|| {
            RbmError::InvalidParameter("No input batch stored on the model".to_string())
        })?;
        self.cross_entropy_of(input, form)
    }

    /// Reconstruction cross-entropy of an arbitrary batch.
    ///
    /// # Metric
    ///
    /// ```text
    /// p     = σ(σ(x W + b_h) Wᵀ + b_v)
    /// score = Σ_j [ x_j ln p_j + c_j ln(1 - p_j) ]     per row
    /// CE    = -mean(score)
    /// ```
    ///
    /// `c` is `1 - x` or `min(1, x)` depending on `form`. Saturated probabilities
    /// are not clamped, so the result can be infinite or NaN.
    pub fn cross_entropy_of(&self, input: &Array2<f64>, form: CrossEntropyForm) -> RbmResult<f64> {
        self.check_batch(input)?;
        let p = self.reconstruct(input)?;

        let log_p = p.mapv(f64::ln);
        let log_one_minus_p = p.mapv(|x| (1.0 - x).ln());
        let complement = match form {
            CrossEntropyForm::Complement => input.mapv(|x| 1.0 - x),
            CrossEntropyForm::LegacyMinimum => input.mapv(|x| x.min(1.0)),
        };

        let scores = (input * &log_p + &complement * &log_one_minus_p).sum_axis(Axis(1));
        let mean = scores.mean().ok_or_else(|| {
            RbmError::DimensionMismatch("Input batch has no rows".to_string())
        })?;
        Ok(-mean)
    }
}

fn check_layer_sizes(n_visible: usize, n_hidden: usize) -> RbmResult<()> {
    if n_visible == 0 || n_hidden == 0 {
        return Err(RbmError::InvalidParameter(format!(
            "Layer sizes must be > 0 (visible={}, hidden={})",
            n_visible, n_hidden
        )));
    }
    Ok(())
}
