//! Contrastive-divergence training, gradient updates, and epoch loops.
//!
//! # CD-k
//!
//! One training step on a batch `x`:
//!
//! 1. **Positive phase:** sample `h0 ~ P(h | x)`
//! 2. **Negative phase:** run `k` Gibbs transitions starting from `h0`; each
//!    transition starts from the previous hidden *sample*
//! 3. **Gradients** from the last transition `(v_k, p(h | v_k))`:
//!    ```text
//!    ΔW   = xᵀ h0 − v_kᵀ p(h | v_k)
//!    Δb_v = mean_rows(x − v_k)
//!    Δb_h = mean_rows(h0 − p(h | v_k))
//!    ```
//! 4. **Update** in place: `W += η ΔW`, `b_h += η Δb_h`, and `b_v` either
//!    overwritten with `η Δb_v` or accumulated (see [`VisibleBiasUpdate`])
//!
//! Structural errors are detected before anything is touched: a failed step
//! leaves parameters, stored input and sampler state unchanged.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;

use crate::core::{GenerativeLayer, GibbsStep, Rbm, RbmError, RbmParams, RbmResult};
use crate::observer::{EpochEvent, StepEvent, TrainingObserver};
use crate::utils::{all_finite, column_mean, frobenius_norm, l2_norm};
use crate::{Config, VisibleBiasUpdate};

/// Gradients estimated by one CD step (before scaling by the learning rate).
#[derive(Debug, Clone, PartialEq)]
pub struct CdGradients {
    /// Same shape as [`RbmParams::weights`]
    pub weights: Array2<f64>,
    /// Same length as [`RbmParams::visible_bias`]
    pub visible_bias: Array1<f64>,
    /// Same length as [`RbmParams::hidden_bias`]
    pub hidden_bias: Array1<f64>,
}

/// Statistics for one pass over a dataset.
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    /// 1-based epoch counter of the trainer
    pub epoch: usize,
    /// Reconstruction cross-entropy over the whole dataset after the epoch
    pub cross_entropy: f64,
    /// Mean Frobenius norm of the weight gradient across batches
    pub mean_weight_gradient_norm: f64,
    /// Number of batches processed
    pub num_batches: usize,
    /// Total samples processed
    pub num_samples: usize,
    /// Wall time of the epoch
    pub elapsed_secs: f64,
}

/// Reject learning rates that are not strictly positive and chains with `k == 0`.
pub fn validate_hyperparameters(learning_rate: f64, k: usize) -> RbmResult<()> {
    // `!(x > 0)` also rejects NaN
    if !(learning_rate > 0.0) {
        return Err(RbmError::InvalidParameter(format!(
            "Learning rate must be > 0, got {}",
            learning_rate
        )));
    }
    if k == 0 {
        return Err(RbmError::InvalidParameter(
            "Gibbs steps k must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// CD-k gradient estimate from the positive hidden sample and the last chain step.
pub fn compute_gradients(
    input: &Array2<f64>,
    positive_hidden_sample: &Array2<f64>,
    last: &GibbsStep,
) -> CdGradients {
    let positive = input.t().dot(positive_hidden_sample);
    let negative = last.visible_sample.t().dot(&last.hidden_mean);

    CdGradients {
        weights: positive - negative,
        visible_bias: column_mean(&(input - &last.visible_sample)),
        hidden_bias: column_mean(&(positive_hidden_sample - &last.hidden_mean)),
    }
}

/// Apply scaled gradients to `params` in place.
pub fn apply_gradients(
    params: &mut RbmParams,
    gradients: &CdGradients,
    learning_rate: f64,
    visible_bias_update: VisibleBiasUpdate,
) {
    params.weights.scaled_add(learning_rate, &gradients.weights);
    params
        .hidden_bias
        .scaled_add(learning_rate, &gradients.hidden_bias);
    match visible_bias_update {
        VisibleBiasUpdate::Overwrite => {
            params.visible_bias = learning_rate * &gradients.visible_bias;
        }
        VisibleBiasUpdate::Accumulate => {
            params
                .visible_bias
                .scaled_add(learning_rate, &gradients.visible_bias);
        }
    }
}

/// One CD-k step with the default (overwriting) visible-bias update.
///
/// If `input` is given it becomes the model's stored batch; otherwise the stored
/// batch is used.
///
/// # Errors
/// - `InvalidParameter` if `learning_rate <= 0`, `k == 0`, or no batch is available
/// - `DimensionMismatch` if the batch is empty or its width is not `n_visible`
pub fn contrastive_divergence(
    rbm: &mut Rbm,
    learning_rate: f64,
    k: usize,
    input: Option<&Array2<f64>>,
) -> RbmResult<CdGradients> {
    contrastive_divergence_with(rbm, learning_rate, k, input, VisibleBiasUpdate::Overwrite)
}

/// One CD-k step with an explicit visible-bias update rule.
pub fn contrastive_divergence_with(
    rbm: &mut Rbm,
    learning_rate: f64,
    k: usize,
    input: Option<&Array2<f64>>,
    visible_bias_update: VisibleBiasUpdate,
) -> RbmResult<CdGradients> {
    validate_hyperparameters(learning_rate, k)?;
    match input {
        Some(batch) => rbm.check_batch(batch)?,
        None if rbm.input.is_none() => {
            return Err(RbmError::InvalidParameter(
                "No input batch supplied and none stored on the model".to_string(),
            ));
        }
        None => {}
    }

    if let Some(batch) = input {
        rbm.input = Some(batch.to_owned());
    }
    let batch = rbm.input.take().ok_or_else(|| {
        RbmError::InvalidParameter("No input batch stored on the model".to_string())
    })?;
    let chain = run_chain(rbm, &batch, k);
    let outcome = chain.map(|(positive_sample, last)| {
        let gradients = compute_gradients(&batch, &positive_sample, &last);
        apply_gradients(&mut rbm.params, &gradients, learning_rate, visible_bias_update);
        gradients
    });
    rbm.input = Some(batch);
    let gradients = outcome?;

    tracing::debug!(
        k,
        learning_rate,
        batch_size = rbm.input.as_ref().map_or(0, |b| b.nrows()),
        weight_gradient_norm = frobenius_norm(&gradients.weights),
        hidden_bias_gradient_norm = l2_norm(&gradients.hidden_bias),
        "contrastive divergence step"
    );
    if !all_finite(rbm.params.weights.iter()) {
        tracing::warn!("non-finite values in weights after contrastive divergence step");
    }

    Ok(gradients)
}

/// Positive phase plus `k` Gibbs transitions; returns `(h0 sample, last step)`.
fn run_chain(rbm: &mut Rbm, batch: &Array2<f64>, k: usize) -> RbmResult<(Array2<f64>, GibbsStep)> {
    let positive = rbm.sample_h_given_v(batch)?;
    let mut step = rbm.gibbs_hvh(&positive.sample)?;
    for _ in 1..k {
        step = rbm.gibbs_hvh(&step.hidden_sample)?;
    }
    Ok((positive.sample, step))
}

impl GenerativeLayer for Rbm {
    fn n_visible(&self) -> usize {
        Rbm::n_visible(self)
    }

    fn n_hidden(&self) -> usize {
        Rbm::n_hidden(self)
    }

    fn prop_up(&self, v: &Array2<f64>) -> RbmResult<Array2<f64>> {
        Rbm::prop_up(self, v)
    }

    fn prop_down(&self, h: &Array2<f64>) -> RbmResult<Array2<f64>> {
        Rbm::prop_down(self, h)
    }

    fn train(
        &mut self,
        learning_rate: f64,
        k: usize,
        input: Option<&Array2<f64>>,
    ) -> RbmResult<CdGradients> {
        contrastive_divergence(self, learning_rate, k, input)
    }
}

// ============================================================================
// Trainer: configured steps and epochs with observers
// ============================================================================

/// Drives CD steps from a [`Config`] and notifies observers after each one.
pub struct Trainer {
    config: Config,
    observers: Vec<Box<dyn TrainingObserver>>,
    shuffle_rng: StdRng,
    steps: usize,
    epochs: usize,
}

impl Trainer {
    /// # Errors
    /// - `InvalidParameter` if the configuration fails [`Config::validate`]
    pub fn new(config: Config) -> RbmResult<Self> {
        config.validate()?;
        let shuffle_rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            observers: Vec::new(),
            shuffle_rng,
            steps: 0,
            epochs: 0,
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn TrainingObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn TrainingObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of successful steps so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of completed epochs so far.
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Resume counting from a checkpointed epoch.
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epochs = epoch;
    }

    /// One CD step, then every observer's `on_step`.
    ///
    /// A failing observer is logged with `tracing::warn!` and skipped; it never
    /// undoes or aborts the update, and the remaining observers still run.
    pub fn step(&mut self, rbm: &mut Rbm, input: Option<&Array2<f64>>) -> RbmResult<CdGradients> {
        let gradients = contrastive_divergence_with(
            rbm,
            self.config.learning_rate,
            self.config.k,
            input,
            self.config.visible_bias_update,
        )?;
        self.steps += 1;

        let event = StepEvent {
            step: self.steps,
            learning_rate: self.config.learning_rate,
            k: self.config.k,
            batch_size: rbm.input().map_or(0, |b| b.nrows()),
            weight_gradient_norm: frobenius_norm(&gradients.weights),
            visible_bias_gradient_norm: l2_norm(&gradients.visible_bias),
            hidden_bias_gradient_norm: l2_norm(&gradients.hidden_bias),
            params: rbm.params(),
        };
        for observer in &mut self.observers {
            if let Err(error) = observer.on_step(&event) {
                tracing::warn!(step = self.steps, %error, "observer failed on step");
            }
        }
        Ok(gradients)
    }

    /// One pass over `data` in mini-batches of `config.batch_size`.
    ///
    /// The final batch may be smaller. With `shuffle`, rows are permuted by the
    /// trainer's seeded generator.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `data` is empty or has the wrong width
    #[allow(clippy::cast_precision_loss)]
    pub fn train_epoch(
        &mut self,
        rbm: &mut Rbm,
        data: &Array2<f64>,
        shuffle: bool,
    ) -> RbmResult<EpochMetrics> {
        rbm.check_batch(data)?;
        let epoch_start = Instant::now();
        let num_samples = data.nrows();
        let batch_size = self.config.batch_size;

        let mut indices: Vec<usize> = (0..num_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.shuffle_rng);
        }

        let num_batches = num_samples.div_ceil(batch_size);
        let mut total_norm = 0.0;
        for chunk in indices.chunks(batch_size) {
            let batch = extract_batch(data, chunk);
            let gradients = self.step(rbm, Some(&batch))?;
            total_norm += frobenius_norm(&gradients.weights);
        }

        self.epochs += 1;
        let cross_entropy = rbm.cross_entropy_of(data, self.config.cross_entropy)?;
        if !cross_entropy.is_finite() {
            tracing::warn!(epoch = self.epochs, cross_entropy, "non-finite reconstruction cross-entropy");
        }

        let metrics = EpochMetrics {
            epoch: self.epochs,
            cross_entropy,
            mean_weight_gradient_norm: total_norm / num_batches as f64,
            num_batches,
            num_samples,
            elapsed_secs: epoch_start.elapsed().as_secs_f64(),
        };
        tracing::debug!(
            epoch = metrics.epoch,
            cross_entropy,
            num_batches,
            "epoch complete"
        );

        let event = EpochEvent {
            metrics: &metrics,
            config: &self.config,
            params: rbm.params(),
        };
        for observer in &mut self.observers {
            if let Err(error) = observer.on_epoch(&event) {
                tracing::warn!(epoch = metrics.epoch, %error, "observer failed on epoch");
            }
        }
        Ok(metrics)
    }
}

/// Gather the given rows of `data` into a new batch.
fn extract_batch(data: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut batch = Array2::zeros((indices.len(), data.ncols()));
    for (local_idx, &global_idx) in indices.iter().enumerate() {
        batch.row_mut(local_idx).assign(&data.row(global_idx));
    }
    batch
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::BernoulliSampler;
    use crate::CrossEntropyForm;
    use approx::assert_abs_diff_eq;
    use std::sync::{Arc, Mutex};

    fn zero_scenario() -> Rbm {
        Rbm::zeros(4, 3, 17).expect("create RBM")
    }

    #[test]
    fn test_compute_gradients_fixed_samples() {
        let input = Array2::from_elem((2, 4), 0.5);
        let positive = Array2::ones((2, 3));
        let last = GibbsStep {
            visible_mean: Array2::from_elem((2, 4), 0.5),
            visible_sample: Array2::zeros((2, 4)),
            hidden_mean: Array2::from_elem((2, 3), 0.5),
            hidden_sample: Array2::zeros((2, 3)),
        };
        let grads = compute_gradients(&input, &positive, &last);
        assert_eq!(grads.weights, Array2::from_elem((4, 3), 1.0));
        assert_eq!(grads.visible_bias, Array1::from_elem(4, 0.5));
        assert_eq!(grads.hidden_bias, Array1::from_elem(3, 0.5));
    }

    #[test]
    fn test_apply_gradients_bias_rules() {
        let grads = CdGradients {
            weights: Array2::from_elem((2, 1), 1.0),
            visible_bias: Array1::from_elem(2, 2.0),
            hidden_bias: Array1::from_elem(1, 3.0),
        };

        let mut overwrite = RbmParams::zeros(2, 1);
        overwrite.visible_bias.fill(10.0);
        overwrite.hidden_bias.fill(10.0);
        apply_gradients(&mut overwrite, &grads, 0.5, VisibleBiasUpdate::Overwrite);
        assert_eq!(overwrite.visible_bias, Array1::from_elem(2, 1.0));
        assert_eq!(overwrite.hidden_bias, Array1::from_elem(1, 11.5));
        assert_eq!(overwrite.weights, Array2::from_elem((2, 1), 0.5));

        let mut accumulate = RbmParams::zeros(2, 1);
        accumulate.visible_bias.fill(10.0);
        apply_gradients(&mut accumulate, &grads, 0.5, VisibleBiasUpdate::Accumulate);
        assert_eq!(accumulate.visible_bias, Array1::from_elem(2, 11.0));
    }

    #[test]
    fn test_invalid_hyperparameters_leave_model_untouched() {
        let mut rbm = Rbm::uniform(4, 3, 1).expect("create RBM");
        let before = rbm.clone();
        let input = Array2::from_elem((2, 4), 0.5);

        assert!(matches!(
            contrastive_divergence(&mut rbm, 0.0, 1, Some(&input)),
            Err(RbmError::InvalidParameter(_))
        ));
        assert!(matches!(
            contrastive_divergence(&mut rbm, f64::NAN, 1, Some(&input)),
            Err(RbmError::InvalidParameter(_))
        ));
        assert!(matches!(
            contrastive_divergence(&mut rbm, 0.1, 0, Some(&input)),
            Err(RbmError::InvalidParameter(_))
        ));
        assert_eq!(rbm.params(), before.params());
        assert!(rbm.input().is_none());
    }

    #[test]
    fn test_dimension_mismatch_leaves_model_untouched() {
        let stored = Array2::from_elem((2, 4), 1.0);
        let mut rbm = Rbm::with_input(
            stored.clone(),
            4,
            3,
            RbmParams::zeros(4, 3),
            BernoulliSampler::seeded(3),
        )
        .expect("create RBM");
        let mut twin = rbm.clone();

        let wide = Array2::from_elem((2, 5), 0.5);
        assert!(matches!(
            contrastive_divergence(&mut rbm, 0.1, 1, Some(&wide)),
            Err(RbmError::DimensionMismatch(_))
        ));
        assert_eq!(rbm.params(), &RbmParams::zeros(4, 3));
        assert_eq!(rbm.input(), Some(&stored));

        // Sampler state is untouched: both models now draw identical chains.
        let a = contrastive_divergence(&mut rbm, 0.1, 1, None).expect("cd");
        let b = contrastive_divergence(&mut twin, 0.1, 1, None).expect("cd");
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_input_rejected() {
        let mut rbm = zero_scenario();
        assert!(matches!(
            contrastive_divergence(&mut rbm, 0.1, 1, None),
            Err(RbmError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let mut rbm = zero_scenario();
        let empty = Array2::zeros((0, 4));
        assert!(matches!(
            contrastive_divergence(&mut rbm, 0.1, 1, Some(&empty)),
            Err(RbmError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_supplied_input_replaces_stored() {
        let mut rbm = zero_scenario();
        let first = Array2::from_elem((2, 4), 0.5);
        let second = Array2::from_elem((3, 4), 1.0);
        contrastive_divergence(&mut rbm, 0.1, 1, Some(&first)).expect("cd");
        assert_eq!(rbm.input(), Some(&first));
        contrastive_divergence(&mut rbm, 0.1, 1, Some(&second)).expect("cd");
        assert_eq!(rbm.input(), Some(&second));
        contrastive_divergence(&mut rbm, 0.1, 1, None).expect("cd");
        assert_eq!(rbm.input(), Some(&second));
    }

    #[test]
    fn test_zero_scenario_gradient_values() {
        let mut rbm = zero_scenario();
        let input = Array2::from_elem((2, 4), 0.5);
        let lr = 0.1;
        let grads = contrastive_divergence(&mut rbm, lr, 1, Some(&input)).expect("cd");

        // With zero parameters every mean is 0.5, so each bias gradient entry is
        // a mean of two terms from {-0.5, 0.5}.
        for &g in grads.visible_bias.iter().chain(grads.hidden_bias.iter()) {
            assert!(g == -0.5 || g == 0.0 || g == 0.5, "unexpected gradient {}", g);
        }
        assert_eq!(rbm.params().visible_bias, lr * &grads.visible_bias);
        assert_eq!(rbm.params().hidden_bias, lr * &grads.hidden_bias);
        assert_eq!(rbm.params().weights, lr * &grads.weights);
    }

    #[test]
    fn test_k_steps_shapes_preserved() {
        let mut rbm = Rbm::uniform(6, 4, 2).expect("create RBM");
        let input = Array2::from_elem((5, 6), 1.0);
        for k in [1, 3, 10] {
            contrastive_divergence(&mut rbm, 0.05, k, Some(&input)).expect("cd");
            assert_eq!(rbm.params().weights.dim(), (6, 4));
            assert_eq!(rbm.params().hidden_bias.len(), 4);
            assert_eq!(rbm.params().visible_bias.len(), 6);
        }
    }

    #[test]
    fn test_generative_layer_trait() {
        let mut rbm = Rbm::uniform(4, 2, 12).expect("create RBM");
        let layer: &mut dyn GenerativeLayer = &mut rbm;
        let input = Array2::from_elem((2, 4), 1.0);
        assert_eq!(layer.n_visible(), 4);
        assert_eq!(layer.prop_up(&input).expect("up").dim(), (2, 2));
        assert!(layer.train(0.1, 1, Some(&input)).is_ok());
    }

    #[derive(Default)]
    struct Recorder {
        steps: Vec<usize>,
        epochs: Vec<usize>,
    }

    struct SharedRecorder(Arc<Mutex<Recorder>>);

    impl TrainingObserver for SharedRecorder {
        fn on_step(&mut self, event: &StepEvent<'_>) -> RbmResult<()> {
            self.0.lock().expect("lock").steps.push(event.batch_size);
            Ok(())
        }

        fn on_epoch(&mut self, event: &EpochEvent<'_>) -> RbmResult<()> {
            self.0.lock().expect("lock").epochs.push(event.metrics.epoch);
            Ok(())
        }
    }

    #[test]
    fn test_trainer_epoch_batches_and_observers() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let config = Config {
            batch_size: 4,
            ..Config::default()
        };
        let mut trainer = Trainer::new(config)
            .expect("trainer")
            .with_observer(Box::new(SharedRecorder(Arc::clone(&recorder))));

        let mut rbm = Rbm::uniform(6, 3, 4).expect("create RBM");
        let data = crate::data::bars_and_stripes(2).expect("data");
        let data = ndarray::concatenate(ndarray::Axis(0), &[data.view(), data.view()])
            .expect("concat");
        let metrics = trainer.train_epoch(&mut rbm, &data, true);
        assert!(metrics.is_err(), "bars_and_stripes(2) has 4 columns, model has 6");

        let mut rbm = Rbm::uniform(4, 3, 4).expect("create RBM");
        let metrics = trainer.train_epoch(&mut rbm, &data, true).expect("epoch");
        assert_eq!(metrics.num_samples, 12);
        assert_eq!(metrics.num_batches, 3);
        assert_eq!(metrics.epoch, 1);
        assert!(metrics.cross_entropy.is_finite());

        let recorded = recorder.lock().expect("lock");
        assert_eq!(recorded.steps, vec![4, 4, 4]);
        assert_eq!(recorded.epochs, vec![1]);
        assert_eq!(trainer.steps(), 3);
    }

    struct Failing;

    impl TrainingObserver for Failing {
        fn on_step(&mut self, _event: &StepEvent<'_>) -> RbmResult<()> {
            Err(RbmError::Storage("step sink unavailable".to_string()))
        }

        fn on_epoch(&mut self, _event: &EpochEvent<'_>) -> RbmResult<()> {
            Err(RbmError::Storage("epoch sink unavailable".to_string()))
        }
    }

    #[test]
    fn test_failing_observer_does_not_cut_epoch_short() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let config = Config {
            batch_size: 3,
            ..Config::default()
        };
        let mut trainer = Trainer::new(config)
            .expect("trainer")
            .with_observer(Box::new(Failing))
            .with_observer(Box::new(SharedRecorder(Arc::clone(&recorder))));

        let mut rbm = Rbm::uniform(4, 2, 9).expect("create RBM");
        let data = crate::data::bars_and_stripes(2).expect("data");
        let metrics = trainer.train_epoch(&mut rbm, &data, false).expect("epoch");

        assert_eq!(metrics.epoch, 1);
        assert_eq!(trainer.epochs(), 1);
        assert_eq!(trainer.steps(), 2);
        let recorded = recorder.lock().expect("lock");
        assert_eq!(recorded.steps, vec![3, 3]);
        assert_eq!(recorded.epochs, vec![1]);
    }

    #[test]
    fn test_trainer_partial_last_batch() {
        let config = Config {
            batch_size: 5,
            ..Config::default()
        };
        let mut trainer = Trainer::new(config).expect("trainer");
        let mut rbm = Rbm::uniform(4, 2, 4).expect("create RBM");
        let data = Array2::from_elem((7, 4), 1.0);
        let metrics = trainer.train_epoch(&mut rbm, &data, false).expect("epoch");
        assert_eq!(metrics.num_batches, 2);
        assert_eq!(rbm.input().map(|b| b.nrows()), Some(2));
    }

    #[test]
    fn test_trainer_uses_configured_rules() {
        let config = Config {
            visible_bias_update: VisibleBiasUpdate::Accumulate,
            cross_entropy: CrossEntropyForm::LegacyMinimum,
            ..Config::default()
        };
        let mut trainer = Trainer::new(config).expect("trainer");
        let mut rbm = zero_scenario();
        let input = Array2::from_elem((2, 4), 0.5);
        let first = trainer.step(&mut rbm, Some(&input)).expect("step");
        let after_first = rbm.params().visible_bias.clone();
        let second = trainer.step(&mut rbm, None).expect("step");
        let expected = &after_first + &(0.1 * &second.visible_bias);
        assert_abs_diff_eq!(
            rbm.params().visible_bias.sum(),
            expected.sum(),
            epsilon = 1e-12
        );
        assert_eq!(after_first, 0.1 * &first.visible_bias);
    }

    #[test]
    fn test_trainer_rejects_bad_config() {
        let config = Config {
            k: 0,
            ..Config::default()
        };
        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_extract_batch() {
        let data = ndarray::arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let batch = extract_batch(&data, &[2, 0]);
        assert_eq!(batch, ndarray::arr2(&[[5.0, 6.0], [1.0, 2.0]]));
    }
}
