//! Seedable elementwise Bernoulli sampling.
//!
//! Every model instance owns one [`BernoulliSampler`]. Its generator advances with
//! each draw, so two samplers built from the same seed produce identical sample
//! streams as long as they receive the same sequence of requests.

use ndarray::{Array2, Zip};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Draws binary samples from matrices of success probabilities.
#[derive(Debug, Clone)]
pub struct BernoulliSampler {
    rng: StdRng,
}

impl BernoulliSampler {
    /// Create a sampler with a fixed seed for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a sampler seeded from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Access the underlying generator, e.g. for parameter initialization.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// One Bernoulli trial per element: `1.0` with probability `p`, else `0.0`.
    ///
    /// A uniform draw `u ∈ [0, 1)` is compared against `p`, so `p <= 0` always
    /// yields 0 and `p >= 1` always yields 1. A NaN probability yields 0.
    pub fn sample(&mut self, probabilities: &Array2<f64>) -> Array2<f64> {
        let draws: Array2<f64> = Array2::random_using(
            probabilities.raw_dim(),
            Uniform::new(0.0, 1.0),
            &mut self.rng,
        );
        Zip::from(&draws)
            .and(probabilities)
            .map_collect(|&u, &p| if u < p { 1.0 } else { 0.0 })
    }
}
