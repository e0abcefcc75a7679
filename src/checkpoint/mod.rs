//! JSON checkpoints of model parameters.
//!
//! A checkpoint holds the parameters plus a little training context. The sampler
//! state is not saved; a restored model gets a fresh sampler.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::{Rbm, RbmParams, RbmResult};
use crate::sampling::BernoulliSampler;

/// Serialized model snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Epoch at which the snapshot was taken
    pub epoch: usize,
    /// Reconstruction cross-entropy at that epoch; `None` if it was not finite
    pub cross_entropy: Option<f64>,
    pub n_visible: usize,
    pub n_hidden: usize,
    pub params: RbmParams,
}

impl Checkpoint {
    pub fn from_params(epoch: usize, cross_entropy: f64, params: RbmParams) -> Self {
        Self {
            epoch,
            cross_entropy: cross_entropy.is_finite().then_some(cross_entropy),
            n_visible: params.n_visible(),
            n_hidden: params.n_hidden(),
            params,
        }
    }

    pub fn from_rbm(rbm: &Rbm, epoch: usize, cross_entropy: f64) -> Self {
        Self::from_params(epoch, cross_entropy, rbm.params().clone())
    }

    /// Opaque blob form, as kept in stats storage.
    pub fn to_bytes(&self) -> RbmResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a blob and re-check parameter shapes.
    pub fn from_bytes(bytes: &[u8]) -> RbmResult<Self> {
        let checkpoint: Self = serde_json::from_slice(bytes)?;
        checkpoint.params.validate(checkpoint.n_visible, checkpoint.n_hidden)?;
        Ok(checkpoint)
    }

    /// Rebuild a model; `seed` of `None` seeds the sampler from OS entropy.
    pub fn into_rbm(self, seed: Option<u64>) -> RbmResult<Rbm> {
        let sampler = seed.map_or_else(BernoulliSampler::from_entropy, BernoulliSampler::seeded);
        Rbm::new(self.n_visible, self.n_hidden, self.params, sampler)
    }
}

/// Write `rbm`'s parameters to `path` as pretty JSON, creating parent directories.
pub fn save_checkpoint<P: AsRef<Path>>(
    rbm: &Rbm,
    path: P,
    epoch: usize,
    cross_entropy: f64,
) -> RbmResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let checkpoint = Checkpoint::from_rbm(rbm, epoch, cross_entropy);
    fs::write(path, serde_json::to_string_pretty(&checkpoint)?)?;
    Ok(())
}

/// Read a checkpoint and rebuild the model it describes.
pub fn load_checkpoint<P: AsRef<Path>>(path: P, seed: Option<u64>) -> RbmResult<(Checkpoint, Rbm)> {
    let bytes = fs::read(path)?;
    let checkpoint = Checkpoint::from_bytes(&bytes)?;
    let rbm = checkpoint.clone().into_rbm(seed)?;
    Ok((checkpoint, rbm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RbmError;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("epoch_003.json");
        let rbm = Rbm::uniform(5, 3, 7).unwrap();

        save_checkpoint(&rbm, &path, 3, 1.25).unwrap();
        let (checkpoint, restored) = load_checkpoint(&path, Some(1)).unwrap();

        assert_eq!(checkpoint.epoch, 3);
        assert_eq!(checkpoint.cross_entropy, Some(1.25));
        assert_eq!(restored.params(), rbm.params());
        assert_eq!(restored.n_visible(), 5);
        assert!(restored.input().is_none());
    }

    #[test]
    fn test_non_finite_cross_entropy_dropped() {
        let checkpoint = Checkpoint::from_params(1, f64::NAN, RbmParams::zeros(2, 2));
        assert_eq!(checkpoint.cross_entropy, None);
        let decoded = Checkpoint::from_bytes(&checkpoint.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, checkpoint);
    }

    #[test]
    fn test_non_finite_parameters_round_trip() {
        let mut params = RbmParams::zeros(2, 3);
        params.weights[[0, 0]] = f64::INFINITY;
        params.weights[[1, 2]] = f64::NAN;
        params.visible_bias[1] = f64::NEG_INFINITY;
        params.hidden_bias[0] = 0.25;
        let rbm = Rbm::new(2, 3, params, BernoulliSampler::seeded(4)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("degraded.json");
        save_checkpoint(&rbm, &path, 2, f64::NAN).unwrap();
        let (checkpoint, restored) = load_checkpoint(&path, Some(4)).unwrap();
        assert_eq!(checkpoint.cross_entropy, None);

        let weights = &restored.params().weights;
        assert_eq!(weights[[0, 0]], f64::INFINITY);
        assert!(weights[[1, 2]].is_nan());
        assert_eq!(weights[[0, 1]], 0.0);
        assert_eq!(restored.params().visible_bias[1], f64::NEG_INFINITY);
        assert_eq!(restored.params().hidden_bias[0], 0.25);

        let blob = Checkpoint::from_rbm(&rbm, 2, 1.0).to_bytes().unwrap();
        let decoded = Checkpoint::from_bytes(&blob).unwrap();
        assert_eq!(decoded.params.weights[[0, 0]], f64::INFINITY);
        assert!(decoded.params.weights[[1, 2]].is_nan());
    }

    #[test]
    fn test_inconsistent_shapes_rejected() {
        let mut checkpoint = Checkpoint::from_params(1, 0.5, RbmParams::zeros(2, 2));
        checkpoint.n_visible = 3;
        let bytes = checkpoint.to_bytes().unwrap();
        assert!(matches!(
            Checkpoint::from_bytes(&bytes),
            Err(RbmError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_checkpoint(dir.path().join("absent.json"), None),
            Err(RbmError::Io(_))
        ));
    }
}
