//! Observers notified by the [`Trainer`](crate::training::Trainer).
//!
//! The numerical core never writes files or talks to storage itself. Anything
//! that wants to watch training (metric logs, parameter snapshots, dashboards)
//! implements [`TrainingObserver`] and is handed to the trainer.

use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::checkpoint::Checkpoint;
use crate::core::{RbmParams, RbmResult};
use crate::storage::{StatsStorage, StorageKey};
use crate::training::EpochMetrics;
use crate::Config;

/// Emitted after every successful CD step.
#[derive(Debug, Clone)]
pub struct StepEvent<'a> {
    /// 1-based step counter of the trainer
    pub step: usize,
    pub learning_rate: f64,
    pub k: usize,
    pub batch_size: usize,
    pub weight_gradient_norm: f64,
    pub visible_bias_gradient_norm: f64,
    pub hidden_bias_gradient_norm: f64,
    /// Parameters after the update
    pub params: &'a RbmParams,
}

/// Emitted after every completed epoch.
#[derive(Debug, Clone)]
pub struct EpochEvent<'a> {
    pub metrics: &'a EpochMetrics,
    pub config: &'a Config,
    /// Parameters at the end of the epoch
    pub params: &'a RbmParams,
}

/// Receives training progress. Both hooks default to doing nothing.
pub trait TrainingObserver {
    fn on_step(&mut self, _event: &StepEvent<'_>) -> RbmResult<()> {
        Ok(())
    }

    fn on_epoch(&mut self, _event: &EpochEvent<'_>) -> RbmResult<()> {
        Ok(())
    }
}

/// Writes one JSON object per line for every step and epoch.
pub struct JsonlObserver<W: Write> {
    writer: W,
    log_steps: bool,
}

impl<W: Write> JsonlObserver<W> {
    /// Log epochs only.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            log_steps: false,
        }
    }

    /// Also log every CD step.
    pub fn with_steps(mut self) -> Self {
        self.log_steps = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TrainingObserver for JsonlObserver<W> {
    fn on_step(&mut self, event: &StepEvent<'_>) -> RbmResult<()> {
        if !self.log_steps {
            return Ok(());
        }
        let line = serde_json::json!({
            "type": "step",
            "step": event.step,
            "learning_rate": event.learning_rate,
            "k": event.k,
            "batch_size": event.batch_size,
            "weight_gradient_norm": event.weight_gradient_norm,
            "visible_bias_gradient_norm": event.visible_bias_gradient_norm,
            "hidden_bias_gradient_norm": event.hidden_bias_gradient_norm,
        });
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    fn on_epoch(&mut self, event: &EpochEvent<'_>) -> RbmResult<()> {
        let m = event.metrics;
        let line = serde_json::json!({
            "type": "epoch",
            "epoch": m.epoch,
            "cross_entropy": m.cross_entropy,
            "mean_weight_gradient_norm": m.mean_weight_gradient_norm,
            "num_batches": m.num_batches,
            "num_samples": m.num_samples,
            "elapsed_secs": m.elapsed_secs,
        });
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Type id under which parameter snapshots are stored.
pub const PARAMS_TYPE_ID: &str = "rbm_params";
/// Type id under which the training configuration is stored.
pub const CONFIG_TYPE_ID: &str = "rbm_config";

/// Encoding tag written as storage metadata for [`PARAMS_TYPE_ID`].
pub const PARAMS_ENCODING: &str = "checkpoint_json";

/// Stores a parameter snapshot per epoch in a [`StatsStorage`].
///
/// The first epoch also records the configuration as static info and the
/// snapshot encoding as storage metadata.
pub struct StorageObserver {
    storage: Arc<dyn StatsStorage>,
    session_id: String,
    worker_id: String,
    header_written: bool,
    last_timestamp: u64,
}

impl StorageObserver {
    pub fn new(
        storage: Arc<dyn StatsStorage>,
        session_id: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            session_id: session_id.into(),
            worker_id: worker_id.into(),
            header_written: false,
            last_timestamp: 0,
        }
    }

    pub fn key(&self, type_id: &str) -> StorageKey {
        StorageKey::new(&self.session_id, type_id, &self.worker_id)
    }

    /// Wall-clock milliseconds, forced strictly increasing per observer.
    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self.last_timestamp = now.max(self.last_timestamp.saturating_add(1));
        self.last_timestamp
    }
}

impl TrainingObserver for StorageObserver {
    fn on_epoch(&mut self, event: &EpochEvent<'_>) -> RbmResult<()> {
        if !self.header_written {
            let metadata = serde_json::json!({
                "type_id": PARAMS_TYPE_ID,
                "encoding": PARAMS_ENCODING,
                "static_type_id": CONFIG_TYPE_ID,
            });
            self.storage.put_storage_metadata(
                &self.session_id,
                PARAMS_TYPE_ID,
                serde_json::to_vec(&metadata)?,
            )?;
            let bytes = serde_json::to_vec(event.config)?;
            self.storage
                .put_static_info(&self.key(CONFIG_TYPE_ID), bytes)?;
            self.header_written = true;
        }

        let snapshot = Checkpoint::from_params(
            event.metrics.epoch,
            event.metrics.cross_entropy,
            event.params.clone(),
        );
        let timestamp = self.next_timestamp();
        self.storage
            .put_update(&self.key(PARAMS_TYPE_ID), timestamp, snapshot.to_bytes()?)?;
        tracing::debug!(
            session = %self.session_id,
            worker = %self.worker_id,
            epoch = event.metrics.epoch,
            timestamp,
            "stored parameter snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStatsStorage;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            cross_entropy: 2.5,
            mean_weight_gradient_norm: 0.1,
            num_batches: 2,
            num_samples: 8,
            elapsed_secs: 0.01,
        }
    }

    #[test]
    fn test_jsonl_epoch_lines() {
        let params = RbmParams::zeros(2, 2);
        let config = Config::default();
        let mut observer = JsonlObserver::new(Vec::new());
        for epoch in 1..=2 {
            let m = metrics(epoch);
            let event = EpochEvent {
                metrics: &m,
                config: &config,
                params: &params,
            };
            observer.on_epoch(&event).unwrap();
        }
        let text = String::from_utf8(observer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["type"], "epoch");
        assert_eq!(parsed["epoch"], 2);
        assert_eq!(parsed["num_samples"], 8);
    }

    #[test]
    fn test_jsonl_steps_opt_in() {
        let params = RbmParams::zeros(2, 2);
        let event = StepEvent {
            step: 1,
            learning_rate: 0.1,
            k: 1,
            batch_size: 4,
            weight_gradient_norm: 0.0,
            visible_bias_gradient_norm: 0.0,
            hidden_bias_gradient_norm: 0.0,
            params: &params,
        };

        let mut quiet = JsonlObserver::new(Vec::new());
        quiet.on_step(&event).unwrap();
        assert!(quiet.into_inner().is_empty());

        let mut verbose = JsonlObserver::new(Vec::new()).with_steps();
        verbose.on_step(&event).unwrap();
        let text = String::from_utf8(verbose.into_inner()).unwrap();
        assert!(text.contains("\"type\":\"step\""));
    }

    #[test]
    fn test_storage_observer_writes_snapshots() {
        let storage = Arc::new(InMemoryStatsStorage::new());
        let mut observer = StorageObserver::new(storage.clone(), "session-a", "worker-0");
        let params = RbmParams::zeros(3, 2);
        let config = Config::default();

        for epoch in 1..=3 {
            let m = metrics(epoch);
            let event = EpochEvent {
                metrics: &m,
                config: &config,
                params: &params,
            };
            observer.on_epoch(&event).unwrap();
        }

        let key = observer.key(PARAMS_TYPE_ID);
        assert_eq!(storage.num_update_records(&key).unwrap(), 3);
        let (_, latest) = storage.latest_update(&key).unwrap().expect("latest");
        let checkpoint = Checkpoint::from_bytes(&latest).unwrap();
        assert_eq!(checkpoint.epoch, 3);
        assert_eq!(checkpoint.params, params);

        let stored_config = storage
            .get_static_info(&observer.key(CONFIG_TYPE_ID))
            .unwrap()
            .expect("config");
        let decoded: Config = serde_json::from_slice(&stored_config).unwrap();
        assert_eq!(decoded, config);

        let metadata = storage
            .get_storage_metadata("session-a", PARAMS_TYPE_ID)
            .unwrap()
            .expect("metadata");
        let metadata: serde_json::Value = serde_json::from_slice(&metadata).unwrap();
        assert_eq!(metadata["encoding"], PARAMS_ENCODING);
    }

    #[test]
    fn test_storage_observers_of_forked_workers_read_back_together() {
        let storage = Arc::new(InMemoryStatsStorage::new());
        let config = Config::default();
        let mut workers: Vec<StorageObserver> = ["worker-0", "worker-1"]
            .iter()
            .map(|w| StorageObserver::new(storage.clone(), "shared", *w))
            .collect();

        for epoch in 1..=2 {
            for (i, observer) in workers.iter_mut().enumerate() {
                let params = RbmParams::zeros(2, i + 1);
                let m = metrics(epoch);
                let event = EpochEvent {
                    metrics: &m,
                    config: &config,
                    params: &params,
                };
                observer.on_epoch(&event).unwrap();
            }
        }

        assert_eq!(
            storage
                .list_worker_ids_for_session_and_type("shared", PARAMS_TYPE_ID)
                .unwrap(),
            vec!["worker-0", "worker-1"]
        );
        assert_eq!(storage.num_update_records_for_session("shared").unwrap(), 4);
        let latest = storage
            .latest_update_all_workers("shared", PARAMS_TYPE_ID)
            .unwrap();
        assert_eq!(latest.len(), 2);
        for (i, record) in latest.iter().enumerate() {
            let snapshot = Checkpoint::from_bytes(&record.bytes).unwrap();
            assert_eq!(snapshot.epoch, 2);
            assert_eq!(snapshot.n_hidden, i + 1);
        }
        assert_eq!(
            storage
                .all_static_infos("shared", CONFIG_TYPE_ID)
                .unwrap()
                .len(),
            2
        );
    }
}
