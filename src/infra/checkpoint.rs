// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder,
// with best-by-accuracy retention.
//
// What lives in the checkpoint directory:
//   classifier_epoch_{e}.mpk.gz — weights saved after epoch e
//   registry.json               — [{epoch, acc}] for stored files
//   train_config.json           — the full run configuration
//
// Retention policy: after every save, all checkpoints except
// the one with the highest recorded validation accuracy are
// deleted (ties go to the newer save). Evaluation then loads
// "the best checkpoint" without needing to know epoch numbers.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Compresses with gzip for smaller file size
//   - Type-safe: loading fails if architecture doesn't match
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::SoundClassifier;

/// What a stored checkpoint is tagged with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub acc:   f64,
}

/// Index of the entry retention should keep: highest accuracy,
/// ties resolved towards the later entry.
pub fn best_entry(entries: &[CheckpointMeta]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, e) in entries.iter().enumerate() {
        best = match best {
            Some(b) if entries[b].acc > e.acc => Some(b),
            _ => Some(i),
        };
    }
    best
}

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager.
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    fn weights_stem(epoch: usize) -> String {
        format!("classifier_epoch_{epoch}")
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join("registry.json")
    }

    fn read_registry(&self) -> Result<Vec<CheckpointMeta>> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn write_registry(&self, entries: &[CheckpointMeta]) -> Result<()> {
        fs::write(self.registry_path(), serde_json::to_string_pretty(entries)?)
            .with_context(|| "Failed to write checkpoint registry")?;
        Ok(())
    }

    /// Save the model tagged with this epoch's validation
    /// accuracy, then delete every checkpoint that is not the
    /// best by accuracy.
    pub fn save_and_keep_only<B: Backend>(
        &self,
        model: &SoundClassifier<B>,
        meta:  CheckpointMeta,
    ) -> Result<()> {
        let path = self.dir.join(Self::weights_stem(meta.epoch));
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint '{}'", path.display()))?;

        let mut entries = self.read_registry()?;
        // A re-run of the same epoch overwrites its entry
        entries.retain(|e| e.epoch != meta.epoch);
        entries.push(meta);

        let kept = self.apply_retention(entries)?;
        tracing::debug!(
            "Checkpoint saved; retained epoch {} (acc {:.4})",
            kept[0].epoch,
            kept[0].acc
        );
        Ok(())
    }

    /// Delete all but the best entry's weights and persist the
    /// surviving registry. Returns the kept entries.
    pub fn apply_retention(&self, entries: Vec<CheckpointMeta>) -> Result<Vec<CheckpointMeta>> {
        let Some(best) = best_entry(&entries) else {
            self.write_registry(&entries)?;
            return Ok(entries);
        };
        let best_epoch = entries[best].epoch;

        for entry in entries.iter().filter(|e| e.epoch != best_epoch) {
            let file = self
                .dir
                .join(format!("{}.mpk.gz", Self::weights_stem(entry.epoch)));
            if let Err(e) = fs::remove_file(&file) {
                tracing::warn!("Could not delete old checkpoint '{}': {}", file.display(), e);
            }
        }

        let kept: Vec<CheckpointMeta> =
            entries.into_iter().filter(|e| e.epoch == best_epoch).collect();
        self.write_registry(&kept)?;
        Ok(kept)
    }

    /// Load the weights of the best stored checkpoint into the
    /// given (architecture-matching) model.
    pub fn load_best<B: Backend>(
        &self,
        model:  SoundClassifier<B>,
        device: &B::Device,
    ) -> Result<(SoundClassifier<B>, CheckpointMeta)> {
        let entries = self.read_registry()?;
        let best = best_entry(&entries)
            .ok_or_else(|| anyhow::anyhow!(
                "No checkpoint found in '{}'. Have you trained first?",
                self.dir.display()
            ))?;
        let meta = entries[best].clone();

        let path = self.dir.join(Self::weights_stem(meta.epoch));
        tracing::info!("Loading checkpoint from epoch {} (acc {:.4})", meta.epoch, meta.acc);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok((model.load_record(record), meta))
    }

    /// Save the training configuration to JSON.
    /// Evaluation reads it back to rebuild the exact model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// Load the training configuration from JSON.
    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'evaluate'.",
                    path.display()
                )
            })?;
        Ok(serde_json::from_str(&json)?)
    }
}
