// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-runs the held-out TEST pass without retraining:
//
//   Step 1: Load the saved train config  (Layer 6 - infra)
//   Step 2: Load the label encoder       (Layer 4 - data)
//   Step 3: Build the test dataset       (Layer 4 - data)
//   Step 4: Restore best + evaluate      (Layer 5 - ml)
//
// The model architecture comes from the saved config, so the
// checkpoint always matches what gets rebuilt here.
//
// Reference: Rust Book §9 (Recoverable Errors)

use anyhow::Result;
use std::path::PathBuf;

use crate::application::train_use_case::build_dataset;
use crate::data::encoder::CategoricalEncoder;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::trainer::run_evaluation;

pub struct EvaluateUseCase {
    output_dir: PathBuf,
}

impl EvaluateUseCase {
    /// Point the use case at the output directory of a finished
    /// (or interrupted) training run.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    /// Execute the evaluation pipeline end to end
    pub fn execute(&self) -> Result<()> {
        // ── Step 1: Load the saved training config ────────────────────────────
        let ckpt_manager = CheckpointManager::new(self.output_dir.join("checkpoints"));
        let cfg = ckpt_manager.load_config()?;
        tracing::info!("Loaded config for {} classes", cfg.num_classes());

        // ── Step 2: Load the label encoder from the training run ──────────────
        let encoder = CategoricalEncoder::load_or_create(
            &self.output_dir.join("label_encoder.json"),
            &cfg.task_classes,
        )?;

        // ── Step 3: Build the test dataset ────────────────────────────────────
        // The test manifest was written during training; decoding
        // goes through the same pipeline the trainer used.
        let test_manifest = self.output_dir.join("test.csv");
        let test_dataset = build_dataset(&test_manifest, &encoder, cfg.sample_rate)?;
        tracing::info!("Test dataset ready: {} clips", test_dataset.sample_count());

        // ── Step 4: Restore the best checkpoint and evaluate ──────────────────
        run_evaluation(&cfg, test_dataset, ckpt_manager, encoder.labels().to_vec())
    }
}
