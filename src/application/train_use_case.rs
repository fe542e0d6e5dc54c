// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Prepare split manifests   (Layer 4 - data)
//   Step 2: Load / create encoder     (Layer 4 - data)
//   Step 3: Decode + resample audio   (Layer 4 - data)
//   Step 4: Build datasets            (Layer 4 - data)
//   Step 5: Save config               (Layer 6 - infra)
//   Step 6: Run training loop         (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{
    dataset::{ClipDataset, ClipSample},
    encoder::CategoricalEncoder,
    manifest::prepare_split_manifests,
    manifest::ManifestReader,
    pipeline::AudioPipeline,
};
use crate::domain::traits::ClipSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be saved to disk and reloaded for
// evaluation. serde's derive macros handle the JSON round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:           String,
    pub output_dir:         String,
    pub task_classes:       Vec<String>,
    pub train_folds:        Vec<u32>,
    pub valid_folds:        Vec<u32>,
    pub test_folds:         Vec<u32>,
    pub sample_rate:        u32,
    pub batch_size:         usize,
    pub epochs:             usize,
    pub lr:                 f64,
    pub lr_decay_factor:    f64,
    pub lr_decay_every:     usize,
    pub n_feats:            usize,
    pub frame_len:          usize,
    pub hop:                usize,
    pub embed_dim:          usize,
    pub amp_to_db:          bool,
    pub normalize:          bool,
    pub mixed_precision:    bool,
    pub max_grad_norm:      f32,
    pub nonfinite_patience: usize,
    pub log_frequency:      usize,
    pub use_dashboard:      bool,
}

impl TrainConfig {
    pub fn num_classes(&self) -> usize {
        self.task_classes.len()
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:   "data/UrbanSound8K".to_string(),
            output_dir: "results/urbansound".to_string(),
            task_classes: [
                "air_conditioner",
                "car_horn",
                "children_playing",
                "dog_bark",
                "drilling",
                "engine_idling",
                "gun_shot",
                "jackhammer",
                "siren",
                "street_music",
            ]
            .map(String::from)
            .to_vec(),
            train_folds:        (1..=8).collect(),
            valid_folds:        vec![9],
            test_folds:         vec![10],
            sample_rate:        16_000,
            batch_size:         32,
            epochs:             25,
            lr:                 1e-3,
            lr_decay_factor:    0.5,
            lr_decay_every:     10,
            n_feats:            40,
            frame_len:          400,
            hop:                160,
            embed_dim:          128,
            amp_to_db:          true,
            normalize:          true,
            mixed_precision:    false,
            max_grad_norm:      5.0,
            nonfinite_patience: 3,
            log_frequency:      50,
            use_dashboard:      false,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    /// Create a new TrainUseCase with the given configuration
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        let data_dir   = PathBuf::from(&cfg.data_dir);
        let output_dir = PathBuf::from(&cfg.output_dir);

        // ── Step 1: Prepare the fold-based split manifests ────────────────────
        tracing::info!("Preparing manifests from '{}'", data_dir.display());
        let manifests = prepare_split_manifests(
            &data_dir,
            &output_dir,
            &cfg.task_classes,
            &cfg.train_folds,
            &cfg.valid_folds,
            &cfg.test_folds,
        )?;

        // ── Step 2: Load / create the label encoder ───────────────────────────
        // An encoder persisted by an earlier run wins, so label
        // indices stay stable across resumed experiments.
        let encoder = CategoricalEncoder::load_or_create(
            &output_dir.join("label_encoder.json"),
            &cfg.task_classes,
        )?;

        // ── Step 3 + 4: Decode audio and build Burn datasets ──────────────────
        // One pipeline per split so each keeps its own resampler
        // cache warm across consecutive same-rate clips.
        let train_dataset = build_dataset(&manifests.train, &encoder, cfg.sample_rate)?;
        let valid_dataset = build_dataset(&manifests.valid, &encoder, cfg.sample_rate)?;
        let test_dataset  = build_dataset(&manifests.test,  &encoder, cfg.sample_rate)?;
        tracing::info!(
            "Datasets ready: {} train, {} valid, {} test clips",
            train_dataset.sample_count(),
            valid_dataset.sample_count(),
            test_dataset.sample_count(),
        );

        // ── Step 5: Save config for evaluation ────────────────────────────────
        // The evaluate subcommand rebuilds the exact model from it
        let ckpt_manager = CheckpointManager::new(output_dir.join("checkpoints"));
        ckpt_manager.save_config(cfg)?;

        // ── Step 6: Run training loop (Layer 5) ───────────────────────────────
        run_training(
            cfg,
            train_dataset,
            valid_dataset,
            test_dataset,
            ckpt_manager,
            encoder.labels().to_vec(),
        )?;

        Ok(())
    }
}

// ─── Dataset Construction ─────────────────────────────────────────────────────
/// Decode every clip a manifest names into memory: read, downmix
/// to mono, resample to the working rate, encode the label.
pub fn build_dataset(
    manifest:    &Path,
    encoder:     &CategoricalEncoder,
    sample_rate: u32,
) -> Result<ClipDataset> {
    let reader = ManifestReader::new(manifest);
    let mut pipeline = AudioPipeline::new(sample_rate);

    let mut samples = Vec::new();
    for record in reader.records()? {
        let signal = pipeline
            .load(Path::new(&record.wav_path))
            .with_context(|| format!("Failed to load clip '{}'", record.wav_path))?;
        let encoded_label = encoder.encode_label(&record.class_name)?;

        samples.push(ClipSample {
            id: record.id,
            signal,
            sample_rate,
            class_name: record.class_name,
            encoded_label,
        });
    }

    tracing::debug!(
        "Manifest '{}': {} clips, {} resampler rebuilds",
        manifest.display(),
        samples.len(),
        pipeline.resampler_rebuilds(),
    );
    Ok(ClipDataset::new(samples))
}
