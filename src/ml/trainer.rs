// ============================================================
// Layer 5 — Training Entry Point
// ============================================================
// Wires the concrete pieces together — model, Adam, data
// loaders, logger, scheduler, checkpoints — and hands them to
// the Engine as one ClassifierBrain. The use cases call only
// the two functions here.
//
// Backend note: validation and test loaders stay on the
// autodiff backend. evaluate_batch never calls backward, so no
// gradient tape is recorded and no second model copy is needed.
//
// Reference: Burn Book §4 (Custom Training Loops)
//            Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    optim::AdamConfig,
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::ClipBatcher, dataset::ClipDataset};
use crate::domain::traits::TrainLogger;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::logger::{DashboardLogger, StdoutLogger};
use crate::ml::brain::{ClassifierBrain, StepConfig};
use crate::ml::engine::Engine;
use crate::ml::model::SoundClassifierConfig;
use crate::ml::scheduler::EpochDecayScheduler;

type TrainingBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

fn model_config(cfg: &TrainConfig) -> SoundClassifierConfig {
    SoundClassifierConfig::new(cfg.num_classes())
        .with_n_feats(cfg.n_feats)
        .with_frame_len(cfg.frame_len)
        .with_hop(cfg.hop)
        .with_embed_dim(cfg.embed_dim)
        .with_amp_to_db(cfg.amp_to_db)
        .with_normalize(cfg.normalize)
}

fn make_logger(cfg: &TrainConfig) -> Result<Box<dyn TrainLogger>> {
    if cfg.use_dashboard {
        Ok(Box::new(DashboardLogger::new(std::path::Path::new(&cfg.output_dir))?))
    } else {
        Ok(Box::new(StdoutLogger::new()))
    }
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: ClipDataset,
    valid_dataset: ClipDataset,
    test_dataset:  ClipDataset,
    ckpt_manager:  CheckpointManager,
    class_labels:  Vec<String>,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    // ── Build model ───────────────────────────────────────────────────────────
    let model = model_config(cfg).init::<TrainingBackend>(&device);
    tracing::info!(
        "Model ready: {} feature channels, embed_dim={}",
        cfg.n_feats,
        cfg.embed_dim
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    // Norm clipping caps each update's total gradient length.
    let optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.max_grad_norm)))
        .init();

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_loader = DataLoaderBuilder::new(ClipBatcher::<TrainingBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(42)
        .num_workers(1)
        .build(train_dataset);

    let valid_loader = DataLoaderBuilder::new(ClipBatcher::<TrainingBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(valid_dataset);

    let test_loader = DataLoaderBuilder::new(ClipBatcher::<TrainingBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(test_dataset);

    // ── Brain + Engine ────────────────────────────────────────────────────────
    let step_cfg = StepConfig {
        num_classes:        cfg.num_classes(),
        mixed_precision:    cfg.mixed_precision,
        log_frequency:      cfg.log_frequency,
        nonfinite_patience: cfg.nonfinite_patience,
        initial_lr:         cfg.lr,
        use_dashboard:      cfg.use_dashboard,
    };
    let scheduler = EpochDecayScheduler::new(cfg.lr, cfg.lr_decay_factor, cfg.lr_decay_every);
    let brain = ClassifierBrain::new(
        model,
        optim,
        step_cfg,
        scheduler,
        ckpt_manager,
        make_logger(cfg)?,
        class_labels,
    );

    let mut engine = Engine::new(brain);
    engine.fit(cfg.epochs, &train_loader, &valid_loader)?;

    // Final report uses the best checkpoint, not the last epoch
    engine.hooks_mut().restore_best(&device)?;
    engine.evaluate(&test_loader)?;

    tracing::info!("Training complete!");
    Ok(())
}

/// Standalone evaluation of the best stored checkpoint on the
/// test split. Used by the `evaluate` subcommand.
pub fn run_evaluation(
    cfg:          &TrainConfig,
    test_dataset: ClipDataset,
    ckpt_manager: CheckpointManager,
    class_labels: Vec<String>,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    let model = model_config(cfg).init::<TrainingBackend>(&device);
    let optim = AdamConfig::new().with_epsilon(1e-8).init();

    let test_loader = DataLoaderBuilder::new(ClipBatcher::<TrainingBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(test_dataset);

    let step_cfg = StepConfig {
        num_classes:        cfg.num_classes(),
        mixed_precision:    cfg.mixed_precision,
        log_frequency:      cfg.log_frequency,
        nonfinite_patience: cfg.nonfinite_patience,
        initial_lr:         cfg.lr,
        use_dashboard:      cfg.use_dashboard,
    };
    let scheduler = EpochDecayScheduler::new(cfg.lr, cfg.lr_decay_factor, cfg.lr_decay_every);
    let brain = ClassifierBrain::new(
        model,
        optim,
        step_cfg,
        scheduler,
        ckpt_manager,
        make_logger(cfg)?,
        class_labels,
    );

    let mut engine = Engine::new(brain);
    engine.hooks_mut().restore_best(&device)?;
    engine.evaluate(&test_loader)
}
