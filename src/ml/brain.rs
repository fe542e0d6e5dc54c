// ============================================================
// Layer 5 — Training Brain (Strategy)
// ============================================================
// The Brain trait is the strategy seam between the engine and
// the model-specific training logic. The engine only knows how
// to iterate epochs and batches; everything that touches
// tensors — the forward pass, the objective, the optimiser
// step, the end-of-stage bookkeeping — lives behind this trait.
//
// ClassifierBrain is the concrete strategy for the sound
// classifier. Its fit protocol comes in two flavours:
//
//   mixed precision — the loss is multiplied by a running
//     scale factor before backward, so small gradients survive
//     reduced-precision arithmetic. Every gradient tensor is
//     then divided by the same factor before the optimiser
//     sees it, so clipping thresholds and adaptive moment
//     statistics operate on true gradient magnitudes.
//
//   full precision — plain backward and step.
//
// Both paths run every gradient through the GradientGuard
// before applying it; a non-finite loss skips the step.
//
// Reference: Rust Book §10 (Generic Types, Traits)
//            Burn Book §4 (Custom Training Loops)

use anyhow::{Context, Result};
use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::ClipBatch;
use crate::domain::traits::{StatRecord, StatValue, TrainLogger};
use crate::infra::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::infra::metrics::render_confusion;
use crate::ml::guard::{GradientGuard, GuardVerdict};
use crate::ml::model::SoundClassifier;
use crate::ml::scaler::LossScaler;
use crate::ml::scheduler::EpochDecayScheduler;
use crate::ml::stage::{Stage, StageState};

// ─── Brain Trait ──────────────────────────────────────────────────────────────
/// Model-specific training strategy. The engine drives one of
/// these through the stage lifecycle without knowing anything
/// about the model, the optimiser or the metrics inside.
pub trait Brain {
    type Batch;
    type Predictions;
    type Loss;

    /// Run the model on one batch.
    fn forward(&self, batch: &Self::Batch, stage: Stage) -> Self::Predictions;

    /// Compute the loss and update the active stage's
    /// accumulators from the predictions.
    fn objective(
        &mut self,
        predictions: Self::Predictions,
        batch: &Self::Batch,
        stage: Stage,
    ) -> Self::Loss;

    /// One optimisation step. Returns the detached loss value.
    fn fit_batch(&mut self, batch: Self::Batch) -> Result<f64>;

    /// One gradient-free evaluation step. Returns the loss value.
    fn evaluate_batch(&mut self, batch: Self::Batch, stage: Stage) -> Result<f64>;

    /// Called by the engine when a stage begins.
    fn on_stage_start(&mut self, stage: Stage, epoch: Option<usize>);

    /// Called by the engine when a stage ends, with the average
    /// loss over the stage's batches.
    fn on_stage_end(&mut self, stage: Stage, avg_loss: f64, epoch: Option<usize>) -> Result<()>;
}

// ─── Loss Buffer ──────────────────────────────────────────────────────────────
/// Collects per-step losses between log emissions. Flushing
/// returns the mean and empties the buffer, so each emission
/// covers exactly the steps since the previous one.
#[derive(Debug, Default)]
pub struct LossBuffer {
    values: Vec<f64>,
}

impl LossBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loss: f64) {
        self.values.push(loss);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the buffered losses, or None when empty.
    /// The buffer is cleared either way.
    pub fn flush(&mut self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
        self.values.clear();
        Some(mean)
    }
}

// ─── Configuration and Run State ──────────────────────────────────────────────
/// Everything the fit protocol needs to know up front. Fixed
/// for the lifetime of the run; the mutable counters live in
/// RunState so the split between "settings" and "progress" is
/// visible in the types.
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub num_classes:        usize,
    pub mixed_precision:    bool,
    pub log_frequency:      usize,
    pub nonfinite_patience: usize,
    pub initial_lr:         f64,
    pub use_dashboard:      bool,
}

/// Mutable progress of the run: counters, the loss buffer, the
/// gradient guard and the loss scaler.
pub struct RunState {
    pub datapoints_seen: u64,
    pub step:            usize,
    pub loss_buffer:     LossBuffer,
    pub guard:           GradientGuard,
    pub scaler:          LossScaler,
    pub current_lr:      f64,
}

impl RunState {
    fn new(cfg: &StepConfig) -> Self {
        Self {
            datapoints_seen: 0,
            step:            0,
            loss_buffer:     LossBuffer::new(),
            guard:           GradientGuard::new(cfg.nonfinite_patience),
            scaler:          LossScaler::new(65536.0),
            current_lr:      cfg.initial_lr,
        }
    }
}

// ─── Gradient Unscaling ───────────────────────────────────────────────────────
/// Divide every gradient tensor by the loss scale. The walk goes
/// over the module's float parameters so each gradient's rank is
/// known; gradients live on the inner (non-autodiff) backend.
fn unscale_grads<B, M>(grads: GradientsParams, module: &M, scale: f64) -> GradientsParams
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    struct Unscale<B: AutodiffBackend> {
        grads:     GradientsParams,
        unscaled:  GradientsParams,
        inv_scale: f64,
        _backend:  std::marker::PhantomData<B>,
    }

    impl<B: AutodiffBackend> ModuleVisitor<B> for Unscale<B> {
        fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
            if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
                self.unscaled.register(id, grad.mul_scalar(self.inv_scale));
            }
        }
    }

    let mut visitor = Unscale::<B> {
        grads,
        unscaled:  GradientsParams::new(),
        inv_scale: 1.0 / scale,
        _backend:  std::marker::PhantomData,
    };
    module.visit(&mut visitor);
    visitor.unscaled
}

// ─── ClassifierBrain ──────────────────────────────────────────────────────────
/// The concrete strategy for the sound classifier. Owns the
/// model, the optimiser and all end-of-stage reporting.
pub struct ClassifierBrain<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SoundClassifier<B>, B>,
{
    model:        SoundClassifier<B>,
    optim:        O,
    cfg:          StepConfig,
    run:          RunState,
    stage_state:  StageState,
    scheduler:    EpochDecayScheduler,
    checkpoints:  CheckpointManager,
    logger:       Box<dyn TrainLogger>,
    class_labels: Vec<String>,
    /// (avg loss, accuracy) stashed at the end of TRAIN so the
    /// VALID summary can report both stages in one record.
    train_stats:  Option<(f64, f64)>,
    loaded_epoch: Option<usize>,
}

impl<B, O> ClassifierBrain<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SoundClassifier<B>, B>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model:        SoundClassifier<B>,
        optim:        O,
        cfg:          StepConfig,
        scheduler:    EpochDecayScheduler,
        checkpoints:  CheckpointManager,
        logger:       Box<dyn TrainLogger>,
        class_labels: Vec<String>,
    ) -> Self {
        let run = RunState::new(&cfg);
        Self {
            model,
            optim,
            cfg,
            run,
            stage_state: StageState::Idle,
            scheduler,
            checkpoints,
            logger,
            class_labels,
            train_stats: None,
            loaded_epoch: None,
        }
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    /// Swap the current weights for the best stored checkpoint.
    pub fn restore_best(&mut self, device: &B::Device) -> Result<()> {
        let (model, meta) = self.checkpoints.load_best(self.model.clone(), device)?;
        self.model = model;
        self.loaded_epoch = Some(meta.epoch);
        Ok(())
    }

    /// Extract class predictions and truths as plain indices.
    fn decode_batch(
        predictions: &Tensor<B, 3>,
        batch: &ClipBatch<B>,
    ) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let [b, _, _] = predictions.dims();
        let y_pred: Vec<usize> = predictions
            .clone()
            .argmax(2)
            .reshape([b as i32])
            .into_data()
            .iter::<i64>()
            .map(|v| v as usize)
            .collect();
        let y_true: Vec<usize> = batch
            .labels
            .clone()
            .into_data()
            .iter::<i64>()
            .map(|v| v as usize)
            .collect();
        let lengths: Vec<f64> = batch
            .lengths
            .clone()
            .into_data()
            .iter::<f32>()
            .map(f64::from)
            .collect();
        (y_pred, y_true, lengths)
    }

    /// Emit buffered train losses every `log_frequency` steps.
    fn maybe_emit_buffer(&mut self) -> Result<()> {
        let freq = self.cfg.log_frequency;
        if freq == 0 || self.run.step <= 1 || self.run.step % freq != 0 {
            return Ok(());
        }
        if let Some(avg) = self.run.loss_buffer.flush() {
            let record = StatRecord::new()
                .with_meta("datapoints_seen", StatValue::Int(self.run.datapoints_seen))
                .with_group(
                    "train",
                    vec![("buffer-loss".to_string(), StatValue::Float(avg))],
                );
            self.logger.log_stats(&record)?;
        }
        Ok(())
    }
}

impl<B, O> Brain for ClassifierBrain<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SoundClassifier<B>, B>,
{
    type Batch = ClipBatch<B>;
    type Predictions = Tensor<B, 3>;
    type Loss = Tensor<B, 1>;

    fn forward(&self, batch: &Self::Batch, _stage: Stage) -> Self::Predictions {
        self.model.forward(batch.signals.clone(), batch.lengths.clone())
    }

    fn objective(
        &mut self,
        predictions: Self::Predictions,
        batch: &Self::Batch,
        _stage: Stage,
    ) -> Self::Loss {
        let [b, _, c] = predictions.dims();
        let (y_pred, y_true, lengths) = Self::decode_batch(&predictions, batch);

        match &mut self.stage_state {
            StageState::Idle => {}
            StageState::Train { accuracy } => {
                accuracy.append(&y_pred, &y_true, &lengths);
            }
            StageState::Valid { accuracy, confusion }
            | StageState::Test { accuracy, confusion } => {
                accuracy.append(&y_pred, &y_true, &lengths);
                confusion.accumulate(&y_true, &y_pred);
            }
        }

        let logits = predictions.reshape([b as i32, c as i32]);
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, batch.labels.clone())
    }

    fn fit_batch(&mut self, batch: Self::Batch) -> Result<f64> {
        self.run.step += 1;
        let batch_size = batch.batch_size() as u64;

        let predictions = self.forward(&batch, Stage::Train);
        let loss = self.objective(predictions, &batch, Stage::Train);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        if self.cfg.mixed_precision {
            // Scale the loss for the backward pass only; the
            // gradients are unscaled again before the optimiser
            // clips and steps, so the update itself is unchanged.
            let scale = self.run.scaler.scale();
            let grads = loss.mul_scalar(scale).backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            let grads = unscale_grads(grads, &self.model, scale);

            match self.run.guard.check(loss_value, &self.model)? {
                GuardVerdict::Proceed => {
                    self.model = self.optim.step(self.run.current_lr, self.model.clone(), grads);
                    self.run.datapoints_seen += batch_size;
                    self.run.scaler.update(true);
                }
                GuardVerdict::Skip => {
                    self.run.scaler.update(false);
                }
            }
        } else {
            // Burn rebuilds gradients on every backward call, so
            // there is no stale-gradient state to clear here.
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);

            match self.run.guard.check(loss_value, &self.model)? {
                GuardVerdict::Proceed => {
                    self.model = self.optim.step(self.run.current_lr, self.model.clone(), grads);
                    self.run.datapoints_seen += batch_size;
                }
                GuardVerdict::Skip => {}
            }
        }

        self.run.loss_buffer.push(loss_value);
        self.maybe_emit_buffer()?;
        Ok(loss_value)
    }

    fn evaluate_batch(&mut self, batch: Self::Batch, stage: Stage) -> Result<f64> {
        let predictions = self.forward(&batch, stage);
        let loss = self.objective(predictions, &batch, stage);
        Ok(loss.into_scalar().elem::<f64>())
    }

    fn on_stage_start(&mut self, stage: Stage, _epoch: Option<usize>) {
        if stage == Stage::Train {
            self.run.step = 0;
        }
        self.stage_state = StageState::start(stage, self.cfg.num_classes);
    }

    fn on_stage_end(&mut self, stage: Stage, avg_loss: f64, epoch: Option<usize>) -> Result<()> {
        let finished = std::mem::replace(&mut self.stage_state, StageState::Idle);

        match (stage, finished) {
            (Stage::Train, StageState::Train { accuracy }) => {
                self.train_stats = Some((avg_loss, accuracy.summarize()));
            }

            (Stage::Valid, StageState::Valid { accuracy, confusion }) => {
                let epoch = epoch.context("VALID stage requires an epoch number")?;
                let valid_acc = accuracy.summarize();

                let (old_lr, new_lr) = self.scheduler.step(epoch);
                self.run.current_lr = new_lr;

                let (train_loss, train_acc) =
                    self.train_stats.take().unwrap_or((f64::NAN, f64::NAN));

                let mut valid_group = vec![
                    ("loss".to_string(), StatValue::Float(avg_loss)),
                    ("acc".to_string(), StatValue::Float(valid_acc)),
                ];
                if self.cfg.use_dashboard {
                    valid_group.push((
                        "confusion".to_string(),
                        StatValue::Text(render_confusion(&confusion, &self.class_labels)),
                    ));
                }

                let record = StatRecord::new()
                    .with_meta("epoch", StatValue::Int(epoch as u64))
                    .with_meta("lr", StatValue::Float(old_lr))
                    .with_meta("datapoints_seen", StatValue::Int(self.run.datapoints_seen))
                    .with_group(
                        "train",
                        vec![
                            ("loss".to_string(), StatValue::Float(train_loss)),
                            ("acc".to_string(), StatValue::Float(train_acc)),
                        ],
                    )
                    .with_group("valid", valid_group);
                self.logger.log_stats(&record)?;

                self.checkpoints.save_and_keep_only(
                    &self.model,
                    CheckpointMeta { epoch, acc: valid_acc },
                )?;
            }

            (Stage::Test, StageState::Test { accuracy, confusion }) => {
                let test_acc = accuracy.summarize();
                let figure = render_confusion(&confusion, &self.class_labels);

                let record = if self.cfg.use_dashboard {
                    StatRecord::new()
                        .with_group(
                            "test",
                            vec![
                                ("loss".to_string(), StatValue::Float(avg_loss)),
                                ("acc".to_string(), StatValue::Float(test_acc)),
                                ("confusion".to_string(), StatValue::Text(figure)),
                            ],
                        )
                } else {
                    let per_class = confusion
                        .per_class_accuracy()
                        .iter()
                        .enumerate()
                        .map(|(k, acc)| {
                            let label = self
                                .class_labels
                                .get(k)
                                .map(String::as_str)
                                .unwrap_or("?");
                            format!("{label}: {acc:.3}")
                        })
                        .collect::<Vec<_>>()
                        .join("\n");

                    let mut record = StatRecord::new();
                    if let Some(epoch) = self.loaded_epoch {
                        record = record.with_meta("epoch_loaded", StatValue::Int(epoch as u64));
                    }
                    record
                        .with_meta("per_class_acc", StatValue::Text(per_class))
                        .with_meta("confusion", StatValue::Text(figure))
                        .with_group(
                            "test",
                            vec![
                                ("loss".to_string(), StatValue::Float(avg_loss)),
                                ("acc".to_string(), StatValue::Float(test_acc)),
                            ],
                        )
                };
                self.logger.log_stats(&record)?;
            }

            // A stage ended that never started; nothing to report.
            (_, _) => {
                tracing::warn!("Stage {} ended without matching accumulators", stage.as_str());
            }
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;
    use std::sync::{Arc, Mutex};

    use crate::data::batcher::ClipBatcher;
    use crate::data::dataset::ClipSample;
    use crate::ml::model::SoundClassifierConfig;

    type TestBackend = Autodiff<NdArray>;

    /// Captures every record for assertions.
    struct RecordingLogger {
        records: Arc<Mutex<Vec<StatRecord>>>,
    }

    impl TrainLogger for RecordingLogger {
        fn log_stats(&self, record: &StatRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn tiny_batch(device: &<TestBackend as Backend>::Device) -> ClipBatch<TestBackend> {
        use burn::data::dataloader::batcher::Batcher;

        let samples = vec![
            ClipSample {
                id:            "a".to_string(),
                signal:        vec![0.1; 64],
                sample_rate:   16_000,
                class_name:    "siren".to_string(),
                encoded_label: 0,
            },
            ClipSample {
                id:            "b".to_string(),
                signal:        vec![-0.2; 48],
                sample_rate:   16_000,
                class_name:    "drilling".to_string(),
                encoded_label: 1,
            },
        ];
        ClipBatcher::new(device.clone()).batch(samples)
    }

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> SoundClassifier<TestBackend> {
        SoundClassifierConfig::new(3)
            .with_n_feats(4)
            .with_frame_len(8)
            .with_hop(4)
            .with_embed_dim(8)
            .init::<TestBackend>(device)
    }

    fn brain_with(
        model:           SoundClassifier<TestBackend>,
        mixed_precision: bool,
        dir:             &std::path::Path,
        records:         Arc<Mutex<Vec<StatRecord>>>,
    ) -> ClassifierBrain<
        TestBackend,
        impl Optimizer<SoundClassifier<TestBackend>, TestBackend>,
    > {
        let optim = AdamConfig::new().init();
        let cfg = StepConfig {
            num_classes:        3,
            mixed_precision,
            log_frequency:      2,
            nonfinite_patience: 2,
            initial_lr:         1e-3,
            use_dashboard:      false,
        };
        ClassifierBrain::new(
            model,
            optim,
            cfg,
            EpochDecayScheduler::new(1e-3, 0.5, 0),
            CheckpointManager::new(dir),
            Box::new(RecordingLogger { records }),
            vec!["siren".to_string(), "drilling".to_string(), "music".to_string()],
        )
    }

    fn tiny_brain(
        dir: &std::path::Path,
        records: Arc<Mutex<Vec<StatRecord>>>,
    ) -> ClassifierBrain<
        TestBackend,
        impl Optimizer<SoundClassifier<TestBackend>, TestBackend>,
    > {
        brain_with(tiny_model(&Default::default()), false, dir, records)
    }

    #[test]
    fn test_loss_buffer_flush_returns_mean_and_clears() {
        let mut buffer = LossBuffer::new();
        for v in [0.5, 0.3, 0.4, 0.2] {
            buffer.push(v);
        }
        let mean = buffer.flush().unwrap();
        assert!((mean - 0.35).abs() < 1e-12);
        assert!(buffer.is_empty());
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_fit_batch_advances_counters_and_emits_buffer() {
        let dir = std::env::temp_dir()
            .join(format!("urbansound-cls-brain-{}", std::process::id()));
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut brain = tiny_brain(&dir, records.clone());
        let device = Default::default();

        brain.on_stage_start(Stage::Train, Some(1));
        let loss1 = brain.fit_batch(tiny_batch(&device)).unwrap();
        let loss2 = brain.fit_batch(tiny_batch(&device)).unwrap();
        assert!(loss1.is_finite() && loss2.is_finite());

        assert_eq!(brain.run_state().step, 2);
        assert_eq!(brain.run_state().datapoints_seen, 4);

        // log_frequency = 2: exactly one buffer emission so far,
        // carrying the mean of both step losses.
        let emitted = records.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        let (group, stats) = &emitted[0].groups[0];
        assert_eq!(group, "train");
        match &stats[0] {
            (name, StatValue::Float(avg)) => {
                assert_eq!(name, "buffer-loss");
                assert!((avg - (loss1 + loss2) / 2.0).abs() < 1e-9);
            }
            other => panic!("unexpected stat {other:?}"),
        }
    }

    #[test]
    fn test_scaled_fit_updates_like_unscaled_fit() {
        let dir = std::env::temp_dir()
            .join(format!("urbansound-cls-brain-amp-{}", std::process::id()));
        let device = Default::default();

        // Same starting weights for both fit modes
        let model = tiny_model(&device);
        let w0 = model.filterbank.weight.val();

        let mut full = brain_with(model.clone(), false, &dir, Arc::new(Mutex::new(Vec::new())));
        let mut amp  = brain_with(model,          true,  &dir, Arc::new(Mutex::new(Vec::new())));

        full.on_stage_start(Stage::Train, Some(1));
        amp.on_stage_start(Stage::Train, Some(1));
        full.fit_batch(tiny_batch(&device)).unwrap();
        amp.fit_batch(tiny_batch(&device)).unwrap();

        let delta = |m: &SoundClassifier<TestBackend>| -> f64 {
            (m.filterbank.weight.val() - w0.clone())
                .abs()
                .sum()
                .into_scalar()
                .elem()
        };
        let d_full = delta(&full.model);
        let d_amp  = delta(&amp.model);

        // The loss scale (a power of two) must cancel exactly:
        // scaling the loss and unscaling the gradients leaves the
        // Adam update the same as the plain path.
        assert!(d_full > 0.0);
        assert!(
            ((d_amp - d_full) / d_full).abs() < 1e-4,
            "scaled update {d_amp} diverges from unscaled update {d_full}"
        );
    }

    #[test]
    fn test_train_stage_end_stashes_stats_for_valid_summary() {
        let dir = std::env::temp_dir()
            .join(format!("urbansound-cls-brain2-{}", std::process::id()));
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut brain = tiny_brain(&dir, records.clone());
        let device = Default::default();

        brain.on_stage_start(Stage::Train, Some(1));
        brain.fit_batch(tiny_batch(&device)).unwrap();
        brain.on_stage_end(Stage::Train, 1.2, Some(1)).unwrap();
        assert!(brain.train_stats.is_some());

        brain.on_stage_start(Stage::Valid, Some(1));
        brain.evaluate_batch(tiny_batch(&device), Stage::Valid).unwrap();
        brain.on_stage_end(Stage::Valid, 1.1, Some(1)).unwrap();
        assert!(brain.train_stats.is_none());

        // The VALID summary carries both stage groups.
        let emitted = records.lock().unwrap();
        let summary = emitted.last().unwrap();
        let groups: Vec<&str> = summary.groups.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(groups, vec!["train", "valid"]);
    }

    #[test]
    fn test_valid_stage_requires_epoch() {
        let dir = std::env::temp_dir()
            .join(format!("urbansound-cls-brain3-{}", std::process::id()));
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut brain = tiny_brain(&dir, records);

        brain.on_stage_start(Stage::Valid, None);
        assert!(brain.on_stage_end(Stage::Valid, 1.0, None).is_err());
    }
}
