// ============================================================
// Layer 5 — Training Engine
// ============================================================
// The engine owns the outer loops and nothing else. It walks
// epochs and batches, averages stage losses and tells the
// Brain when stages begin and end. All tensor work happens
// behind the Brain trait, which is injected at construction —
// the engine would drive a regression brain just as happily.
//
// Stage order per epoch: TRAIN then VALID. TEST runs once,
// separately, after training via evaluate().
//
// Reference: Rust Book §10 (Traits as Parameters)

use anyhow::Result;
use burn::data::dataloader::DataLoader;
use std::sync::Arc;

use crate::ml::brain::Brain;
use crate::ml::stage::Stage;

pub struct Engine<H: Brain> {
    hooks: H,
}

impl<H: Brain> Engine<H> {
    pub fn new(hooks: H) -> Self {
        Self { hooks }
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Run the full training loop: for each epoch a TRAIN pass
    /// over the training loader followed by a VALID pass over
    /// the validation loader.
    pub fn fit(
        &mut self,
        epochs: usize,
        train: &Arc<dyn DataLoader<H::Batch>>,
        valid: &Arc<dyn DataLoader<H::Batch>>,
    ) -> Result<()> {
        for epoch in 1..=epochs {
            tracing::info!("Epoch {epoch}/{epochs}");

            self.hooks.on_stage_start(Stage::Train, Some(epoch));
            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for batch in train.iter() {
                loss_sum += self.hooks.fit_batch(batch)?;
                batches += 1;
            }
            let train_avg = Self::average(loss_sum, batches);
            self.hooks.on_stage_end(Stage::Train, train_avg, Some(epoch))?;

            self.hooks.on_stage_start(Stage::Valid, Some(epoch));
            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for batch in valid.iter() {
                loss_sum += self.hooks.evaluate_batch(batch, Stage::Valid)?;
                batches += 1;
            }
            let valid_avg = Self::average(loss_sum, batches);
            self.hooks.on_stage_end(Stage::Valid, valid_avg, Some(epoch))?;

            tracing::info!(
                "Epoch {epoch} done (train loss {train_avg:.4}, valid loss {valid_avg:.4})"
            );
        }
        Ok(())
    }

    /// One TEST pass over the given loader.
    pub fn evaluate(&mut self, test: &Arc<dyn DataLoader<H::Batch>>) -> Result<()> {
        self.hooks.on_stage_start(Stage::Test, None);
        let mut loss_sum = 0.0;
        let mut batches = 0usize;
        for batch in test.iter() {
            loss_sum += self.hooks.evaluate_batch(batch, Stage::Test)?;
            batches += 1;
        }
        self.hooks
            .on_stage_end(Stage::Test, Self::average(loss_sum, batches), None)
    }

    // An empty loader yields NaN rather than a misleading zero
    fn average(loss_sum: f64, batches: usize) -> f64 {
        if batches == 0 {
            f64::NAN
        } else {
            loss_sum / batches as f64
        }
    }
}
