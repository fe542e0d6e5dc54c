// ============================================================
// Layer 5 — Gradient Health Guard
// ============================================================
// Detects diverging training. A non-finite loss means the
// gradients of this batch are garbage: the step is skipped and
// a cumulative counter advances. The counter never resets — it
// counts occurrences over the whole run, and once it exceeds
// the patience budget the run aborts, because a model that
// keeps producing NaN losses is not going to recover.
//
// Gradient-norm clipping itself is configured on the optimizer
// (burn's GradientClippingConfig), so a Proceed verdict here
// means "step with clipped gradients".
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use burn::{
    module::{Module, ModuleVisitor, ParamId},
    prelude::*,
};

/// What the caller should do with the pending gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Loss is finite — step the optimizer
    Proceed,
    /// Loss is non-finite but patience remains — drop this batch
    Skip,
}

#[derive(Debug)]
pub struct GradientGuard {
    nonfinite_count: usize,
    patience:        usize,
}

impl GradientGuard {
    pub fn new(patience: usize) -> Self {
        Self { nonfinite_count: 0, patience }
    }

    /// Inspect the detached loss of the current batch.
    ///
    /// Returns an error once the cumulative non-finite count
    /// exceeds the patience budget — that error is fatal and
    /// must propagate out of the run.
    pub fn check<B: Backend, M: Module<B>>(
        &mut self,
        loss:   f64,
        module: &M,
    ) -> Result<GuardVerdict> {
        if loss.is_finite() {
            return Ok(GuardVerdict::Proceed);
        }

        self.nonfinite_count += 1;
        tracing::warn!("Loss is {loss}.");

        // Point at the parameters that went bad, if any did
        for id in scan_nonfinite(module) {
            tracing::warn!("Parameter {:?} contains non-finite values", id);
        }

        if self.nonfinite_count > self.patience {
            anyhow::bail!(
                "Loss is not finite and patience is exhausted \
                 ({} non-finite losses seen, patience {}). \
                 Lower the learning rate or inspect the data.",
                self.nonfinite_count,
                self.patience
            );
        }

        tracing::warn!("Patience not yet exhausted, ignoring this batch.");
        Ok(GuardVerdict::Skip)
    }

    pub fn nonfinite_count(&self) -> usize {
        self.nonfinite_count
    }
}

/// Walk every float parameter of a module and collect the ids of
/// those containing NaN or infinite values.
fn scan_nonfinite<B: Backend, M: Module<B>>(module: &M) -> Vec<ParamId> {
    struct Scan<B: Backend> {
        flagged: Vec<ParamId>,
        _marker: std::marker::PhantomData<B>,
    }

    impl<B: Backend> ModuleVisitor<B> for Scan<B> {
        fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
            // A single NaN or inf anywhere poisons the sum
            let total: f64 = tensor.clone().abs().sum().into_scalar().elem();
            if !total.is_finite() {
                self.flagged.push(id);
            }
        }
    }

    let mut scan = Scan::<B> { flagged: Vec::new(), _marker: std::marker::PhantomData };
    module.visit(&mut scan);
    scan.flagged
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{SoundClassifier, SoundClassifierConfig};

    type TestBackend = burn::backend::NdArray;

    fn tiny_model() -> SoundClassifier<TestBackend> {
        SoundClassifierConfig::new(2)
            .with_n_feats(2)
            .with_frame_len(4)
            .with_hop(2)
            .with_embed_dim(4)
            .init(&Default::default())
    }

    #[test]
    fn test_finite_loss_proceeds() {
        let model = tiny_model();
        let mut guard = GradientGuard::new(2);
        for _ in 0..10 {
            assert_eq!(guard.check(0.5, &model).unwrap(), GuardVerdict::Proceed);
        }
        assert_eq!(guard.nonfinite_count(), 0);
    }

    #[test]
    fn test_skip_within_patience_then_fatal() {
        let model = tiny_model();
        let mut guard = GradientGuard::new(2);

        // patience 2 → two skips allowed
        assert_eq!(guard.check(f64::NAN, &model).unwrap(), GuardVerdict::Skip);
        assert_eq!(guard.check(f64::INFINITY, &model).unwrap(), GuardVerdict::Skip);

        // third occurrence exceeds the budget
        assert!(guard.check(f64::NAN, &model).is_err());
        assert_eq!(guard.nonfinite_count(), 3);
    }

    #[test]
    fn test_counter_is_cumulative_across_recoveries() {
        let model = tiny_model();
        let mut guard = GradientGuard::new(2);

        assert_eq!(guard.check(f64::NAN, &model).unwrap(), GuardVerdict::Skip);
        // Finite losses in between do not reset the counter
        assert_eq!(guard.check(0.1, &model).unwrap(), GuardVerdict::Proceed);
        assert_eq!(guard.check(f64::NAN, &model).unwrap(), GuardVerdict::Skip);
        assert_eq!(guard.check(0.1, &model).unwrap(), GuardVerdict::Proceed);
        assert!(guard.check(f64::NAN, &model).is_err());
    }
}
