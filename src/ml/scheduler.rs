/// Epoch-indexed learning-rate decay.
///
/// Queried once per validation stage with the epoch number;
/// returns `(old_lr, new_lr)` so the caller can both log the
/// rate the epoch ran with and apply the next one.
#[derive(Debug, Clone)]
pub struct EpochDecayScheduler {
    initial_lr: f64,
    factor:     f64,
    every:      usize,
}

impl EpochDecayScheduler {
    pub fn new(initial_lr: f64, factor: f64, every: usize) -> Self {
        Self { initial_lr, factor, every }
    }

    /// Rate pair for a 1-based epoch number: the rate the epoch
    /// trained with, and the rate the next epoch should use.
    pub fn step(&self, epoch: usize) -> (f64, f64) {
        (self.rate_for(epoch.saturating_sub(1)), self.rate_for(epoch))
    }

    fn rate_for(&self, epoch: usize) -> f64 {
        if self.every == 0 {
            return self.initial_lr;
        }
        self.initial_lr * self.factor.powi((epoch / self.every) as i32)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halving_every_two_epochs() {
        let sched = EpochDecayScheduler::new(1e-3, 0.5, 2);

        assert_eq!(sched.step(1), (1e-3, 1e-3));
        assert_eq!(sched.step(2), (1e-3, 5e-4));
        assert_eq!(sched.step(3), (5e-4, 5e-4));
        assert_eq!(sched.step(4), (5e-4, 2.5e-4));
    }

    #[test]
    fn test_zero_period_means_constant_rate() {
        let sched = EpochDecayScheduler::new(1e-3, 0.5, 0);
        assert_eq!(sched.step(100), (1e-3, 1e-3));
    }
}
