// ============================================================
// Layer 5 — Dynamic Loss Scaler
// ============================================================
// Loss scaling for the reduced-precision fit path: small
// gradients underflow in half precision, so the loss is
// multiplied by a large factor before the backward pass and the
// factor is divided back out at step time.
//
// The scale adapts: a run of clean steps doubles it (chasing
// the largest representable gradients), any overflow halves it
// and restarts the clean-step count. The scale never drops
// below 1.0 — at that point scaling is effectively off.

/// Clean steps required before the scale grows
const DEFAULT_GROWTH_INTERVAL: usize = 2000;

#[derive(Debug)]
pub struct LossScaler {
    scale:           f64,
    growth_factor:   f64,
    backoff_factor:  f64,
    growth_interval: usize,
    clean_steps:     usize,
    overflow_count:  usize,
}

impl LossScaler {
    pub fn new(initial_scale: f64) -> Self {
        Self {
            scale:           initial_scale,
            growth_factor:   2.0,
            backoff_factor:  0.5,
            growth_interval: DEFAULT_GROWTH_INTERVAL,
            clean_steps:     0,
            overflow_count:  0,
        }
    }

    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval;
        self
    }

    /// The factor the loss should currently be multiplied by
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Advance the scaler statistics after a fit attempt.
    /// Called whether or not the optimizer stepped.
    pub fn update(&mut self, step_was_clean: bool) {
        if step_was_clean {
            self.clean_steps += 1;
            if self.clean_steps >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.clean_steps = 0;
            }
        } else {
            self.overflow_count += 1;
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.clean_steps = 0;
        }
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_halves_scale() {
        let mut scaler = LossScaler::new(1024.0);
        scaler.update(false);
        assert_eq!(scaler.scale(), 512.0);
        assert_eq!(scaler.overflow_count(), 1);
    }

    #[test]
    fn test_scale_floor() {
        let mut scaler = LossScaler::new(1.5);
        scaler.update(false);
        scaler.update(false);
        assert_eq!(scaler.scale(), 1.0);
    }

    #[test]
    fn test_growth_after_clean_interval() {
        let mut scaler = LossScaler::new(256.0).with_growth_interval(3);
        scaler.update(true);
        scaler.update(true);
        assert_eq!(scaler.scale(), 256.0);
        scaler.update(true);
        assert_eq!(scaler.scale(), 512.0);
    }

    #[test]
    fn test_overflow_resets_clean_streak() {
        let mut scaler = LossScaler::new(256.0).with_growth_interval(2);
        scaler.update(true);
        scaler.update(false); // streak broken, scale halved
        scaler.update(true);
        assert_eq!(scaler.scale(), 128.0); // one clean step is not enough to grow
    }
}
