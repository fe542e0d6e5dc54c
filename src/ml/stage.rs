use crate::infra::metrics::{ConfusionMatrix, RunningAccuracy};

/// Phase of the run. One stage is active at a time; the engine
/// drives them strictly sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Train,
    Valid,
    Test,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Train => "train",
            Stage::Valid => "valid",
            Stage::Test  => "test",
        }
    }
}

/// The accumulators of the currently active stage. Each variant
/// carries only what that stage actually needs: TRAIN tracks
/// accuracy, VALID and TEST additionally fill a confusion
/// matrix. Pattern matching on this replaces stage conditionals
/// scattered across the lifecycle methods.
pub enum StageState {
    /// Between stages — nothing is being accumulated
    Idle,
    Train {
        accuracy: RunningAccuracy,
    },
    Valid {
        accuracy:  RunningAccuracy,
        confusion: ConfusionMatrix,
    },
    Test {
        accuracy:  RunningAccuracy,
        confusion: ConfusionMatrix,
    },
}

impl StageState {
    /// Fresh accumulators for a starting stage. Whatever a prior
    /// stage left behind is dropped here — confusion matrices
    /// always begin a stage zeroed.
    pub fn start(stage: Stage, num_classes: usize) -> Self {
        match stage {
            Stage::Train => StageState::Train {
                accuracy: RunningAccuracy::new(),
            },
            Stage::Valid => StageState::Valid {
                accuracy:  RunningAccuracy::new(),
                confusion: ConfusionMatrix::new(num_classes),
            },
            Stage::Test => StageState::Test {
                accuracy:  RunningAccuracy::new(),
                confusion: ConfusionMatrix::new(num_classes),
            },
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageState::Idle       => None,
            StageState::Train { .. } => Some(Stage::Train),
            StageState::Valid { .. } => Some(Stage::Valid),
            StageState::Test  { .. } => Some(Stage::Test),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_start_zeroes_accumulators() {
        // Fill a VALID confusion matrix, then start a new stage:
        // the fresh state must be all zeros regardless of history.
        let mut state = StageState::start(Stage::Valid, 3);
        if let StageState::Valid { confusion, .. } = &mut state {
            confusion.accumulate(&[0, 1, 2], &[0, 1, 1]);
            assert_eq!(confusion.total(), 3);
        }

        let fresh = StageState::start(Stage::Valid, 3);
        match fresh {
            StageState::Valid { confusion, .. } => assert_eq!(confusion.total(), 0),
            _ => panic!("expected VALID state"),
        }
    }

    #[test]
    fn test_train_carries_no_confusion() {
        let state = StageState::start(Stage::Train, 3);
        assert!(matches!(state, StageState::Train { .. }));
        assert_eq!(state.stage(), Some(Stage::Train));
        assert_eq!(StageState::Idle.stage(), None);
    }
}
