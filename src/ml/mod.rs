// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// No other layer imports from burn directly — only this one
// and the data layer's dataset/batcher glue.
//
// What's in this layer:
//
//   features.rs  — tensor-level audio feature helpers
//                  (power-to-dB rescaling, length-masked
//                  mean/variance normalisation, masked pooling)
//
//   model.rs     — the sound classifier architecture
//                  learnable filterbank → dB → normalisation →
//                  embedding → class logits
//
//   stage.rs     — the TRAIN/VALID/TEST stage enum and the
//                  per-stage accumulator variants
//
//   brain.rs     — the training strategy: forward, objective,
//                  per-batch fit protocol, stage lifecycle
//
//   guard.rs     — non-finite loss detection with a patience
//                  budget before aborting the run
//
//   scaler.rs    — dynamic loss scaling for the reduced
//                  precision fit path
//
//   scheduler.rs — epoch-indexed learning-rate decay
//
//   engine.rs    — the generic epoch/stage driver; knows
//                  nothing about sound, only about a Brain
//
//   trainer.rs   — concrete WGPU wiring: builds the model,
//                  optimiser, loaders and runs the engine
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Tensor-level feature helpers
pub mod features;

/// Sound classifier architecture
pub mod model;

/// Run stages and their accumulators
pub mod stage;

/// Training strategy (forward/objective/fit/lifecycle hooks)
pub mod brain;

/// Non-finite loss guard
pub mod guard;

/// Dynamic loss scaler
pub mod scaler;

/// Learning-rate schedule
pub mod scheduler;

/// Generic epoch/stage driver
pub mod engine;

/// Concrete training entry points
pub mod trainer;
