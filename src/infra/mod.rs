// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles all cross-cutting concerns that don't belong in
// any specific business layer:
//
//   checkpoint.rs — Saving and loading model weights with
//                   best-by-accuracy retention. Uses Burn's
//                   CompactRecorder plus a small JSON registry
//                   so only the best checkpoint survives.
//                   Also saves/loads TrainConfig as JSON so
//                   evaluation can rebuild the model.
//
//   metrics.rs    — Classification accounting: the running
//                   accuracy metric, the confusion matrix and
//                   its per-class accuracy / text rendering.
//
//   logger.rs     — TrainLogger implementations: plain stdout
//                   summaries, and JSONL records for the
//                   experiment dashboard.
//
// Why is this a separate layer?
//   These concerns are used by multiple other layers but
//   don't belong to any one of them. Keeping them here:
//   - Prevents duplication across layers
//   - Makes it easy to swap implementations
//     (e.g. swap file checkpoints for S3 cloud storage)
//   - Keeps other layers focused on their core logic
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving, loading, and retention
pub mod checkpoint;

/// Accuracy metric and confusion matrix
pub mod metrics;

/// Stdout and dashboard stat loggers
pub mod logger;
