// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the raw dataset folder
// all the way to GPU-ready tensor batches.
//
// The pipeline flows in this order:
//
//   dataset folder (metadata CSV + audio/fold*/)
//       │
//       ▼
//   manifest          → writes train/valid/test CSV manifests
//       │
//       ▼
//   encoder           → maps class names to stable integer ids
//       │
//       ▼
//   AudioPipeline     → decodes, downmixes, resamples each clip
//       │
//       ▼
//   ClipDataset       → implements Burn's Dataset trait
//       │
//       ▼
//   ClipBatcher       → pads signals into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Each module is responsible for exactly one step.
// This makes each step independently testable and replaceable.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Generates and reads the train/valid/test CSV manifests
pub mod manifest;

/// Categorical label encoder with on-disk persistence
pub mod encoder;

/// Audio decoding, mono downmix, and cached resampling
pub mod pipeline;

/// Implements Burn's Dataset trait for loaded clip samples
pub mod dataset;

/// Implements Burn's Batcher trait to create padded batches
pub mod batcher;
