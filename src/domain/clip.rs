// ============================================================
// Layer 3 — ClipRecord Domain Type
// ============================================================
// Represents one row of a dataset manifest: a pointer to a
// sound clip on disk together with its class annotation.
//
// The record deliberately knows nothing about audio decoding —
// by the time a ClipRecord exists, no file has been opened yet.
// Decoding and resampling happen later in the data layer.
//
// Reference: Rust Book §5 (Structs and Methods)

use serde::{Deserialize, Serialize};

/// One manifest row: `{id, wav_path, class_name}`.
///
/// The id is kept for traceability so a misbehaving clip can be
/// traced back to the source dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRecord {
    /// Stable identifier of the clip (the source file stem)
    pub id: String,

    /// Path to the audio file on disk
    pub wav_path: String,

    /// Human-readable class annotation, e.g. "dog_bark"
    pub class_name: String,
}

impl ClipRecord {
    /// Create a new ClipRecord.
    /// Uses impl Into<String> so callers can pass &str or String —
    /// this is idiomatic Rust for flexible string arguments.
    pub fn new(
        id:         impl Into<String>,
        wav_path:   impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            id:         id.into(),
            wav_path:   wav_path.into(),
            class_name: class_name.into(),
        }
    }
}
