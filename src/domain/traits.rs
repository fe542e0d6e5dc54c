// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Traits are Rust's way of defining shared behaviour —
// by programming against traits instead of concrete types
// we can swap implementations without changing the code
// that uses them. For example:
//   - ManifestReader implements ClipSource
//   - A future FolderScanner could also implement ClipSource
//   - The application layer only sees ClipSource
//     and works with both without any changes
//
// This is the Dependency Inversion Principle from SOLID,
// applied using Rust's trait system.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use anyhow::Result;
use serde::Serialize;

use crate::domain::clip::ClipRecord;

// ─── ClipSource ───────────────────────────────────────────────────────────────
/// Any component that can enumerate annotated sound clips.
///
/// Implementations:
///   - ManifestReader → reads a prepared CSV manifest
pub trait ClipSource {
    /// Return every annotated clip available from this source.
    fn records(&self) -> Result<Vec<ClipRecord>>;
}

// ─── TrainLogger ──────────────────────────────────────────────────────────────
/// A single value inside a stat record. Untagged so the JSON
/// form is just the bare number or string.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Float(f64),
    Int(u64),
    Text(String),
}

/// One structured log record: run-level metadata plus named
/// groups of stats (e.g. "train", "valid", "test").
#[derive(Debug, Clone, Serialize)]
pub struct StatRecord {
    pub meta:   Vec<(String, StatValue)>,
    pub groups: Vec<(String, Vec<(String, StatValue)>)>,
}

impl StatRecord {
    pub fn new() -> Self {
        Self { meta: Vec::new(), groups: Vec::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: StatValue) -> Self {
        self.meta.push((key.into(), value));
        self
    }

    pub fn with_group(
        mut self,
        name:  impl Into<String>,
        stats: Vec<(String, StatValue)>,
    ) -> Self {
        self.groups.push((name.into(), stats));
        self
    }
}

/// Any component that can receive structured training stats.
///
/// Implementations:
///   - StdoutLogger    → plain-text summary lines
///   - DashboardLogger → JSONL records for the dashboard service
pub trait TrainLogger {
    /// Emit one stat record. Where it ends up is the
    /// implementation's business.
    fn log_stats(&self, record: &StatRecord) -> Result<()>;
}
