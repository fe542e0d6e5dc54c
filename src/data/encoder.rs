// ============================================================
// Layer 4 — Categorical Label Encoder
// ============================================================
// Maps class names to stable integer indices and back.
//
// Stability matters: the confusion matrix, the classifier head
// and every checkpoint all assume class k means the same thing
// across runs. The mapping is therefore persisted to disk the
// first time it is built and reloaded afterwards, never rebuilt
// behind an existing file's back.
//
// Reference: Rust Book §8 (HashMaps)
//            Rust Book §9 (Error Handling with anyhow)

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};

/// A bidirectional class-name ↔ index mapping.
pub struct CategoricalEncoder {
    /// Index → label, in encoding order. This is the axis
    /// labelling of every confusion matrix.
    labels: Vec<String>,

    /// Label → index, for O(1) encoding
    lab2ind: HashMap<String, usize>,
}

impl CategoricalEncoder {
    /// Build an encoder from an ordered list of class names.
    /// The position in the list becomes the encoded index.
    pub fn from_labels(names: &[String]) -> Self {
        let labels: Vec<String> = names.to_vec();
        let lab2ind = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Self { labels, lab2ind }
    }

    /// Load the mapping from `path` if it exists, otherwise build
    /// it from `names` and persist it there.
    pub fn load_or_create(path: &Path, names: &[String]) -> Result<Self> {
        if path.exists() {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Cannot read label encoder '{}'", path.display()))?;
            let labels: Vec<String> = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt label encoder '{}'", path.display()))?;
            tracing::info!("Loaded label encoder with {} classes", labels.len());
            return Ok(Self::from_labels(&labels));
        }

        let encoder = Self::from_labels(names);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(path, serde_json::to_string_pretty(&encoder.labels)?)
            .with_context(|| format!("Cannot write label encoder '{}'", path.display()))?;
        tracing::info!("Created label encoder with {} classes", encoder.labels.len());
        Ok(encoder)
    }

    /// Encode a class name as its integer index.
    /// An unknown name is a data error, not a new class.
    pub fn encode_label(&self, name: &str) -> Result<usize> {
        self.lab2ind
            .get(name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown class name '{name}'"))
    }

    /// Reverse mapping: index → label
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// All labels in index order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of classes in the mapping
    pub fn class_count(&self) -> usize {
        self.labels.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_trip() {
        let enc = CategoricalEncoder::from_labels(&names(&["car_horn", "dog_bark", "siren"]));
        assert_eq!(enc.class_count(), 3);
        assert_eq!(enc.encode_label("dog_bark").unwrap(), 1);
        assert_eq!(enc.decode(2), Some("siren"));
        assert!(enc.encode_label("jackhammer").is_err());
    }

    #[test]
    fn test_persisted_mapping_wins() {
        let path = std::env::temp_dir()
            .join(format!("urbansound-cls-enc-{}", std::process::id()))
            .join("label_encoder.json");
        let _ = fs::remove_file(&path);

        let first = CategoricalEncoder::load_or_create(&path, &names(&["a", "b"])).unwrap();
        assert_eq!(first.encode_label("b").unwrap(), 1);

        // A second call with a different order must keep the stored order
        let second = CategoricalEncoder::load_or_create(&path, &names(&["b", "a"])).unwrap();
        assert_eq!(second.encode_label("b").unwrap(), 1);
    }
}
