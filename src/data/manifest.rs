// ============================================================
// Layer 4 — Manifest Preparation
// ============================================================
// Turns an UrbanSound8K-style dataset folder into three CSV
// manifests (train/valid/test), split by fold number.
//
// Expected dataset layout:
//   {data_dir}/metadata/UrbanSound8K.csv
//   {data_dir}/audio/fold1/100032-3-0-0.wav
//   {data_dir}/audio/fold2/...
//
// The metadata CSV carries one row per clip:
//   slice_file_name,fsID,start,end,salience,fold,classID,class
//
// Each output manifest row is `{id, wav_path, class_name}` —
// exactly what the downstream audio pipeline needs, nothing more.
// Rows whose class is not in the configured task classes are
// dropped, so a 2-class task can be trained on the 10-class set.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::clip::ClipRecord;
use crate::domain::traits::ClipSource;

/// The three manifests one preparation run produces.
#[derive(Debug, Clone)]
pub struct ManifestSet {
    pub train: PathBuf,
    pub valid: PathBuf,
    pub test:  PathBuf,
}

/// Split the dataset metadata into train/valid/test manifests.
///
/// Regeneration is skipped when all three manifests already
/// exist, so repeated runs reuse the same split.
pub fn prepare_split_manifests(
    data_dir:     &Path,
    output_dir:   &Path,
    task_classes: &[String],
    train_folds:  &[u32],
    valid_folds:  &[u32],
    test_folds:   &[u32],
) -> Result<ManifestSet> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Cannot create '{}'", output_dir.display()))?;

    let set = ManifestSet {
        train: output_dir.join("train.csv"),
        valid: output_dir.join("valid.csv"),
        test:  output_dir.join("test.csv"),
    };

    if set.train.exists() && set.valid.exists() && set.test.exists() {
        tracing::info!("Manifests already prepared — skipping regeneration");
        return Ok(set);
    }

    let metadata = data_dir.join("metadata").join("UrbanSound8K.csv");
    let rows = read_metadata(&metadata, data_dir, task_classes)?;
    tracing::info!("Read {} clips matching the task classes", rows.len());

    write_manifest(&set.train, &rows, train_folds)?;
    write_manifest(&set.valid, &rows, valid_folds)?;
    write_manifest(&set.test,  &rows, test_folds)?;

    Ok(set)
}

/// One metadata row after filtering: the record plus its fold.
struct FoldedRecord {
    record: ClipRecord,
    fold:   u32,
}

/// Parse the dataset metadata CSV and keep only the task classes.
fn read_metadata(
    metadata:     &Path,
    data_dir:     &Path,
    task_classes: &[String],
) -> Result<Vec<FoldedRecord>> {
    let text = fs::read_to_string(metadata)
        .with_context(|| format!("Cannot read metadata '{}'", metadata.display()))?;

    let mut rows = Vec::new();

    // First line is the header
    for (lineno, line) in text.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 8 {
            anyhow::bail!(
                "Malformed metadata row at line {} in '{}'",
                lineno + 1,
                metadata.display()
            );
        }

        // slice_file_name,fsID,start,end,salience,fold,classID,class
        let file_name  = fields[0];
        let fold: u32  = fields[5]
            .parse()
            .with_context(|| format!("Bad fold number at line {}", lineno + 1))?;
        let class_name = fields[7];

        if !task_classes.iter().any(|c| c == class_name) {
            continue;
        }

        let wav_path = data_dir
            .join("audio")
            .join(format!("fold{fold}"))
            .join(file_name);

        let id = file_name.trim_end_matches(".wav").to_string();

        rows.push(FoldedRecord {
            record: ClipRecord::new(id, wav_path.to_string_lossy(), class_name),
            fold,
        });
    }

    Ok(rows)
}

/// Write one manifest containing every row whose fold is listed.
fn write_manifest(path: &Path, rows: &[FoldedRecord], folds: &[u32]) -> Result<()> {
    let mut f = File::create(path)
        .with_context(|| format!("Cannot create manifest '{}'", path.display()))?;

    writeln!(f, "id,wav_path,class_name")?;

    let mut written = 0usize;
    for row in rows.iter().filter(|r| folds.contains(&r.fold)) {
        writeln!(
            f,
            "{},{},{}",
            row.record.id, row.record.wav_path, row.record.class_name
        )?;
        written += 1;
    }

    tracing::info!("Wrote {} rows to '{}'", written, path.display());
    Ok(())
}

// ─── ManifestReader ───────────────────────────────────────────────────────────
/// Reads a prepared manifest back as clip records.
/// Implements the ClipSource trait from Layer 3.
pub struct ManifestReader {
    path: PathBuf,
}

impl ManifestReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClipSource for ManifestReader {
    fn records(&self) -> Result<Vec<ClipRecord>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read manifest '{}'", self.path.display()))?;

        let mut records = Vec::new();

        for (lineno, line) in text.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // wav_path may itself contain no commas (dataset file names
            // are numeric), so a plain 3-way split is enough here
            let mut parts = line.splitn(3, ',');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(wav_path), Some(class_name)) => {
                    records.push(ClipRecord::new(id, wav_path, class_name));
                }
                _ => anyhow::bail!(
                    "Malformed manifest row at line {} in '{}'",
                    lineno + 1,
                    self.path.display()
                ),
            }
        }

        Ok(records)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("urbansound-cls-test-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fake_dataset(dir: &Path) {
        let meta_dir = dir.join("metadata");
        fs::create_dir_all(&meta_dir).unwrap();
        let csv = "\
slice_file_name,fsID,start,end,salience,fold,classID,class
100032-3-0-0.wav,100032,0.0,0.32,1,1,3,dog_bark
100263-2-0-117.wav,100263,58.5,62.5,1,2,2,children_playing
100648-1-0-0.wav,100648,4.8,8.8,2,9,1,car_horn
100652-3-0-1.wav,100652,1.0,5.0,1,10,3,dog_bark
101729-0-0-2.wav,101729,1.0,5.0,2,1,0,air_conditioner
";
        fs::write(meta_dir.join("UrbanSound8K.csv"), csv).unwrap();
    }

    #[test]
    fn test_split_by_folds() {
        let dir = scratch_dir("split");
        fake_dataset(&dir);

        let classes: Vec<String> =
            ["dog_bark", "children_playing", "car_horn"].map(String::from).to_vec();
        let set = prepare_split_manifests(
            &dir,
            &dir.join("save"),
            &classes,
            &[1, 2, 3, 4, 5, 6, 7, 8],
            &[9],
            &[10],
        )
        .unwrap();

        let train = ManifestReader::new(&set.train).records().unwrap();
        let valid = ManifestReader::new(&set.valid).records().unwrap();
        let test  = ManifestReader::new(&set.test).records().unwrap();

        // air_conditioner is not a task class → dropped entirely
        assert_eq!(train.len(), 2);
        assert_eq!(valid.len(), 1);
        assert_eq!(test.len(),  1);

        assert_eq!(valid[0].id, "100648-1-0-0");
        assert_eq!(valid[0].class_name, "car_horn");
        assert!(valid[0].wav_path.contains("fold9"));
    }

    #[test]
    fn test_existing_manifests_not_regenerated() {
        let dir = scratch_dir("skip");
        fake_dataset(&dir);

        let classes = vec!["dog_bark".to_string()];
        let save = dir.join("save");
        let set = prepare_split_manifests(&dir, &save, &classes, &[1], &[9], &[10]).unwrap();

        // Clobber the train manifest, then prepare again — the stale
        // content must survive because regeneration is skipped.
        fs::write(&set.train, "id,wav_path,class_name\nstale,x.wav,dog_bark\n").unwrap();
        prepare_split_manifests(&dir, &save, &classes, &[1], &[9], &[10]).unwrap();

        let rows = ManifestReader::new(&set.train).records().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "stale");
    }

    #[test]
    fn test_malformed_manifest_row_fails() {
        let dir = scratch_dir("malformed");
        let path = dir.join("bad.csv");
        fs::write(&path, "id,wav_path,class_name\nonly-one-field\n").unwrap();
        assert!(ManifestReader::new(&path).records().is_err());
    }
}
