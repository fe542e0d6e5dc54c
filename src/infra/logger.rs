// ============================================================
// Layer 6 — Stat Loggers
// ============================================================
// Two implementations of the domain TrainLogger trait:
//
//   StdoutLogger    — human-readable one-liners, multi-line
//                     values (like confusion figures) printed
//                     as indented blocks underneath
//
//   DashboardLogger — one JSON object per record, appended to
//                     {run_dir}/dashboard.jsonl. The dashboard
//                     agent tails this file and ships records
//                     upstream; this process never touches the
//                     network itself.
//
// Reference: Rust Book §12 (I/O and File Handling)
//            serde_json crate documentation

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::traits::{StatRecord, StatValue, TrainLogger};

fn format_value(value: &StatValue) -> String {
    match value {
        StatValue::Float(v) => format!("{v:.4}"),
        StatValue::Int(v)   => v.to_string(),
        StatValue::Text(v)  => v.clone(),
    }
}

// ─── StdoutLogger ─────────────────────────────────────────────────────────────
/// Prints each record as one summary line; any multi-line text
/// value is printed as a block after the line.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self
    }
}

impl TrainLogger for StdoutLogger {
    fn log_stats(&self, record: &StatRecord) -> Result<()> {
        let mut line = Vec::new();
        let mut blocks = Vec::new();

        for (key, value) in &record.meta {
            match value {
                StatValue::Text(text) if text.contains('\n') => {
                    blocks.push((key.clone(), text.clone()));
                }
                _ => line.push(format!("{key}={}", format_value(value))),
            }
        }
        for (group, stats) in &record.groups {
            for (key, value) in stats {
                match value {
                    StatValue::Text(text) if text.contains('\n') => {
                        blocks.push((format!("{group} {key}"), text.clone()));
                    }
                    _ => line.push(format!("{group} {key}={}", format_value(value))),
                }
            }
        }

        println!("{}", line.join(" | "));
        for (title, block) in blocks {
            println!("{title}:");
            for row in block.lines() {
                println!("  {row}");
            }
        }
        Ok(())
    }
}

// ─── DashboardLogger ──────────────────────────────────────────────────────────
/// Appends records as JSONL for the dashboard service.
pub struct DashboardLogger {
    path: PathBuf,
}

impl DashboardLogger {
    pub fn new(run_dir: &Path) -> Result<Self> {
        fs::create_dir_all(run_dir)
            .with_context(|| format!("Cannot create run dir '{}'", run_dir.display()))?;
        Ok(Self { path: run_dir.join("dashboard.jsonl") })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn to_json(record: &StatRecord) -> Result<serde_json::Value> {
        let mut obj = serde_json::Map::new();

        let mut meta = serde_json::Map::new();
        for (key, value) in &record.meta {
            meta.insert(key.clone(), serde_json::to_value(value)?);
        }
        obj.insert("meta".to_string(), meta.into());

        for (group, stats) in &record.groups {
            let mut g = serde_json::Map::new();
            for (key, value) in stats {
                g.insert(key.clone(), serde_json::to_value(value)?);
            }
            obj.insert(group.clone(), g.into());
        }

        Ok(obj.into())
    }
}

impl TrainLogger for DashboardLogger {
    fn log_stats(&self, record: &StatRecord) -> Result<()> {
        let json = Self::to_json(record)?;

        // Open in append mode — one record per line, never rewritten
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open '{}'", self.path.display()))?;
        writeln!(f, "{json}")?;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_jsonl_round_trip() {
        let dir = std::env::temp_dir()
            .join(format!("urbansound-cls-log-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let logger = DashboardLogger::new(&dir).unwrap();
        let record = StatRecord::new()
            .with_meta("epoch", StatValue::Int(3))
            .with_meta("lr", StatValue::Float(1e-3))
            .with_group("valid", vec![
                ("loss".to_string(), StatValue::Float(0.42)),
                ("acc".to_string(),  StatValue::Float(0.9)),
            ]);
        logger.log_stats(&record).unwrap();
        logger.log_stats(&record).unwrap();

        let text = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["meta"]["epoch"], 3);
        assert_eq!(parsed["valid"]["acc"], 0.9);
    }
}
