use crate::config;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One invocation, appended as a JSONL line after the run finishes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationRecord {
    pub ts: String,
    pub argv: Vec<String>,
    pub prompt: Option<String>,
    pub generated_command: Option<String>,
    pub score: Option<f64>,
    pub validated: bool,
    pub attempts: u32,
    pub exit_code: i32,
    pub notes: Option<String>,
}

pub const HISTORY_MAX_BYTES: u64 = 1_000_000;

pub fn history_log_path() -> PathBuf {
    config::gcmd_config_dir().join("history.log")
}

pub fn write_record(record: &GenerationRecord) -> Result<()> {
    let path = history_log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create history directory {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open history log {}", path.display()))?;

    let line = serde_json::to_string(record)?;
    writeln!(file, "{}", line)?;
    file.flush()?;

    rotate_history_if_needed(&path)?;
    Ok(())
}

fn rotate_history_if_needed(path: &Path) -> Result<()> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };

    if meta.len() <= HISTORY_MAX_BYTES {
        return Ok(());
    }

    let backup = backup_path(path);
    if backup.exists() {
        fs::remove_file(&backup).with_context(|| {
            format!(
                "Failed to remove existing history backup {}",
                backup.display()
            )
        })?;
    }

    fs::rename(path, &backup).with_context(|| {
        format!(
            "Failed to rotate history log {} -> {}",
            path.display(),
            backup.display()
        )
    })?;

    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.to_path_buf();
    backup.set_extension("log.1");
    backup
}

pub fn now_iso_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record() -> GenerationRecord {
        GenerationRecord {
            ts: "2026-01-01T00:00:00Z".to_string(),
            argv: vec!["gcmd".to_string(), "list vms".to_string()],
            prompt: Some("list vms".to_string()),
            generated_command: Some(
                "gcloud compute instances list --project=<PROJECT_ID> --format=json".to_string(),
            ),
            score: Some(0.67),
            validated: false,
            attempts: 0,
            exit_code: 0,
            notes: None,
        }
    }

    #[test]
    fn appends_one_json_line_per_record() {
        let temp = TempDir::new().unwrap();
        let _guard = config::override_base_dirs_for_tests(temp.path());

        let record = sample_record();
        write_record(&record).unwrap();
        write_record(&record).unwrap();

        let content = fs::read_to_string(history_log_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: GenerationRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn rotates_when_size_exceeded() {
        let temp = TempDir::new().unwrap();
        let _guard = config::override_base_dirs_for_tests(temp.path());

        let mut large = sample_record();
        large.notes = Some("x".repeat((HISTORY_MAX_BYTES as usize) + 100));
        write_record(&large).unwrap();

        let log_path = history_log_path();
        assert!(backup_path(&log_path).exists());
        assert!(!log_path.exists());

        let small = sample_record();
        write_record(&small).unwrap();
        let content = fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
