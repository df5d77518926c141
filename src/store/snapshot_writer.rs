use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::types::OddsSnapshot;

static RE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// `https://site/sport/12/3456` → `12-3456.csv`.
pub fn snapshot_file_name(url: &str) -> String {
    let parts: Vec<&str> = RE_DIGITS.find_iter(url).map(|m| m.as_str()).collect();
    if parts.is_empty() {
        "match.csv".to_string()
    } else {
        format!("{}.csv", parts.join("-"))
    }
}

/// Append-only CSV series for one match (`timestamp, url, quarter, totals`).
/// Owned by exactly one polling worker.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn for_match(data_dir: &Path, url: &str) -> Self {
        Self {
            path: data_dir.join(snapshot_file_name(url)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, snapshot: &OddsSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| AppError::store(dir, e))?;
        }
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::store(&self.path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(snapshot)
            .map_err(|e| AppError::store(&self.path, e))?;
        writer.flush().map_err(|e| AppError::store(&self.path, e))
    }
}
