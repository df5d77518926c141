use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AppError, Result};
use crate::types::Match;

/// CSV-backed registry of discovered matches, keyed by URL.
///
/// Columns: `title, url, schedule, status`, header row first. Rows are
/// appended for new URLs and only ever rewritten wholesale.
#[derive(Debug, Clone)]
pub struct MatchRegistry {
    path: PathBuf,
}

impl MatchRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored match in file order. A registry that was never written
    /// yields `StoreMissing`.
    pub fn load_all(&self) -> Result<Vec<Match>> {
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(r) => r,
            Err(e) => {
                if let csv::ErrorKind::Io(io) = e.kind() {
                    if io.kind() == ErrorKind::NotFound {
                        return Err(AppError::StoreMissing(self.path.clone()));
                    }
                }
                return Err(AppError::store(&self.path, e));
            }
        };

        reader
            .deserialize::<Match>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::store(&self.path, e))
    }

    /// Append the candidates whose URL is not stored yet, in arrival order.
    /// Returns how many rows were written.
    pub fn append_new(&self, candidates: &[Match]) -> Result<usize> {
        let existing = match self.load_all() {
            Ok(matches) => matches,
            Err(AppError::StoreMissing(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut seen: HashSet<&str> = existing.iter().map(|m| m.url.as_str()).collect();
        // A pass can see the same card twice; first sighting wins.
        let to_add: Vec<&Match> = candidates
            .iter()
            .filter(|m| seen.insert(m.url.as_str()))
            .collect();

        if to_add.is_empty() {
            info!("No new matches to add");
            return Ok(0);
        }

        self.ensure_parent()?;
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::store(&self.path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        for m in &to_add {
            writer.serialize(m).map_err(|e| AppError::store(&self.path, e))?;
        }
        writer.flush().map_err(|e| AppError::store(&self.path, e))?;

        info!(added = to_add.len(), "Added {} new matches", to_add.len());
        Ok(to_add.len())
    }

    /// Replace the whole registry with `matches`, in the given order.
    /// Written to a sibling temp file first, then renamed over the original.
    pub fn rewrite_all(&self, matches: &[Match]) -> Result<()> {
        self.ensure_parent()?;
        let tmp = self.path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| AppError::store(&tmp, e))?;
        for m in matches {
            writer.serialize(m).map_err(|e| AppError::store(&tmp, e))?;
        }
        writer.flush().map_err(|e| AppError::store(&tmp, e))?;
        drop(writer);

        fs::rename(&tmp, &self.path).map_err(|e| AppError::store(&self.path, e))
    }

    fn ensure_parent(&self) -> Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).map_err(|e| AppError::store(dir, e))
            }
            _ => Ok(()),
        }
    }
}
