//! SnapshotStore — the durable health snapshot.
//!
//! One JSON object per line, one line per gateway, in priority order. The
//! file is always rewritten whole: records go to a temp file in the same
//! directory which is then renamed over the snapshot, so a reader never sees
//! a partial file.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::types::HealthRecord;

pub struct SnapshotStore {
    path: PathBuf,
    /// Record count of the on-disk snapshot, `None` if there is none.
    persisted: Option<usize>,
}

impl SnapshotStore {
    /// Bind to a snapshot path. Nothing is read until [`load`](Self::load).
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            persisted: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot.
    ///
    /// A missing file yields an empty list. Lines that do not parse are
    /// skipped.
    pub fn load(&mut self) -> StateResult<Vec<HealthRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no health snapshot yet");
                self.persisted = None;
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| StateError::Read {
                path: self.path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HealthRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = ?self.path, line = lineno + 1, error = %e, "skipping malformed snapshot record");
                }
            }
        }

        self.persisted = Some(records.len());
        debug!(path = ?self.path, records = records.len(), "health snapshot loaded");
        Ok(records)
    }

    /// Whether this cycle must rewrite the snapshot.
    pub fn needs_write(&self, transitions: usize, gateway_count: usize) -> bool {
        match self.persisted {
            None => true,
            Some(count) => transitions > 0 || count < gateway_count,
        }
    }

    /// Replace the snapshot with `records`.
    pub fn save(&mut self, records: &[HealthRecord]) -> StateResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        for record in records {
            let line =
                serde_json::to_string(record).map_err(|e| StateError::Serialize(e.to_string()))?;
            writeln!(tmp, "{line}").map_err(write_err)?;
        }
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        self.persisted = Some(records.len());
        debug!(path = ?self.path, records = records.len(), "health snapshot written");
        Ok(())
    }
}
