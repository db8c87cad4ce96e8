//! JSON progress snapshots
//!
//! The progress file is rewritten wholesale after every batch. Writes go to a
//! sibling temporary file first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

use crate::output::OutputResult;
use crate::state::{Record, ResultAccumulator};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Overwrites the progress snapshot with the accumulated records
#[derive(Debug, Clone)]
pub struct ProgressPersister {
    path: PathBuf,
}

impl ProgressPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the whole accumulator
    ///
    /// Same records in, same bytes out.
    pub fn persist(&self, accumulator: &ResultAccumulator) -> OutputResult<()> {
        write_records(&self.path, accumulator.records())
    }

    /// Reads the last snapshot, `None` if there is none
    pub fn load(&self) -> OutputResult<Option<Vec<Record>>> {
        load_snapshot(&self.path)
    }
}

/// Renders records as pretty-printed JSON with a trailing newline
pub fn render_records(records: &[Record]) -> OutputResult<String> {
    let mut json = serde_json::to_string_pretty(records)?;
    json.push('\n');
    Ok(json)
}

/// Atomically replaces `path` with the JSON array of `records`
pub fn write_records(path: &Path, records: &[Record]) -> OutputResult<()> {
    let json = render_records(records)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    tracing::debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Reads a snapshot written by `write_records`
pub fn load_snapshot(path: &Path) -> OutputResult<Option<Vec<Record>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let records: Vec<Record> = serde_json::from_str(&content)?;
    Ok(Some(records))
}
