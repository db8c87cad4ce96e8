//! CSV tables for the list and category crawls
//!
//! Files start with a UTF-8 byte-order mark so spreadsheet tools pick the right
//! encoding. The header comes from the row type's field names and is written
//! only when a file is created (or found empty).

use crate::output::OutputResult;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Replaces `path` with a fresh table of `rows`
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> OutputResult<()> {
    ensure_parent(path)?;
    let mut file = fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    write_rows(file, rows, true)
}

/// Appends `rows` to `path`, creating it with a header if needed
pub fn append_csv<T: Serialize>(path: &Path, rows: &[T]) -> OutputResult<()> {
    ensure_parent(path)?;
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if is_new {
        file.write_all(UTF8_BOM)?;
    }
    write_rows(file, rows, is_new)
}

fn write_rows<T: Serialize>(file: fs::File, rows: &[T], header: bool) -> OutputResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(header)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> OutputResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
