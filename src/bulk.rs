//! Bulk-index payloads for a search cluster.
//!
//! Every row of every joined kit file becomes one document in the
//! newline-delimited `_bulk` format: an action line followed by the document.
//! Documents get sequential ids across all files and are split into chunk
//! files of at most `chunk_size` documents.

use crate::table::{CsvTable, TableError};
use crate::types::station::LatLon;
use crate::weather::sample::COORDINATE_COLUMN;
use log::{info, warn};
use serde_json::{json, Map, Number, Value};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 1250;

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("Failed to read directory '{0}'")]
    DirectoryRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to prepare output directory '{0}'")]
    DirectoryCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to write bulk file '{0}'")]
    FileWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to serialize document")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub documents: usize,
    pub files_written: usize,
}

/// Converts a table cell to a JSON value: empty cells are dropped, numbers
/// become JSON numbers, the coordinate column becomes `[lat, lon]`.
pub fn cell_value(column: &str, cell: Option<&str>) -> Option<Value> {
    let text = cell?.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return None;
    }
    if column == COORDINATE_COLUMN {
        return match LatLon::parse(text) {
            Some(coordinate) => Some(json!([coordinate.latitude(), coordinate.longitude()])),
            None => {
                warn!("Keeping unparseable coordinate '{}' as text", text);
                Some(Value::String(text.to_string()))
            }
        };
    }
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    if let Some(number) = text.parse::<f64>().ok().and_then(Number::from_f64) {
        return Some(Value::Number(number));
    }
    Some(Value::String(text.to_string()))
}

/// One document per table row.
pub fn documents(table: &CsvTable) -> Vec<Map<String, Value>> {
    table
        .rows()
        .iter()
        .map(|row| {
            table
                .headers()
                .iter()
                .zip(row)
                .filter_map(|(name, cell)| {
                    cell_value(name, cell.as_deref()).map(|value| (name.clone(), value))
                })
                .collect()
        })
        .collect()
}

/// Exports comma separated joined files. See [`export_bulk_with_separator`].
pub fn export_bulk(
    joined_dir: &Path,
    out_dir: &Path,
    index: &str,
    chunk_size: usize,
) -> Result<BulkReport, BulkError> {
    export_bulk_with_separator(joined_dir, b',', out_dir, index, chunk_size)
}

/// Writes `bulk_0001.ndjson`, `bulk_0002.ndjson`, ... into `out_dir`, which is
/// emptied first.
pub fn export_bulk_with_separator(
    joined_dir: &Path,
    separator: u8,
    out_dir: &Path,
    index: &str,
    chunk_size: usize,
) -> Result<BulkReport, BulkError> {
    let chunk_size = chunk_size.max(1);
    let files = joined_files(joined_dir)?;
    if out_dir.exists() {
        fs::remove_dir_all(out_dir)
            .map_err(|e| BulkError::DirectoryCreation(out_dir.to_path_buf(), e))?;
    }
    fs::create_dir_all(out_dir).map_err(|e| BulkError::DirectoryCreation(out_dir.to_path_buf(), e))?;

    let mut writer = ChunkWriter::new(out_dir, chunk_size);
    for path in &files {
        let table = CsvTable::read_with_separator(path, separator)?;
        for document in documents(&table) {
            writer.push(index, &document)?;
        }
    }
    let report = writer.finish()?;
    info!(
        "Wrote {} documents into {} bulk files in {}",
        report.documents,
        report.files_written,
        out_dir.display()
    );
    Ok(report)
}

struct ChunkWriter<'a> {
    out_dir: &'a Path,
    chunk_size: usize,
    current: Option<(PathBuf, BufWriter<fs::File>)>,
    in_chunk: usize,
    report: BulkReport,
}

impl<'a> ChunkWriter<'a> {
    fn new(out_dir: &'a Path, chunk_size: usize) -> Self {
        Self {
            out_dir,
            chunk_size,
            current: None,
            in_chunk: 0,
            report: BulkReport::default(),
        }
    }

    fn push(&mut self, index: &str, document: &Map<String, Value>) -> Result<(), BulkError> {
        if self.in_chunk == self.chunk_size {
            self.flush()?;
        }
        if self.current.is_none() {
            self.report.files_written += 1;
            let path = self
                .out_dir
                .join(format!("bulk_{:04}.ndjson", self.report.files_written));
            let file = fs::File::create(&path).map_err(|e| BulkError::FileWrite(path.clone(), e))?;
            self.current = Some((path, BufWriter::new(file)));
        }
        let action = json!({ "index": { "_index": index, "_id": self.report.documents } });
        let lines = format!(
            "{}\n{}\n",
            serde_json::to_string(&action)?,
            serde_json::to_string(document)?
        );
        if let Some((path, writer)) = self.current.as_mut() {
            writer
                .write_all(lines.as_bytes())
                .map_err(|e| BulkError::FileWrite(path.clone(), e))?;
        }
        self.report.documents += 1;
        self.in_chunk += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BulkError> {
        if let Some((path, mut writer)) = self.current.take() {
            writer.flush().map_err(|e| BulkError::FileWrite(path, e))?;
        }
        self.in_chunk = 0;
        Ok(())
    }

    fn finish(mut self) -> Result<BulkReport, BulkError> {
        self.flush()?;
        Ok(self.report)
    }
}

fn joined_files(dir: &Path) -> Result<Vec<PathBuf>, BulkError> {
    let entries = fs::read_dir(dir).map_err(|e| BulkError::DirectoryRead(dir.to_path_buf(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| BulkError::DirectoryRead(dir.to_path_buf(), e))?
            .path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
