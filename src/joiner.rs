//! Joins the merged per-kit tables with the kit metadata sheet.
//!
//! Metadata holds one row per kit while a merged table holds one row per
//! taxon, so every metadata value is repeated on every row of its kit.

use crate::progress::{ProgressSink, StageProgress};
use crate::samples::merger::merged_width;
use crate::table::{CsvTable, TableError};
use crate::types::channel::SampleType;
use crate::weather::sample::KIT_ID_COLUMN;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const STATUS: &str = "Joining metadata...";

static KIT_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"S_(\d+)").expect("kit file pattern is a valid regex"));

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("Failed to read directory '{0}'")]
    DirectoryRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to prepare output directory '{0}'")]
    DirectoryCreation(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Counts gathered while joining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub files_joined: usize,
    /// Merged files whose name carries no kit id.
    pub files_skipped: usize,
    /// Kits without a metadata row; their files are written without metadata.
    pub kits_without_metadata: usize,
    /// Joined files whose width is not the merged schema width plus the metadata width.
    pub width_mismatches: usize,
}

/// Kit id encoded in a merged file name such as `S_12_Fungi.csv`.
pub fn kit_id_from_file_name(file_name: &str) -> Option<&str> {
    let clean_name = file_name.split('.').next().unwrap_or(file_name);
    KIT_FILE_PATTERN
        .captures(clean_name)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str())
}

/// Metadata rows indexed by kit id. The first row of a kit wins.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    table: CsvTable,
    rows_by_kit: HashMap<String, usize>,
}

impl MetadataIndex {
    pub fn read(path: &Path) -> Result<Self, TableError> {
        Self::new(CsvTable::read(path)?, path)
    }

    pub fn new(table: CsvTable, path: &Path) -> Result<Self, TableError> {
        let kit_column = table.require_column(KIT_ID_COLUMN, path)?;
        let mut rows_by_kit = HashMap::new();
        for row in 0..table.height() {
            if let Some(kit_id) = table.get(row, kit_column) {
                rows_by_kit.entry(kit_id.trim().to_string()).or_insert(row);
            }
        }
        Ok(Self { table, rows_by_kit })
    }

    pub fn width(&self) -> usize {
        self.table.width()
    }

    /// `(column, value)` pairs of the kit's metadata row.
    pub fn lookup(&self, kit_id: &str) -> Option<Vec<(&str, Option<&str>)>> {
        let row = *self.rows_by_kit.get(kit_id)?;
        Some(
            self.table
                .headers()
                .iter()
                .enumerate()
                .map(|(column, name)| (name.as_str(), self.table.get(row, column)))
                .collect(),
        )
    }
}

/// Broadcasts the kit's metadata onto every row of `kit_table`, creating
/// columns as needed. Returns `false` when the kit has no metadata row.
pub fn broadcast_metadata(kit_table: &mut CsvTable, metadata: &MetadataIndex, kit_id: &str) -> bool {
    let Some(values) = metadata.lookup(kit_id) else {
        return false;
    };
    for (name, value) in values {
        let column = kit_table.ensure_column(name);
        for row in 0..kit_table.height() {
            kit_table.set(row, column, value.map(str::to_string));
        }
    }
    true
}

/// Joins every merged file in `merged_dir` with the metadata sheet and writes
/// the results, under the same file names, into `joined_dir` using `separator`.
///
/// `joined_dir` is emptied first. A joined file is expected to have the merged
/// columns of `sample_type` followed by every metadata column; any other width
/// is logged and counted but still written.
pub fn join_metadata(
    merged_dir: &Path,
    metadata_path: &Path,
    joined_dir: &Path,
    sample_type: SampleType,
    separator: u8,
    progress: &dyn ProgressSink,
) -> Result<JoinReport, JoinError> {
    let metadata = MetadataIndex::read(metadata_path)?;
    let files = merged_files(merged_dir)?;

    if joined_dir.exists() {
        fs::remove_dir_all(joined_dir)
            .map_err(|e| JoinError::DirectoryCreation(joined_dir.to_path_buf(), e))?;
    }
    fs::create_dir_all(joined_dir)
        .map_err(|e| JoinError::DirectoryCreation(joined_dir.to_path_buf(), e))?;

    let expected_width = merged_width(sample_type) + metadata.width();
    let mut report = JoinReport::default();
    let mut stage = StageProgress::start(progress, STATUS, files.len());
    for path in &files {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let Some(kit_id) = kit_id_from_file_name(file_name) else {
            warn!("Skipping {}: no kit id in the file name", path.display());
            report.files_skipped += 1;
            stage.advance();
            continue;
        };

        let mut table = CsvTable::read(path)?;
        if !broadcast_metadata(&mut table, &metadata, kit_id) {
            warn!("No metadata row for kit {}", kit_id);
            report.kits_without_metadata += 1;
        }

        if table.width() != expected_width {
            error!(
                "Unexpected number of columns in kit ID {}: {} instead of {}. The columns are: {:?}",
                kit_id,
                table.width(),
                expected_width,
                table.headers()
            );
            report.width_mismatches += 1;
        }

        table.write_with_separator(&joined_dir.join(file_name), separator)?;
        report.files_joined += 1;
        stage.advance();
    }

    info!(
        "Joined {} kit files into {} ({} without metadata)",
        report.files_joined,
        joined_dir.display(),
        report.kits_without_metadata
    );
    Ok(report)
}

fn merged_files(dir: &Path) -> Result<Vec<PathBuf>, JoinError> {
    let entries = fs::read_dir(dir).map_err(|e| JoinError::DirectoryRead(dir.to_path_buf(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| JoinError::DirectoryRead(dir.to_path_buf(), e))?
            .path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
