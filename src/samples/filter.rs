//! Copies the sample files of a raw data tree into a flat staging directory.
//!
//! Two layouts are supported:
//!
//! * Bacteria: every file directly under the root is a candidate.
//! * Fungi: the root holds one folder per sequencing run, and every run keeps
//!   its count tables in an `ASV` subfolder.
//!
//! Candidates that [`classify`] as sample files are copied under their
//! canonical name; everything else is skipped.

use crate::progress::{ProgressSink, StageProgress};
use crate::samples::classifier::classify;
use crate::samples::error::SampleError;
use crate::types::channel::SampleType;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const ASV_FOLDER: &str = "ASV";
const STATUS: &str = "Filtering data...";

/// Counts gathered while filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Files considered, sample files or not.
    pub candidates: usize,
    /// Files copied into staging.
    pub copied: usize,
    /// Files whose names are not sample file names.
    pub skipped: usize,
}

/// Filters `root` into `staging`.
///
/// `staging` must not exist yet; the caller clears it between runs. A Fungi
/// run folder without an `ASV` subfolder fails the whole call before any file
/// is copied.
pub fn filter_samples(
    root: &Path,
    staging: &Path,
    sample_type: SampleType,
    progress: &dyn ProgressSink,
) -> Result<FilterReport, SampleError> {
    if staging.exists() {
        return Err(SampleError::StagingExists(staging.to_path_buf()));
    }

    let candidates = match sample_type {
        SampleType::Bacteria => list_files(root)?,
        SampleType::Fungi => match list_fungi_candidates(root) {
            Ok(files) => files,
            Err(e) => {
                progress.report(0.0, "No ASV directory");
                return Err(e);
            }
        },
    };

    fs::create_dir_all(staging)
        .map_err(|e| SampleError::DirectoryCreation(staging.to_path_buf(), e))?;

    let mut report = FilterReport {
        candidates: candidates.len(),
        ..FilterReport::default()
    };
    let mut stage = StageProgress::start(progress, STATUS, candidates.len());

    for path in candidates {
        let name = path.file_name().and_then(|n| n.to_str());
        match name.and_then(classify) {
            Some(sample) => {
                let mut target = staging.join(sample.canonical_name());
                if sample_type == SampleType::Fungi {
                    target.set_extension("csv");
                }
                if target.exists() {
                    warn!(
                        "{} overwrites an earlier file staged as {}",
                        path.display(),
                        target.display()
                    );
                }
                fs::copy(&path, &target).map_err(|e| SampleError::FileCopy {
                    from: path.clone(),
                    to: target.clone(),
                    source: e,
                })?;
                report.copied += 1;
            }
            None => {
                debug!("Skipping {}: not a sample file", path.display());
                report.skipped += 1;
            }
        }
        stage.advance();
    }

    info!(
        "Filtered {} {} files into {} ({} skipped)",
        report.copied,
        sample_type,
        staging.display(),
        report.skipped
    );
    Ok(report)
}

/// Files directly inside `dir`, sorted by name. Subdirectories are ignored.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, SampleError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| SampleError::DirectoryRead(dir.to_path_buf(), e))? {
        let entry = entry.map_err(|e| SampleError::DirectoryRead(dir.to_path_buf(), e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn list_fungi_candidates(root: &Path) -> Result<Vec<PathBuf>, SampleError> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| SampleError::DirectoryRead(root.to_path_buf(), e))? {
        let entry = entry.map_err(|e| SampleError::DirectoryRead(root.to_path_buf(), e))?;
        let path = entry.path();
        if path.is_dir() {
            runs.push(path);
        }
    }
    runs.sort();

    let mut files = Vec::new();
    for run in runs {
        let asv = run.join(ASV_FOLDER);
        if !asv.is_dir() {
            return Err(SampleError::MissingAsvFolder(run));
        }
        files.extend(list_files(&asv)?);
    }
    Ok(files)
}
