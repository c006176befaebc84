//! Merges staged channel files into one normalized table per kit.
//!
//! Every staged file holds one channel of one kit. Rows are keyed by taxon
//! (see [`taxon_key`]) so the frequencies of the same taxon across channels
//! end up in a single row; each channel is then normalized to proportions of
//! that channel's total within the kit.

use crate::progress::{ProgressSink, StageProgress};
use crate::samples::classifier::classify;
use crate::samples::error::SampleError;
use crate::samples::taxonomy::{parse_lineage, taxon_key, NO_TAXONOMY, RANK_COLUMNS};
use crate::table::{CsvTable, TableError};
use crate::types::channel::{Channel, SampleType};
use indexmap::IndexMap;
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const STATUS: &str = "Merging data...";

/// Raw frequencies of one taxon, one slot per channel in [`Channel::ALL`] order.
pub type ChannelFrequencies = [f64; 5];

/// All taxa of one kit, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KitTaxa {
    taxa: IndexMap<String, ChannelFrequencies>,
}

impl KitTaxa {
    /// Sets the frequency of `key` in `channel`. A later file for the same
    /// kit, taxon and channel replaces the earlier value.
    pub fn record(&mut self, key: String, channel: Channel, frequency: f64) {
        self.taxa.entry(key).or_insert([0.0; 5])[channel.index()] = frequency;
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn raw(&self, key: &str) -> Option<&ChannelFrequencies> {
        self.taxa.get(key)
    }

    /// Sum of every taxon's raw frequency, per channel.
    pub fn channel_totals(&self) -> ChannelFrequencies {
        let mut totals = [0.0; 5];
        for frequencies in self.taxa.values() {
            for (total, value) in totals.iter_mut().zip(frequencies) {
                *total += value;
            }
        }
        totals
    }

    /// Each taxon with its per-channel proportions. A channel whose total is
    /// zero yields `0.0` for every taxon.
    pub fn normalized(&self) -> Vec<(&str, ChannelFrequencies)> {
        let totals = self.channel_totals();
        self.taxa
            .iter()
            .map(|(key, raw)| {
                let proportions = std::array::from_fn(|i| {
                    if totals[i] == 0.0 {
                        0.0
                    } else {
                        raw[i] / totals[i]
                    }
                });
                (key.as_str(), proportions)
            })
            .collect()
    }
}

/// Counts gathered while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Staged files read into the merge.
    pub files_merged: usize,
    /// Staged files skipped because of their name or missing columns.
    pub files_skipped: usize,
    /// Rows dropped because they carry no taxonomy.
    pub rows_excluded: usize,
    /// Per-kit files written.
    pub kits_written: usize,
}

/// Removes the staging directory when dropped, whether the merge succeeded or not.
struct StagingCleanup<'a>(&'a Path);

impl Drop for StagingCleanup<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(self.0) {
            warn!("Failed to remove staging directory {}: {}", self.0.display(), e);
        }
    }
}

/// Accumulates staged files kit by kit.
#[derive(Debug, Clone)]
pub struct TaxonMerger {
    sample_type: SampleType,
    kits: BTreeMap<String, KitTaxa>,
}

impl TaxonMerger {
    pub fn new(sample_type: SampleType) -> Self {
        Self {
            sample_type,
            kits: BTreeMap::new(),
        }
    }

    pub fn kits(&self) -> &BTreeMap<String, KitTaxa> {
        &self.kits
    }

    /// Adds the rows of one staged file.
    ///
    /// Returns `Ok(None)` when the file is skipped (not a sample file name or
    /// missing the columns its sample type needs), otherwise the number of
    /// rows dropped for having no taxonomy.
    pub fn add_file(&mut self, path: &Path) -> Result<Option<usize>, SampleError> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let clean_name = file_name.split('.').next().unwrap_or(file_name);
        let Some(sample) = classify(clean_name) else {
            debug!("Skipping {}: not a sample file", path.display());
            return Ok(None);
        };

        let table = CsvTable::read(path)?;
        let Some(columns) = self.locate_columns(&table, clean_name) else {
            warn!(
                "Skipping {}: missing the columns needed for {} samples",
                path.display(),
                self.sample_type
            );
            return Ok(None);
        };

        let mut kept = Vec::new();
        let mut excluded = 0;
        for r in 0..table.height() {
            let Some(taxonomy) = table.get(r, columns.taxonomy) else {
                continue;
            };
            if taxonomy == NO_TAXONOMY {
                excluded += 1;
                continue;
            }
            let id = table.get(r, columns.id).unwrap_or_default();
            let frequency = table
                .get(r, columns.frequency)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            kept.push((taxon_key(self.sample_type, id, taxonomy), frequency));
        }

        // A kit only exists once one of its rows survives.
        if !kept.is_empty() {
            let kit = self.kits.entry(sample.kit_id).or_default();
            for (key, frequency) in kept {
                kit.record(key, sample.channel, frequency);
            }
        }
        Ok(Some(excluded))
    }

    fn locate_columns(&self, table: &CsvTable, clean_name: &str) -> Option<SourceColumns> {
        let id = table.column_index("id")?;
        match self.sample_type {
            SampleType::Fungi => Some(SourceColumns {
                id,
                taxonomy: table.column_index("taxon")?,
                frequency: table
                    .column_index("freq")
                    .or_else(|| table.column_index("prob"))?,
            }),
            // Bacteria tables keep the frequency under a column named after the sample file.
            SampleType::Bacteria => Some(SourceColumns {
                id,
                taxonomy: table
                    .column_index("taxon")
                    .or_else(|| table.column_index_ignore_case("taxonomy"))?,
                frequency: table.column_index_ignore_case(clean_name)?,
            }),
        }
    }

    /// Writes one `S_<kit>_<type>.csv` per kit into `output_dir` and returns
    /// the number of files written.
    pub fn write_kits(&self, output_dir: &Path) -> Result<usize, SampleError> {
        fs::create_dir_all(output_dir)
            .map_err(|e| SampleError::DirectoryCreation(output_dir.to_path_buf(), e))?;
        for (kit_id, taxa) in &self.kits {
            let path = output_dir.join(merged_file_name(kit_id, self.sample_type));
            self.write_kit(kit_id, taxa, &path)?;
        }
        Ok(self.kits.len())
    }

    fn write_kit(&self, kit_id: &str, taxa: &KitTaxa, path: &Path) -> Result<(), TableError> {
        let rows = taxa.normalized();
        let lineages: Vec<_> = rows
            .iter()
            .map(|(key, _)| parse_lineage(self.sample_type, key))
            .collect();

        let mut columns = vec![Column::new("kit_id".into(), vec![kit_id; rows.len()])];
        if self.sample_type == SampleType::Fungi {
            let ids: Vec<&str> = lineages.iter().map(|l| l.id.as_str()).collect();
            columns.push(Column::new("id".into(), ids));
        }
        for (rank, name) in RANK_COLUMNS.iter().enumerate() {
            let values: Vec<&str> = lineages.iter().map(|l| l.ranks[rank].as_str()).collect();
            columns.push(Column::new((*name).into(), values));
        }
        for channel in Channel::ALL {
            let values: Vec<f64> = rows.iter().map(|(_, p)| p[channel.index()]).collect();
            columns.push(Column::new(channel.code().into(), values));
        }

        let mut df = DataFrame::new(columns).map_err(|e| TableError::Frame(path.to_path_buf(), e))?;
        let mut file =
            File::create(path).map_err(|e| TableError::FileCreate(path.to_path_buf(), e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| TableError::CsvWrite(path.to_path_buf(), e))
    }
}

struct SourceColumns {
    id: usize,
    taxonomy: usize,
    frequency: usize,
}

/// Number of columns in a merged kit file: `kit_id`, `id` (Fungi only), the
/// rank columns and one column per channel.
pub fn merged_width(sample_type: SampleType) -> usize {
    let id = usize::from(sample_type == SampleType::Fungi);
    1 + id + RANK_COLUMNS.len() + Channel::ALL.len()
}

/// `S_<kit>_<type>.csv`
pub fn merged_file_name(kit_id: &str, sample_type: SampleType) -> String {
    format!("S_{kit_id}_{sample_type}.csv")
}

/// Merges every file in `staging` into per-kit files in `output_dir`.
///
/// The staging directory is deleted when this returns, on success and on error.
pub fn merge_samples(
    staging: &Path,
    output_dir: &Path,
    sample_type: SampleType,
    progress: &dyn ProgressSink,
) -> Result<MergeReport, SampleError> {
    let _cleanup = StagingCleanup(staging);

    let files = staged_files(staging)?;
    let mut merger = TaxonMerger::new(sample_type);
    let mut report = MergeReport::default();
    let mut stage = StageProgress::start(progress, STATUS, files.len());

    for path in &files {
        match merger.add_file(path)? {
            Some(excluded) => {
                report.files_merged += 1;
                report.rows_excluded += excluded;
            }
            None => report.files_skipped += 1,
        }
        stage.advance();
    }

    report.kits_written = merger.write_kits(output_dir)?;
    info!(
        "Merged {} files into {} kit files in {} ({} skipped, {} rows without taxonomy)",
        report.files_merged,
        report.kits_written,
        output_dir.display(),
        report.files_skipped,
        report.rows_excluded
    );
    Ok(report)
}

fn staged_files(staging: &Path) -> Result<Vec<PathBuf>, SampleError> {
    let entries =
        fs::read_dir(staging).map_err(|e| SampleError::DirectoryRead(staging.to_path_buf(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| SampleError::DirectoryRead(staging.to_path_buf(), e))?
            .path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
