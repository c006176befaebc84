//! Runs the stages in order: filter, merge, weather backfill, join.
//!
//! Stages talk through the file system. Every path comes from the
//! [`PipelineConfig`]; the intermediate directories live under its work
//! directory and belong to the pipeline.

use crate::bulk::{export_bulk_with_separator, BulkReport, DEFAULT_CHUNK_SIZE};
use crate::error::KitMergerError;
use crate::joiner::{join_metadata, JoinReport};
use crate::progress::{ProgressSink, SilentProgress};
use crate::samples::filter::{filter_samples, FilterReport};
use crate::samples::merger::{merge_samples, MergeReport};
use crate::types::channel::SampleType;
use crate::weather::backfill::{BackfillReport, WeatherBackfill, DEFAULT_RADIUS_KM};
use crate::weather::client::{ImsClient, WeatherProvider};
use bon::Builder;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_BULK_INDEX: &str = "kit_taxonomy";

/// Name of the folder [`KitDataMerger::export_to`] creates.
pub const EXPORT_FOLDER: &str = "merged_asv_data";

/// Everything a pipeline run needs to know.
///
/// ```
/// use kit_data_merger::{PipelineConfig, SampleType};
/// use std::path::Path;
///
/// let config = PipelineConfig::builder()
///     .raw_dir("raw")
///     .metadata_path("meta_data.csv")
///     .sample_type(SampleType::Fungi)
///     .work_dir("work")
///     .build();
/// assert_eq!(config.radius_km(), 32.0);
/// assert_eq!(config.staging_dir(), Path::new("work/staging"));
/// ```
#[derive(Debug, Clone, Builder)]
pub struct PipelineConfig {
    /// Raw sample tree (flat for Bacteria, one folder per run for Fungi).
    #[builder(into)]
    raw_dir: PathBuf,
    /// Kit metadata sheet. The weather stage rewrites it in place.
    #[builder(into)]
    metadata_path: PathBuf,
    sample_type: SampleType,
    /// Parent of the staging, merged, joined and bulk directories.
    #[builder(into)]
    work_dir: PathBuf,
    #[builder(default = DEFAULT_RADIUS_KM)]
    radius_km: f64,
    #[builder(into, default = ImsClient::DEFAULT_BASE_URL.to_string())]
    base_url: String,
    #[builder(into)]
    api_token: Option<String>,
    #[builder(default = b',')]
    joined_separator: u8,
    #[builder(into, default = DEFAULT_BULK_INDEX.to_string())]
    bulk_index: String,
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    bulk_chunk_size: usize,
}

impl PipelineConfig {
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("staging")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.work_dir.join("merged")
    }

    pub fn joined_dir(&self) -> PathBuf {
        self.work_dir.join("joined")
    }

    pub fn bulk_dir(&self) -> PathBuf {
        self.work_dir.join("bulk")
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn joined_separator(&self) -> u8 {
        self.joined_separator
    }

    pub fn bulk_index(&self) -> &str {
        &self.bulk_index
    }

    pub fn bulk_chunk_size(&self) -> usize {
        self.bulk_chunk_size
    }
}

/// Per-stage counts of a full run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub filter: FilterReport,
    pub merge: MergeReport,
    pub weather: BackfillReport,
    pub join: JoinReport,
}

/// The pipeline orchestrator.
///
/// File stages run on tokio's blocking pool; the weather stage runs on the
/// calling task.
pub struct KitDataMerger<P: WeatherProvider = ImsClient> {
    config: PipelineConfig,
    backfill: WeatherBackfill<P>,
    progress: Arc<dyn ProgressSink>,
}

impl KitDataMerger<ImsClient> {
    /// A pipeline that queries the IMS network configured in `config`.
    pub fn new(config: PipelineConfig) -> Self {
        let client = ImsClient::new(config.base_url.clone(), config.api_token.clone());
        Self::with_provider(config, client)
    }
}

impl<P: WeatherProvider> KitDataMerger<P> {
    pub fn with_provider(config: PipelineConfig, provider: P) -> Self {
        let backfill = WeatherBackfill::builder()
            .provider(provider)
            .radius_km(config.radius_km)
            .build();
        Self {
            config,
            backfill,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Sends stage progress to `sink` instead of discarding it.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Filter, merge, weather backfill and join, stopping at the first failure.
    pub async fn run(&self) -> Result<PipelineReport, KitMergerError> {
        let filter = self.filter_only().await?;
        let merge = self.merge_only().await?;
        let weather = self.backfill_only().await?;
        let join = self.join_only().await?;
        info!(
            "Pipeline finished: {} files staged, {} kits merged, {} kits joined",
            filter.copied, merge.kits_written, join.files_joined
        );
        Ok(PipelineReport {
            filter,
            merge,
            weather,
            join,
        })
    }

    /// Copies the sample files of the raw tree into a fresh staging directory.
    pub async fn filter_only(&self) -> Result<FilterReport, KitMergerError> {
        let staging = self.config.staging_dir();
        remove_dir_if_exists(&staging)?;
        let raw_dir = self.config.raw_dir.clone();
        let sample_type = self.config.sample_type;
        let progress = Arc::clone(&self.progress);
        info!("Filtering {} samples from {}", sample_type, raw_dir.display());
        let report = tokio::task::spawn_blocking(move || {
            filter_samples(&raw_dir, &staging, sample_type, progress.as_ref())
        })
        .await??;
        Ok(report)
    }

    /// Merges the staged files into per-kit tables, replacing earlier results.
    pub async fn merge_only(&self) -> Result<MergeReport, KitMergerError> {
        let staging = self.config.staging_dir();
        let merged = self.config.merged_dir();
        remove_dir_if_exists(&merged)?;
        let sample_type = self.config.sample_type;
        let progress = Arc::clone(&self.progress);
        let report = tokio::task::spawn_blocking(move || {
            merge_samples(&staging, &merged, sample_type, progress.as_ref())
        })
        .await??;
        Ok(report)
    }

    /// Backfills the weather columns of the metadata sheet.
    pub async fn backfill_only(&self) -> Result<BackfillReport, KitMergerError> {
        let report = self
            .backfill
            .run(&self.config.metadata_path, self.progress.as_ref())
            .await?;
        Ok(report)
    }

    /// Joins the merged tables with the metadata sheet.
    pub async fn join_only(&self) -> Result<JoinReport, KitMergerError> {
        let merged = self.config.merged_dir();
        let metadata = self.config.metadata_path.clone();
        let joined = self.config.joined_dir();
        let separator = self.config.joined_separator;
        let sample_type = self.config.sample_type;
        let progress = Arc::clone(&self.progress);
        let report = tokio::task::spawn_blocking(move || {
            join_metadata(
                &merged,
                &metadata,
                &joined,
                sample_type,
                separator,
                progress.as_ref(),
            )
        })
        .await??;
        Ok(report)
    }

    /// Turns the joined tables into bulk-index payload files.
    pub async fn bulk_only(&self) -> Result<BulkReport, KitMergerError> {
        let joined = self.config.joined_dir();
        let bulk = self.config.bulk_dir();
        let separator = self.config.joined_separator;
        let index = self.config.bulk_index.clone();
        let chunk_size = self.config.bulk_chunk_size;
        let report = tokio::task::spawn_blocking(move || {
            export_bulk_with_separator(&joined, separator, &bulk, &index, chunk_size)
        })
        .await??;
        Ok(report)
    }

    /// Copies the merged per-kit tables into `<dest>/merged_asv_data`.
    ///
    /// Fails without copying anything when that folder already exists.
    /// Returns the number of files copied.
    pub fn export_to(&self, dest: &Path) -> Result<usize, KitMergerError> {
        let target = dest.join(EXPORT_FOLDER);
        if target.exists() {
            return Err(KitMergerError::ExportExists(target));
        }
        let merged = self.config.merged_dir();
        let entries =
            fs::read_dir(&merged).map_err(|e| KitMergerError::DirectoryRead(merged.clone(), e))?;
        fs::create_dir_all(&target)
            .map_err(|e| KitMergerError::DirectoryPreparation(target.clone(), e))?;

        let mut copied = 0;
        for entry in entries {
            let from = entry
                .map_err(|e| KitMergerError::DirectoryRead(merged.clone(), e))?
                .path();
            if !from.is_file() {
                continue;
            }
            let Some(file_name) = from.file_name() else {
                continue;
            };
            let to = target.join(file_name);
            fs::copy(&from, &to).map_err(|source| KitMergerError::Export {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
            copied += 1;
        }
        info!("Exported {} kit files to {}", copied, target.display());
        Ok(copied)
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), KitMergerError> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .map_err(|e| KitMergerError::DirectoryPreparation(dir.to_path_buf(), e))?;
    }
    Ok(())
}
