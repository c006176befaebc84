use crate::bulk::BulkError;
use crate::joiner::JoinError;
use crate::samples::error::SampleError;
use crate::table::TableError;
use crate::weather::error::WeatherError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KitMergerError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Bulk(#[from] BulkError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Export directory '{0}' already exists, choose a different directory")]
    ExportExists(PathBuf),

    #[error("Failed to copy '{from}' to '{to}'")]
    Export {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{0}'")]
    DirectoryRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to prepare directory '{0}'")]
    DirectoryPreparation(PathBuf, #[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
