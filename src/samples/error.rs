use crate::table::TableError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Staging directory '{0}' already exists")]
    StagingExists(PathBuf),

    #[error("Sequencing run '{0}' has no ASV directory")]
    MissingAsvFolder(PathBuf),

    #[error("Failed to read directory '{0}'")]
    DirectoryRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to create directory '{0}'")]
    DirectoryCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to copy '{from}' to '{to}'")]
    FileCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}
