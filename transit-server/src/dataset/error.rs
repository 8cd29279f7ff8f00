//! Dataset import and refresh error types.

use std::path::PathBuf;

/// Errors from building or swapping the schedule dataset.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// No agency sources are configured
    #[error("no GTFS sources configured")]
    NoSources,

    /// A required GTFS file is missing from a source
    #[error("{file} missing from GTFS source {}", source_path.display())]
    MissingFile {
        file: &'static str,
        source_path: PathBuf,
    },

    /// Filesystem operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A GTFS file could not be parsed
    #[error("invalid {file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },

    /// A zipped source could not be read
    #[error("invalid GTFS archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Writing the SQLite dataset failed
    #[error("dataset write failed: {0}")]
    Database(#[from] sqlx::Error),

    /// The blocking parse task panicked or was cancelled
    #[error("import task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ImportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }
}
