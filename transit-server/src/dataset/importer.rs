//! The dataset import seam.

use std::future::Future;
use std::path::PathBuf;

use serde::Deserialize;

use super::error::ImportError;

/// One agency's static GTFS feed: a directory of `.txt` files or a `.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgencySource {
    pub path: PathBuf,
}

impl AgencySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Everything an importer needs to build a dataset.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub sources: Vec<AgencySource>,
    /// File to create. Any existing file there is replaced.
    pub destination: PathBuf,
    pub verbose: bool,
}

/// Row counts written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub agencies: usize,
    pub routes: usize,
    pub stops: usize,
    pub trips: usize,
    pub stop_times: usize,
}

/// Builds a complete schedule dataset at a destination path.
///
/// Importers may fail at any point and may leave a partial file at the
/// destination; protecting the live dataset is the coordinator's job.
pub trait DatasetImporter: Send + Sync {
    fn import(
        &self,
        request: &ImportRequest,
    ) -> impl Future<Output = Result<ImportSummary, ImportError>> + Send;
}
