//! Building and replacing the static schedule dataset.

mod coordinator;
mod error;
mod gtfs;
mod importer;
mod timestamp;

pub use coordinator::{CoordinatorConfig, DatasetRefreshCoordinator, RefreshOutcome};
pub use error::ImportError;
pub use gtfs::GtfsImporter;
pub use importer::{AgencySource, DatasetImporter, ImportRequest, ImportSummary};
pub use timestamp::{DEFAULT_TIMESTAMP_PATH, RefreshTimestamp, RefreshTimestampRecord};
