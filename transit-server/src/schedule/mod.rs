//! Static schedule access.
//!
//! The schedule lives in a SQLite file produced by the GTFS importer and
//! replaced wholesale by the dataset refresh coordinator. Answers that do
//! not depend on the wall clock are memoized per dataset version.

mod directory;
mod error;
mod queries;
mod repository;
mod version;

pub use directory::RouteDirectory;
pub use error::ScheduleError;
pub use queries::{gtfs_date, weekday_column};
pub use repository::{RepositoryConfig, ScheduleRepository, StopsByDirection};
pub use version::{DatasetGeneration, DatasetVersion};
