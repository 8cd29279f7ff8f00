//! Dataset generation tracking.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies which static dataset generation is authoritative.
///
/// Memoized repository answers are keyed by the version they were computed
/// against, so advancing the version invalidates all of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DatasetVersion(u64);

impl DatasetVersion {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Shared, monotonically increasing dataset version counter.
///
/// Cloning yields another handle to the same counter. Only the dataset
/// refresh coordinator advances it, after a successful swap.
#[derive(Debug, Clone, Default)]
pub struct DatasetGeneration {
    counter: Arc<AtomicU64>,
}

impl DatasetGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently authoritative version.
    pub fn current(&self) -> DatasetVersion {
        DatasetVersion(self.counter.load(Ordering::Acquire))
    }

    /// Advance to the next version and return it.
    pub fn advance(&self) -> DatasetVersion {
        DatasetVersion(self.counter.fetch_add(1, Ordering::AcqRel) + 1)
    }
}
