//! Periodic replacement of the static schedule dataset.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::schedule::{DatasetGeneration, DatasetVersion};

use super::error::ImportError;
use super::importer::{AgencySource, DatasetImporter, ImportRequest, ImportSummary};
use super::timestamp::{DEFAULT_TIMESTAMP_PATH, RefreshTimestamp};

/// Configuration for the dataset refresh coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Canonical path of the SQLite dataset.
    pub dataset_path: PathBuf,

    /// Where the last successful import time is recorded.
    pub timestamp_path: PathBuf,

    /// A dataset younger than this is not reimported.
    pub freshness_window: TimeDelta,

    /// Pause after a successful swap before the new generation is announced.
    pub settle_delay: Duration,

    pub sources: Vec<AgencySource>,

    pub verbose: bool,
}

impl CoordinatorConfig {
    pub fn new(dataset_path: impl Into<PathBuf>, sources: Vec<AgencySource>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            timestamp_path: PathBuf::from(DEFAULT_TIMESTAMP_PATH),
            freshness_window: TimeDelta::days(7),
            settle_delay: Duration::from_secs(1),
            sources,
            verbose: false,
        }
    }

    pub fn with_timestamp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.timestamp_path = path.into();
        self
    }

    pub fn with_freshness_window(mut self, window: TimeDelta) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// What a coordinator run did.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The dataset is within the freshness window; nothing was imported.
    Fresh { last_update: DateTime<Utc> },
    /// A new generation was installed.
    Reimported {
        version: DatasetVersion,
        summary: ImportSummary,
    },
    /// The import failed and the previous dataset was kept.
    Failed { error: ImportError },
}

/// Decides when the dataset is stale and swaps in a new one.
///
/// The importer builds into a staging file next to the dataset. Only a
/// complete import is renamed over the canonical path, and a hard-linked
/// backup of the previous generation is kept until the swap is done, so the
/// canonical path always holds one complete generation.
pub struct DatasetRefreshCoordinator<I> {
    config: CoordinatorConfig,
    importer: I,
    generation: DatasetGeneration,
    timestamp: RefreshTimestamp,
    run_lock: Mutex<()>,
}

impl<I: DatasetImporter> DatasetRefreshCoordinator<I> {
    pub fn new(config: CoordinatorConfig, importer: I, generation: DatasetGeneration) -> Self {
        let timestamp = RefreshTimestamp::new(&config.timestamp_path);
        Self {
            config,
            importer,
            generation,
            timestamp,
            run_lock: Mutex::new(()),
        }
    }

    pub fn generation(&self) -> &DatasetGeneration {
        &self.generation
    }

    fn backup_path(&self) -> PathBuf {
        with_suffix(&self.config.dataset_path, ".old")
    }

    fn staging_path(&self) -> PathBuf {
        with_suffix(&self.config.dataset_path, ".new")
    }

    /// Check freshness and reimport if due. Failures are logged and
    /// returned as [`RefreshOutcome::Failed`], never raised.
    pub async fn run(&self) -> RefreshOutcome {
        let _serial = self.run_lock.lock().await;

        self.recover().await;

        if let Some(last_update) = self.timestamp.load().await {
            let age = Utc::now() - last_update;
            if exists(&self.config.dataset_path).await && age < self.config.freshness_window {
                debug!(%last_update, "schedule dataset is fresh");
                return RefreshOutcome::Fresh { last_update };
            }
        }

        info!(path = %self.config.dataset_path.display(), "reimporting schedule dataset");
        match self.reimport().await {
            Ok(summary) => {
                let version = self.generation.advance();
                info!(%version, trips = summary.trips, "installed new schedule dataset");
                RefreshOutcome::Reimported { version, summary }
            }
            Err(e) => {
                error!(error = %e, "schedule import failed; keeping previous dataset");
                RefreshOutcome::Failed { error: e }
            }
        }
    }

    async fn reimport(&self) -> Result<ImportSummary, ImportError> {
        let canonical = &self.config.dataset_path;
        let backup = self.backup_path();

        let had_dataset = exists(canonical).await;
        if had_dataset {
            tokio::fs::hard_link(canonical, &backup)
                .await
                .map_err(|e| ImportError::io(&backup, e))?;
        }

        let summary = match self.import_and_swap().await {
            Ok(summary) => summary,
            Err(e) => {
                self.roll_back(had_dataset).await;
                return Err(e);
            }
        };

        if had_dataset {
            remove_if_exists(&backup).await;
        }
        // The new dataset is live either way; a lost timestamp only means
        // the next run imports again
        if let Err(e) = self.timestamp.save(Utc::now()).await {
            warn!(error = %e, "failed to record import time");
        }
        tokio::time::sleep(self.config.settle_delay).await;

        Ok(summary)
    }

    async fn import_and_swap(&self) -> Result<ImportSummary, ImportError> {
        let staging = self.staging_path();
        let request = ImportRequest {
            sources: self.config.sources.clone(),
            destination: staging.clone(),
            verbose: self.config.verbose,
        };

        let summary = self.importer.import(&request).await?;

        tokio::fs::rename(&staging, &self.config.dataset_path)
            .await
            .map_err(|e| ImportError::io(&staging, e))?;
        Ok(summary)
    }

    async fn roll_back(&self, had_dataset: bool) {
        let canonical = &self.config.dataset_path;
        let backup = self.backup_path();

        remove_if_exists(&self.staging_path()).await;

        if had_dataset {
            if !exists(canonical).await {
                if let Err(e) = tokio::fs::hard_link(&backup, canonical).await {
                    error!(error = %e, backup = %backup.display(), "failed to restore dataset from backup");
                    return;
                }
            }
            remove_if_exists(&backup).await;
        }
    }

    /// Repair leftovers from a run that was interrupted by a crash.
    async fn recover(&self) {
        let canonical = &self.config.dataset_path;
        let backup = self.backup_path();

        remove_if_exists(&self.staging_path()).await;

        if !exists(&backup).await {
            return;
        }

        if exists(canonical).await {
            debug!(backup = %backup.display(), "removing stale dataset backup");
        } else {
            match tokio::fs::hard_link(&backup, canonical).await {
                Ok(()) => warn!(path = %canonical.display(), "restored dataset from backup"),
                Err(e) => {
                    error!(error = %e, "failed to restore dataset from backup");
                    return;
                }
            }
        }
        remove_if_exists(&backup).await;
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::{TempDir, tempdir};

    /// Writes a marker file at the destination, then succeeds or fails.
    struct FakeImporter {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeImporter {
        fn succeeding() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DatasetImporter for FakeImporter {
        async fn import(&self, request: &ImportRequest) -> Result<ImportSummary, ImportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                tokio::fs::write(&request.destination, b"half written").await.unwrap();
                return Err(ImportError::NoSources);
            }
            tokio::fs::write(&request.destination, b"new generation").await.unwrap();
            Ok(ImportSummary {
                trips: 7,
                ..ImportSummary::default()
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        config: CoordinatorConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let config = CoordinatorConfig::new(
                dir.path().join("gtfs.sqlite"),
                vec![AgencySource::new(dir.path().join("feed"))],
            )
            .with_timestamp_path(dir.path().join("stamp.json"))
            .with_settle_delay(Duration::ZERO);
            Self { dir, config }
        }

        fn dataset(&self) -> PathBuf {
            self.config.dataset_path.clone()
        }

        fn file(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn coordinator(&self, importer: FakeImporter) -> DatasetRefreshCoordinator<FakeImporter> {
            DatasetRefreshCoordinator::new(self.config.clone(), importer, DatasetGeneration::new())
        }

        async fn stamp(&self, at: DateTime<Utc>) {
            RefreshTimestamp::new(&self.config.timestamp_path)
                .save(at)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn fresh_dataset_is_not_reimported() {
        let fx = Fixture::new();
        std::fs::write(fx.dataset(), b"current").unwrap();
        fx.stamp(Utc::now() - TimeDelta::days(1)).await;

        let coordinator = fx.coordinator(FakeImporter::succeeding());
        let outcome = coordinator.run().await;

        assert!(matches!(outcome, RefreshOutcome::Fresh { .. }));
        assert_eq!(coordinator.importer.calls(), 0);
        assert_eq!(coordinator.generation().current(), DatasetVersion::default());
    }

    #[tokio::test]
    async fn stale_dataset_is_replaced() {
        let fx = Fixture::new();
        std::fs::write(fx.dataset(), b"old generation").unwrap();
        let old_stamp = Utc::now() - TimeDelta::days(8);
        fx.stamp(old_stamp).await;

        let coordinator = fx.coordinator(FakeImporter::succeeding());
        let outcome = coordinator.run().await;

        let (version, summary) = match outcome {
            RefreshOutcome::Reimported { version, summary } => (version, summary),
            other => panic!("expected reimport, got {other:?}"),
        };
        assert_eq!(summary.trips, 7);
        assert_eq!(version, coordinator.generation().current());
        assert!(version > DatasetVersion::default());

        assert_eq!(std::fs::read(fx.dataset()).unwrap(), b"new generation");
        assert!(!fx.file("gtfs.sqlite.old").exists());
        assert!(!fx.file("gtfs.sqlite.new").exists());

        let recorded = RefreshTimestamp::new(fx.file("stamp.json")).load().await.unwrap();
        assert!(recorded > old_stamp);
    }

    #[tokio::test]
    async fn missing_dataset_is_imported_despite_fresh_stamp() {
        let fx = Fixture::new();
        fx.stamp(Utc::now()).await;

        let coordinator = fx.coordinator(FakeImporter::succeeding());
        assert!(matches!(coordinator.run().await, RefreshOutcome::Reimported { .. }));
        assert_eq!(std::fs::read(fx.dataset()).unwrap(), b"new generation");
    }

    #[tokio::test]
    async fn failed_import_leaves_dataset_bytes_unchanged() {
        let fx = Fixture::new();
        std::fs::write(fx.dataset(), b"old generation").unwrap();

        let coordinator = fx.coordinator(FakeImporter::failing());
        let outcome = coordinator.run().await;

        assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
        assert_eq!(std::fs::read(fx.dataset()).unwrap(), b"old generation");
        assert!(!fx.file("gtfs.sqlite.old").exists());
        assert!(!fx.file("gtfs.sqlite.new").exists());
        assert!(!fx.file("stamp.json").exists());
        assert_eq!(coordinator.generation().current(), DatasetVersion::default());
    }

    #[tokio::test]
    async fn failed_first_import_leaves_nothing_behind() {
        let fx = Fixture::new();

        let coordinator = fx.coordinator(FakeImporter::failing());
        assert!(matches!(coordinator.run().await, RefreshOutcome::Failed { .. }));

        assert!(!fx.dataset().exists());
        assert!(!fx.file("gtfs.sqlite.new").exists());
    }

    #[tokio::test]
    async fn recovers_dataset_from_leftover_backup() {
        let fx = Fixture::new();
        // A crash after the backup link and before the swap finished
        std::fs::write(fx.file("gtfs.sqlite.old"), b"old generation").unwrap();
        std::fs::write(fx.file("gtfs.sqlite.new"), b"half written").unwrap();
        fx.stamp(Utc::now()).await;

        let coordinator = fx.coordinator(FakeImporter::succeeding());
        let outcome = coordinator.run().await;

        assert!(matches!(outcome, RefreshOutcome::Fresh { .. }));
        assert_eq!(std::fs::read(fx.dataset()).unwrap(), b"old generation");
        assert!(!fx.file("gtfs.sqlite.old").exists());
        assert!(!fx.file("gtfs.sqlite.new").exists());
    }

    #[tokio::test]
    async fn stale_backup_is_discarded() {
        let fx = Fixture::new();
        std::fs::write(fx.dataset(), b"current").unwrap();
        std::fs::write(fx.file("gtfs.sqlite.old"), b"previous").unwrap();
        fx.stamp(Utc::now()).await;

        let coordinator = fx.coordinator(FakeImporter::succeeding());
        coordinator.run().await;

        assert_eq!(std::fs::read(fx.dataset()).unwrap(), b"current");
        assert!(!fx.file("gtfs.sqlite.old").exists());
    }

    #[tokio::test]
    async fn repository_follows_swapped_generation() {
        use crate::dataset::GtfsImporter;
        use crate::schedule::{RepositoryConfig, ScheduleRepository};

        let dir = tempdir().unwrap();
        let feed = dir.path().join("feed");
        crate::testing::write_gtfs_fixture(&feed);

        let db = dir.path().join("gtfs.sqlite");
        let generation = DatasetGeneration::new();
        let config = CoordinatorConfig::new(&db, vec![AgencySource::new(&feed)])
            .with_timestamp_path(dir.path().join("stamp.json"))
            .with_settle_delay(Duration::ZERO);

        let first =
            DatasetRefreshCoordinator::new(config.clone(), GtfsImporter::new(), generation.clone());
        assert!(matches!(first.run().await, RefreshOutcome::Reimported { .. }));

        let repo = ScheduleRepository::open(RepositoryConfig::new(&db), generation.clone())
            .await
            .unwrap();
        assert_eq!(repo.routes().await.unwrap().len(), 2);

        std::fs::write(
            feed.join("routes.txt"),
            "route_id,agency_id,route_short_name,route_long_name,route_type\nR46,A1,46A,Phoenix Park,3\n",
        )
        .unwrap();
        let forced = DatasetRefreshCoordinator::new(
            config.with_freshness_window(TimeDelta::zero()),
            GtfsImporter::new(),
            generation.clone(),
        );
        assert!(matches!(forced.run().await, RefreshOutcome::Reimported { .. }));

        let routes = repo.routes().await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_id, "R46");
    }

    /// Real import with pauses on both sides, so readers overlap every step.
    struct PausingImporter {
        inner: crate::dataset::GtfsImporter,
        pause: Duration,
    }

    impl DatasetImporter for PausingImporter {
        async fn import(&self, request: &ImportRequest) -> Result<ImportSummary, ImportError> {
            tokio::time::sleep(self.pause).await;
            let summary = self.inner.import(request).await?;
            tokio::time::sleep(self.pause).await;
            Ok(summary)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_succeed_while_reimport_runs() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool;

        use crate::dataset::GtfsImporter;
        use crate::schedule::{RepositoryConfig, ScheduleRepository};
        use crate::testing::FIXTURE_CANCELLED_ON;

        let dir = tempdir().unwrap();
        let feed = dir.path().join("feed");
        crate::testing::write_gtfs_fixture(&feed);

        let db = dir.path().join("gtfs.sqlite");
        let generation = DatasetGeneration::new();
        let config = CoordinatorConfig::new(&db, vec![AgencySource::new(&feed)])
            .with_timestamp_path(dir.path().join("stamp.json"))
            .with_settle_delay(Duration::from_millis(20));

        let first =
            DatasetRefreshCoordinator::new(config.clone(), GtfsImporter::new(), generation.clone());
        assert!(matches!(first.run().await, RefreshOutcome::Reimported { .. }));

        let repo = Arc::new(
            ScheduleRepository::open(RepositoryConfig::new(&db), generation.clone())
                .await
                .unwrap(),
        );

        std::fs::write(
            feed.join("routes.txt"),
            "route_id,agency_id,route_short_name,route_long_name,route_type
R46,A1,46A,Phoenix Park,3
",
        )
        .unwrap();
        let coordinator = DatasetRefreshCoordinator::new(
            config.with_freshness_window(TimeDelta::zero()),
            PausingImporter {
                inner: GtfsImporter::new(),
                pause: Duration::from_millis(50),
            },
            generation.clone(),
        );

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let repo = repo.clone();
                let done = done.clone();
                tokio::spawn(async move {
                    let mut reads = 0usize;
                    while !done.load(Ordering::SeqCst) {
                        let tz = repo.route_timezone("R46").await;
                        assert!(tz.is_ok(), "route_timezone failed: {tz:?}");
                        let entries = repo.stop_times_on("R46", "S2", FIXTURE_CANCELLED_ON).await;
                        assert!(entries.is_ok(), "stop_times_on failed: {entries:?}");
                        assert_eq!(entries.unwrap().len(), 2);
                        reads += 1;
                        tokio::task::yield_now().await;
                    }
                    reads
                })
            })
            .collect();

        let outcome = coordinator.run().await;
        done.store(true, Ordering::SeqCst);

        assert!(matches!(outcome, RefreshOutcome::Reimported { .. }));
        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
        assert_eq!(repo.routes().await.unwrap().len(), 1);
    }

    #[test]
    fn suffix_paths() {
        let path = Path::new("/data/gtfs.sqlite");
        assert_eq!(with_suffix(path, ".old"), PathBuf::from("/data/gtfs.sqlite.old"));
    }
}
