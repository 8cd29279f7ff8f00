//! Read-only access to the static schedule dataset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use moka::future::Cache as MokaCache;
use sqlx::ConnectOptions;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{Agency, RouteSummary, ScheduleEntry, StopOnRoute};

use super::directory::RouteDirectory;
use super::error::ScheduleError;
use super::queries;
use super::version::{DatasetGeneration, DatasetVersion};

/// Memo key: query argument plus the dataset version it was answered from.
type MemoKey = (String, DatasetVersion);

/// Stops on a route, indexed by [`Direction::index`](crate::domain::Direction::index).
pub type StopsByDirection = Arc<[Vec<StopOnRoute>; 2]>;

/// Configuration for the schedule repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Path to the SQLite dataset.
    pub path: PathBuf,

    /// Maximum pooled read connections.
    pub max_connections: u32,

    /// Maximum memoized answers per query kind.
    pub memo_capacity: u64,
}

impl RepositoryConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 4,
            memo_capacity: 10_000,
        }
    }
}

/// The pool for one dataset generation.
struct OpenDataset {
    version: DatasetVersion,
    pool: SqlitePool,
}

/// Read-only accessor over the imported GTFS dataset.
///
/// Holds a connection pool on the dataset file. When the dataset version
/// advances the pool is reopened on the next query, so new queries read the
/// new generation while queries already running finish against the old one.
pub struct ScheduleRepository {
    config: RepositoryConfig,
    generation: DatasetGeneration,
    dataset: RwLock<OpenDataset>,
    timezones: MokaCache<MemoKey, Tz>,
    stops: MokaCache<MemoKey, StopsByDirection>,
    directories: MokaCache<DatasetVersion, Arc<RouteDirectory>>,
}

impl ScheduleRepository {
    /// Open the dataset at the configured path.
    pub async fn open(
        config: RepositoryConfig,
        generation: DatasetGeneration,
    ) -> Result<Self, ScheduleError> {
        let version = generation.current();
        let pool = connect(&config).await?;
        info!(path = %config.path.display(), %version, "opened schedule dataset");

        Ok(Self {
            timezones: MokaCache::builder()
                .max_capacity(config.memo_capacity)
                .build(),
            stops: MokaCache::builder()
                .max_capacity(config.memo_capacity)
                .build(),
            directories: MokaCache::builder().max_capacity(2).build(),
            dataset: RwLock::new(OpenDataset { version, pool }),
            generation,
            config,
        })
    }

    /// Path of the dataset file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Generation that the next query will read.
    pub fn version(&self) -> DatasetVersion {
        self.generation.current()
    }

    /// The pool for the current generation, reopening it if the coordinator
    /// swapped the dataset since the last query.
    async fn pool(&self) -> Result<(SqlitePool, DatasetVersion), ScheduleError> {
        let current = self.generation.current();
        {
            let open = self.dataset.read().await;
            if open.version == current {
                return Ok((open.pool.clone(), open.version));
            }
        }

        let mut open = self.dataset.write().await;
        if open.version != current {
            let pool = connect(&self.config).await?;
            info!(from = %open.version, to = %current, "reopened schedule dataset");
            // Readers may still hold the old pool; it closes on last drop
            open.pool = pool;
            open.version = current;

            self.timezones.invalidate_all();
            self.stops.invalidate_all();
            self.directories.invalidate_all();
        }

        Ok((open.pool.clone(), open.version))
    }

    /// Timezone of the agency operating a route.
    ///
    /// Memoized per (route, dataset version).
    pub async fn route_timezone(&self, route_id: &str) -> Result<Tz, ScheduleError> {
        let (pool, version) = self.pool().await?;
        let key = (route_id.to_string(), version);

        if let Some(tz) = self.timezones.get(&key).await {
            return Ok(tz);
        }

        let name = queries::agency_timezone(&pool, route_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound {
                route_id: route_id.to_string(),
            })?;

        let tz: Tz = name.parse().map_err(|_| {
            warn!(route_id, timezone = %name, "agency timezone is not a known IANA zone");
            ScheduleError::NotFound {
                route_id: route_id.to_string(),
            }
        })?;

        self.timezones.insert(key, tz).await;
        Ok(tz)
    }

    /// Stops served by a route, grouped by direction and sorted by
    /// stop sequence within each direction.
    ///
    /// Memoized per (route, dataset version).
    pub async fn stops_by_route(&self, route_id: &str) -> Result<StopsByDirection, ScheduleError> {
        let (pool, version) = self.pool().await?;
        let key = (route_id.to_string(), version);

        if let Some(stops) = self.stops.get(&key).await {
            return Ok(stops);
        }

        let rows = queries::stops_by_route(&pool, route_id).await?;
        let grouped: StopsByDirection = Arc::new(group_by_direction(rows));

        self.stops.insert(key, grouped.clone()).await;
        Ok(grouped)
    }

    /// Today's departures of a route from a stop.
    ///
    /// "Today" is evaluated in the route's timezone on every call and never
    /// cached, so the answer switches over exactly at local midnight.
    pub async fn stop_times(
        &self,
        route_id: &str,
        stop_id: &str,
    ) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        let tz = self.route_timezone(route_id).await?;
        let today = Utc::now().with_timezone(&tz).date_naive();
        self.stop_times_on(route_id, stop_id, today).await
    }

    /// Departures of a route from a stop on a given service date.
    pub async fn stop_times_on(
        &self,
        route_id: &str,
        stop_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        let (pool, _) = self.pool().await?;
        let entries = queries::stop_times_on(&pool, route_id, stop_id, date).await?;
        debug!(route_id, stop_id, %date, count = entries.len(), "queried stop times");
        Ok(entries)
    }

    /// Every route with its short name and agency.
    pub async fn routes(&self) -> Result<Vec<RouteSummary>, ScheduleError> {
        let (pool, _) = self.pool().await?;
        Ok(queries::routes(&pool).await?)
    }

    /// Every agency in the dataset.
    pub async fn agencies(&self) -> Result<Vec<Agency>, ScheduleError> {
        let (pool, _) = self.pool().await?;
        Ok(queries::agencies(&pool).await?)
    }

    /// Short name lookup table for the current dataset version.
    pub async fn route_directory(&self) -> Result<Arc<RouteDirectory>, ScheduleError> {
        let (pool, version) = self.pool().await?;

        if let Some(directory) = self.directories.get(&version).await {
            return Ok(directory);
        }

        let directory = Arc::new(RouteDirectory::from_routes(queries::routes(&pool).await?));
        info!(routes = directory.len(), %version, "built route lookup table");

        self.directories.insert(version, directory.clone()).await;
        Ok(directory)
    }
}

async fn connect(config: &RepositoryConfig) -> Result<SqlitePool, ScheduleError> {
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .read_only(true)
        .disable_statement_logging();

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Split rows into the two directions, each ascending by stop sequence.
fn group_by_direction(rows: Vec<StopOnRoute>) -> [Vec<StopOnRoute>; 2] {
    let mut directions: [Vec<StopOnRoute>; 2] = [Vec::new(), Vec::new()];
    for stop in rows {
        directions[stop.direction().index()].push(stop);
    }
    for stops in &mut directions {
        stops.sort_by_key(|s| s.stop_sequence);
    }
    directions
}
