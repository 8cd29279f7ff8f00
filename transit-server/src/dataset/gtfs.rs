//! GTFS static feed importer.
//!
//! Reads the GTFS files the server queries (`agency`, `routes`, `stops`,
//! `trips`, `stop_times`, `calendar`, `calendar_dates`) from each configured
//! source and writes them into a fresh SQLite database. Other GTFS files are
//! ignored.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::ServiceTime;

use super::error::ImportError;
use super::importer::{AgencySource, DatasetImporter, ImportRequest, ImportSummary};

const SCHEMA: &[&str] = &[
    "CREATE TABLE agency (
        agency_id TEXT PRIMARY KEY,
        agency_name TEXT NOT NULL,
        agency_url TEXT,
        agency_timezone TEXT NOT NULL,
        agency_lang TEXT,
        agency_phone TEXT
    )",
    "CREATE TABLE routes (
        route_id TEXT PRIMARY KEY,
        agency_id TEXT,
        route_short_name TEXT,
        route_long_name TEXT,
        route_type INTEGER
    )",
    "CREATE TABLE stops (
        stop_id TEXT PRIMARY KEY,
        stop_code TEXT,
        stop_name TEXT NOT NULL,
        stop_lat REAL,
        stop_lon REAL
    )",
    "CREATE TABLE trips (
        trip_id TEXT PRIMARY KEY,
        route_id TEXT NOT NULL,
        service_id TEXT NOT NULL,
        trip_headsign TEXT,
        direction_id INTEGER
    )",
    "CREATE TABLE stop_times (
        trip_id TEXT NOT NULL,
        arrival_time TEXT,
        departure_time TEXT,
        stop_id TEXT NOT NULL,
        stop_sequence INTEGER NOT NULL
    )",
    "CREATE TABLE calendar (
        service_id TEXT PRIMARY KEY,
        monday INTEGER NOT NULL,
        tuesday INTEGER NOT NULL,
        wednesday INTEGER NOT NULL,
        thursday INTEGER NOT NULL,
        friday INTEGER NOT NULL,
        saturday INTEGER NOT NULL,
        sunday INTEGER NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL
    )",
    "CREATE TABLE calendar_dates (
        service_id TEXT NOT NULL,
        date TEXT NOT NULL,
        exception_type INTEGER NOT NULL
    )",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX stop_times_trip ON stop_times (trip_id)",
    "CREATE INDEX stop_times_stop ON stop_times (stop_id)",
    "CREATE INDEX trips_route ON trips (route_id)",
    "CREATE INDEX calendar_dates_service ON calendar_dates (service_id, date)",
];

#[derive(Debug, Deserialize)]
struct AgencyRecord {
    agency_id: Option<String>,
    agency_name: String,
    agency_url: Option<String>,
    agency_timezone: String,
    agency_lang: Option<String>,
    agency_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    route_id: String,
    agency_id: Option<String>,
    route_short_name: Option<String>,
    route_long_name: Option<String>,
    route_type: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StopRecord {
    stop_id: String,
    stop_code: Option<String>,
    stop_name: Option<String>,
    stop_lat: Option<f64>,
    stop_lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TripRecord {
    route_id: String,
    service_id: String,
    trip_id: String,
    trip_headsign: Option<String>,
    direction_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRecord {
    trip_id: String,
    arrival_time: Option<String>,
    departure_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Debug, Deserialize)]
struct CalendarRecord {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct CalendarDateRecord {
    service_id: String,
    date: String,
    exception_type: u8,
}

#[derive(Debug)]
struct AgencyRow {
    agency_id: String,
    agency_name: String,
    agency_url: Option<String>,
    agency_timezone: String,
    agency_lang: Option<String>,
    agency_phone: Option<String>,
}

/// Normalized rows from every source, ready to insert.
#[derive(Debug, Default)]
struct GtfsTables {
    agencies: Vec<AgencyRow>,
    routes: Vec<RouteRecord>,
    stops: Vec<StopRecord>,
    trips: Vec<TripRecord>,
    stop_times: Vec<StopTimeRecord>,
    calendar: Vec<CalendarRecord>,
    calendar_dates: Vec<CalendarDateRecord>,
}

impl GtfsTables {
    fn summary(&self) -> ImportSummary {
        ImportSummary {
            agencies: self.agencies.len(),
            routes: self.routes.len(),
            stops: self.stops.len(),
            trips: self.trips.len(),
            stop_times: self.stop_times.len(),
        }
    }
}

/// Imports GTFS feeds into SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct GtfsImporter;

impl GtfsImporter {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetImporter for GtfsImporter {
    async fn import(&self, request: &ImportRequest) -> Result<ImportSummary, ImportError> {
        if request.sources.is_empty() {
            return Err(ImportError::NoSources);
        }

        let sources = request.sources.clone();
        let verbose = request.verbose;
        let tables = tokio::task::spawn_blocking(move || read_sources(&sources, verbose)).await??;

        write_dataset(&request.destination, &tables).await?;

        let summary = tables.summary();
        info!(
            destination = %request.destination.display(),
            agencies = summary.agencies,
            routes = summary.routes,
            trips = summary.trips,
            stop_times = summary.stop_times,
            "imported GTFS dataset"
        );
        Ok(summary)
    }
}

fn read_sources(sources: &[AgencySource], verbose: bool) -> Result<GtfsTables, ImportError> {
    let mut tables = GtfsTables::default();
    for source in sources {
        if verbose {
            info!(source = %source.path.display(), "reading GTFS source");
        }
        read_source(&source.path, &mut tables)?;
    }
    Ok(tables)
}

fn read_source(path: &Path, tables: &mut GtfsTables) -> Result<(), ImportError> {
    let mut files = SourceFiles::open(path)?;

    let agencies: Vec<AgencyRecord> = required(&mut files, "agency.txt")?;
    let agencies: Vec<AgencyRow> = agencies
        .into_iter()
        .map(|a| AgencyRow {
            agency_id: a
                .agency_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| a.agency_name.clone()),
            agency_name: a.agency_name,
            agency_url: a.agency_url,
            agency_timezone: a.agency_timezone,
            agency_lang: a.agency_lang,
            agency_phone: a.agency_phone,
        })
        .collect();

    // agency_id is optional in routes.txt when a feed has a single agency
    let default_agency = agencies.first().map(|a| a.agency_id.clone());
    let mut routes: Vec<RouteRecord> = required(&mut files, "routes.txt")?;
    for route in &mut routes {
        if route.agency_id.as_deref().is_none_or(str::is_empty) {
            if agencies.len() > 1 {
                warn!(route_id = %route.route_id, "route without agency_id in multi-agency feed");
            }
            route.agency_id = default_agency.clone();
        }
    }

    let stops: Vec<StopRecord> = required(&mut files, "stops.txt")?;
    let trips: Vec<TripRecord> = required(&mut files, "trips.txt")?;

    let mut stop_times: Vec<StopTimeRecord> = required(&mut files, "stop_times.txt")?;
    let mut unparsable = 0usize;
    for stop_time in &mut stop_times {
        let departure = stop_time
            .departure_time
            .take()
            .or_else(|| stop_time.arrival_time.clone());
        stop_time.departure_time = departure.and_then(|raw| normalize_time(&raw, &mut unparsable));
        stop_time.arrival_time = stop_time
            .arrival_time
            .take()
            .and_then(|raw| normalize_time(&raw, &mut unparsable));
    }
    if unparsable > 0 {
        warn!(source = %path.display(), count = unparsable, "ignored unparsable stop times");
    }

    let calendar: Vec<CalendarRecord> = optional(&mut files, "calendar.txt")?;
    let calendar_dates: Vec<CalendarDateRecord> = optional(&mut files, "calendar_dates.txt")?;

    debug!(
        source = %path.display(),
        routes = routes.len(),
        trips = trips.len(),
        stop_times = stop_times.len(),
        "parsed GTFS source"
    );

    tables.agencies.extend(agencies);
    tables.routes.extend(routes);
    tables.stops.extend(stops);
    tables.trips.extend(trips);
    tables.stop_times.extend(stop_times);
    tables.calendar.extend(calendar);
    tables.calendar_dates.extend(calendar_dates);
    Ok(())
}

/// Zero-pad a GTFS time so string order equals time order.
fn normalize_time(raw: &str, unparsable: &mut usize) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    match ServiceTime::parse(raw) {
        Ok(t) => Some(t.to_string()),
        Err(_) => {
            *unparsable += 1;
            None
        }
    }
}

/// The files of one GTFS source.
enum SourceFiles {
    Directory(PathBuf),
    Zip {
        path: PathBuf,
        archive: zip::ZipArchive<File>,
    },
}

impl SourceFiles {
    fn open(path: &Path) -> Result<Self, ImportError> {
        if path.is_dir() {
            return Ok(SourceFiles::Directory(path.to_path_buf()));
        }

        let file = File::open(path).map_err(|e| ImportError::io(path, e))?;
        Ok(SourceFiles::Zip {
            path: path.to_path_buf(),
            archive: zip::ZipArchive::new(file)?,
        })
    }

    fn path(&self) -> &Path {
        match self {
            SourceFiles::Directory(path) | SourceFiles::Zip { path, .. } => path,
        }
    }

    /// Read a file's bytes, or `None` if the source doesn't have it.
    fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, ImportError> {
        match self {
            SourceFiles::Directory(dir) => {
                let file = dir.join(name);
                match std::fs::read(&file) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(ImportError::io(file, e)),
                }
            }
            SourceFiles::Zip { path, archive } => {
                // Some feeds are zipped with a top-level folder
                let suffix = format!("/{name}");
                let entry_name = archive
                    .file_names()
                    .find(|n| *n == name || n.ends_with(&suffix))
                    .map(str::to_owned);
                let Some(entry_name) = entry_name else {
                    return Ok(None);
                };

                let mut entry = archive.by_name(&entry_name)?;
                let mut bytes = Vec::new();
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|e| ImportError::io(path.as_path(), e))?;
                Ok(Some(bytes))
            }
        }
    }
}

fn parse_records<T: DeserializeOwned>(
    files: &mut SourceFiles,
    file: &'static str,
) -> Result<Option<Vec<T>>, ImportError> {
    let Some(bytes) = files.read(file)? else {
        return Ok(None);
    };
    let body = bytes
        .strip_prefix(b"\xEF\xBB\xBF")
        .unwrap_or(bytes.as_slice());

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map(Some)
        .map_err(|source| ImportError::Csv { file, source })
}

fn required<T: DeserializeOwned>(
    files: &mut SourceFiles,
    file: &'static str,
) -> Result<Vec<T>, ImportError> {
    match parse_records(files, file)? {
        Some(records) => Ok(records),
        None => Err(ImportError::MissingFile {
            file,
            source_path: files.path().to_path_buf(),
        }),
    }
}

fn optional<T: DeserializeOwned>(
    files: &mut SourceFiles,
    file: &'static str,
) -> Result<Vec<T>, ImportError> {
    Ok(parse_records(files, file)?.unwrap_or_default())
}

async fn write_dataset(destination: &Path, tables: &GtfsTables) -> Result<(), ImportError> {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ImportError::io(destination, e)),
    }

    let options = SqliteConnectOptions::new()
        .filename(destination)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .disable_statement_logging();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let result = populate(&pool, tables).await;
    pool.close().await;
    result
}

async fn populate(pool: &SqlitePool, tables: &GtfsTables) -> Result<(), ImportError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let mut tx = pool.begin().await?;

    for a in &tables.agencies {
        sqlx::query(
            "INSERT OR REPLACE INTO agency
                 (agency_id, agency_name, agency_url, agency_timezone, agency_lang, agency_phone)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(a.agency_id.as_str())
        .bind(a.agency_name.as_str())
        .bind(a.agency_url.as_deref())
        .bind(a.agency_timezone.as_str())
        .bind(a.agency_lang.as_deref())
        .bind(a.agency_phone.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    for r in &tables.routes {
        sqlx::query(
            "INSERT OR REPLACE INTO routes
             (route_id, agency_id, route_short_name, route_long_name, route_type)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(r.route_id.as_str())
        .bind(r.agency_id.as_deref())
        .bind(r.route_short_name.as_deref())
        .bind(r.route_long_name.as_deref())
        .bind(r.route_type)
        .execute(&mut *tx)
        .await?;
    }

    for s in &tables.stops {
        sqlx::query(
            "INSERT OR REPLACE INTO stops (stop_id, stop_code, stop_name, stop_lat, stop_lon)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(s.stop_id.as_str())
        .bind(s.stop_code.as_deref())
        .bind(s.stop_name.as_deref().unwrap_or_default())
        .bind(s.stop_lat)
        .bind(s.stop_lon)
        .execute(&mut *tx)
        .await?;
    }

    for t in &tables.trips {
        sqlx::query(
            "INSERT OR REPLACE INTO trips (trip_id, route_id, service_id, trip_headsign, direction_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(t.trip_id.as_str())
        .bind(t.route_id.as_str())
        .bind(t.service_id.as_str())
        .bind(t.trip_headsign.as_deref())
        .bind(t.direction_id)
        .execute(&mut *tx)
        .await?;
    }

    for st in &tables.stop_times {
        sqlx::query(
            "INSERT INTO stop_times (trip_id, arrival_time, departure_time, stop_id, stop_sequence)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(st.trip_id.as_str())
        .bind(st.arrival_time.as_deref())
        .bind(st.departure_time.as_deref())
        .bind(st.stop_id.as_str())
        .bind(st.stop_sequence)
        .execute(&mut *tx)
        .await?;
    }

    for c in &tables.calendar {
        sqlx::query(
            "INSERT OR REPLACE INTO calendar
             (service_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday,
              start_date, end_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(c.service_id.as_str())
        .bind(c.monday)
        .bind(c.tuesday)
        .bind(c.wednesday)
        .bind(c.thursday)
        .bind(c.friday)
        .bind(c.saturday)
        .bind(c.sunday)
        .bind(c.start_date.as_str())
        .bind(c.end_date.as_str())
        .execute(&mut *tx)
        .await?;
    }

    for cd in &tables.calendar_dates {
        sqlx::query(
            "INSERT INTO calendar_dates (service_id, date, exception_type) VALUES (?, ?, ?)",
        )
        .bind(cd.service_id.as_str())
        .bind(cd.date.as_str())
        .bind(cd.exception_type)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    for statement in INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
