//! SQL against the imported GTFS tables.
//!
//! Table and column names follow the GTFS reference. Dates are stored as
//! GTFS "YYYYMMDD" text and times as zero-padded "HH:MM:SS" text, so string
//! ordering matches chronological ordering.

use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::SqlitePool;

use crate::domain::{Agency, RouteSummary, ScheduleEntry, StopOnRoute};

pub async fn agency_timezone(
    pool: &SqlitePool,
    route_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT a.agency_timezone
         FROM agency AS a
         JOIN routes AS r ON r.agency_id = a.agency_id
         WHERE r.route_id = ?
         LIMIT 1",
    )
    .bind(route_id)
    .fetch_optional(pool)
    .await
}

/// Every stop served by the route, once per direction, at its lowest
/// sequence number. Ordered by sequence.
pub async fn stops_by_route(
    pool: &SqlitePool,
    route_id: &str,
) -> Result<Vec<StopOnRoute>, sqlx::Error> {
    sqlx::query_as(
        "SELECT s.stop_id, s.stop_code, s.stop_name, s.stop_lat, s.stop_lon,
                MIN(st.stop_sequence) AS stop_sequence, t.direction_id
         FROM trips AS t
         JOIN stop_times AS st ON st.trip_id = t.trip_id
         JOIN stops AS s ON s.stop_id = st.stop_id
         WHERE t.route_id = ?
         GROUP BY s.stop_id, t.direction_id
         ORDER BY stop_sequence ASC",
    )
    .bind(route_id)
    .fetch_all(pool)
    .await
}

/// Departures of the route from the stop on `date`.
///
/// A trip runs when its service has the weekday flag set in `calendar` and
/// is not removed for the date in `calendar_dates` (exception type 2).
pub async fn stop_times_on(
    pool: &SqlitePool,
    route_id: &str,
    stop_id: &str,
    date: NaiveDate,
) -> Result<Vec<ScheduleEntry>, sqlx::Error> {
    // The weekday column name comes from a closed set, never from input
    let sql = format!(
        "SELECT DISTINCT st.departure_time AS scheduled_departure_time, s.stop_name, t.route_id,
                st.stop_sequence, st.stop_id, t.trip_id, t.service_id, t.trip_headsign
         FROM trips AS t
         JOIN calendar AS c ON c.service_id = t.service_id AND c.{} = 1
         JOIN stop_times AS st ON st.trip_id = t.trip_id
         JOIN stops AS s ON s.stop_id = st.stop_id
         WHERE t.route_id = ?
           AND st.stop_id = ?
           AND st.departure_time IS NOT NULL
           AND NOT EXISTS (
               SELECT 1 FROM calendar_dates AS cd
               WHERE cd.service_id = t.service_id
                 AND cd.date = ?
                 AND cd.exception_type = 2
           )
         ORDER BY st.departure_time ASC",
        weekday_column(date.weekday())
    );

    sqlx::query_as(&sql)
        .bind(route_id)
        .bind(stop_id)
        .bind(gtfs_date(date))
        .fetch_all(pool)
        .await
}

pub async fn routes(pool: &SqlitePool) -> Result<Vec<RouteSummary>, sqlx::Error> {
    sqlx::query_as(
        "SELECT r.route_id, COALESCE(r.route_short_name, '') AS route_short_name, a.agency_name
         FROM routes AS r
         JOIN agency AS a ON a.agency_id = r.agency_id
         ORDER BY r.route_id",
    )
    .fetch_all(pool)
    .await
}

pub async fn agencies(pool: &SqlitePool) -> Result<Vec<Agency>, sqlx::Error> {
    sqlx::query_as(
        "SELECT agency_id, agency_name, agency_url, agency_timezone, agency_lang, agency_phone
         FROM agency
         ORDER BY agency_id",
    )
    .fetch_all(pool)
    .await
}

/// `calendar` column holding the flag for a weekday.
pub fn weekday_column(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Format a date the way GTFS files spell it.
pub fn gtfs_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
