//! Static schedule rows read from the GTFS dataset.

use serde::Serialize;

/// One scheduled departure of a trip from a stop, scoped to today.
///
/// `stop_id` and `stop_sequence` identify the call when matching realtime
/// stop time updates against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ScheduleEntry {
    pub route_id: String,
    pub stop_id: String,
    pub stop_name: String,
    pub stop_sequence: u32,
    pub trip_id: String,
    /// Local wall-clock "HH:MM:SS"; hours may exceed 23.
    pub scheduled_departure_time: String,
    pub service_id: String,
    pub trip_headsign: Option<String>,
}

/// Travel direction of a trip, from GTFS `trips.direction_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    /// Map a GTFS direction flag. Missing or unknown values count as outbound.
    pub fn from_gtfs(flag: Option<i64>) -> Self {
        match flag {
            Some(1) => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }

    /// Index into a two-element direction array.
    pub fn index(self) -> usize {
        match self {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
        }
    }
}

/// A stop served by a route, with its position along the route.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StopOnRoute {
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: String,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub stop_sequence: u32,
    pub direction_id: Option<i64>,
}

impl StopOnRoute {
    pub fn direction(&self) -> Direction {
        Direction::from_gtfs(self.direction_id)
    }
}

/// Entry in the route directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RouteSummary {
    pub route_id: String,
    pub route_short_name: String,
    pub agency_name: String,
}

/// An operator from the dataset's `agency` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Agency {
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: Option<String>,
    pub agency_timezone: String,
    pub agency_lang: Option<String>,
    pub agency_phone: Option<String>,
}
