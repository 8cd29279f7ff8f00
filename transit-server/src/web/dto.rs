//! Data transfer objects for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StopOnRoute;
use crate::realtime::RefreshStatus;

/// Query for `/getStopsByRoute`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopsByRouteQuery {
    /// Route short name, e.g. "46A"
    pub route: Option<String>,
}

/// Query for `/getStopTimes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopTimesQuery {
    /// Route short name
    pub route: Option<String>,
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopsByRouteResponse {
    pub route_id: String,
    pub route_short_name: String,
    /// Outbound then inbound stops, each in stop sequence order.
    pub directions: [Vec<StopOnRoute>; 2],
}

/// One entry of the `/getRoutes` map, keyed by short name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub id: String,
    pub agency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dataset_version: u64,
    pub realtime: RealtimeHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeHealth {
    pub loaded: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureView>,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureView {
    pub at: DateTime<Utc>,
    pub kind: &'static str,
    pub message: String,
}

impl RealtimeHealth {
    pub fn from_status(loaded: bool, status: RefreshStatus) -> Self {
        Self {
            loaded,
            last_success: status.last_success,
            last_failure: status.last_failure.map(|f| FailureView {
                at: f.at,
                kind: f.kind,
                message: f.message,
            }),
            successes: status.successes,
            failures: status.failures,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
