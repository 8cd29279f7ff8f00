//! HTTP route handlers.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::domain::{Agency, AugmentedResult};
use crate::fusion;
use crate::realtime::{FeedProvider, RealtimeFeed, trips_by_route};
use crate::schedule::ScheduleError;

use super::dto::*;
use super::state::AppState;

/// Create the application router. Every origin may call it.
pub fn create_router<P: FeedProvider + 'static>(state: AppState<P>) -> Router {
    Router::new()
        .route("/health", get(health::<P>))
        .route("/getAgencies", get(get_agencies::<P>))
        .route("/getRoutes", get(get_routes::<P>))
        .route("/getStopsByRoute", get(get_stops_by_route::<P>))
        .route("/getStopTimes", get(get_stop_times::<P>))
        .route("/getRealTimeSummary", get(get_realtime_summary::<P>))
        .route("/rt", get(get_realtime::<P>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check with refresh bookkeeping.
async fn health<P: FeedProvider>(State(state): State<AppState<P>>) -> Json<HealthResponse> {
    let loaded = state.realtime.get().await.is_some();
    let status = state.realtime.status().await;

    Json(HealthResponse {
        status: "ok",
        dataset_version: state.schedule.version().get(),
        realtime: RealtimeHealth::from_status(loaded, status),
    })
}

async fn get_agencies<P: FeedProvider>(
    State(state): State<AppState<P>>,
) -> Result<Json<Vec<Agency>>, AppError> {
    Ok(Json(state.schedule.agencies().await?))
}

/// All routes, keyed by short name.
async fn get_routes<P: FeedProvider>(
    State(state): State<AppState<P>>,
) -> Result<Json<BTreeMap<String, RouteEntry>>, AppError> {
    let directory = state.schedule.route_directory().await?;
    let routes = directory
        .iter()
        .map(|r| {
            (
                r.route_short_name.clone(),
                RouteEntry {
                    id: r.route_id.clone(),
                    agency: r.agency_name.clone(),
                },
            )
        })
        .collect();
    Ok(Json(routes))
}

async fn get_stops_by_route<P: FeedProvider>(
    State(state): State<AppState<P>>,
    Query(query): Query<StopsByRouteQuery>,
) -> Result<Json<StopsByRouteResponse>, AppError> {
    let Some(short_name) = query.route else {
        return Err(AppError::Unprocessable {
            message: "Missing parameter [route]".to_string(),
        });
    };

    let route_id = resolve_route(&state, &short_name).await?;
    let stops = state.schedule.stops_by_route(&route_id).await?;

    Ok(Json(StopsByRouteResponse {
        route_id,
        route_short_name: short_name,
        directions: (*stops).clone(),
    }))
}

/// Upcoming departures from a stop, adjusted with realtime delays.
async fn get_stop_times<P: FeedProvider>(
    State(state): State<AppState<P>>,
    Query(query): Query<StopTimesQuery>,
) -> Result<Json<AugmentedResult>, AppError> {
    let (Some(short_name), Some(stop_id)) = (query.route, query.stop_id) else {
        return Err(AppError::Unprocessable {
            message: "Missing parameters [stop_id] and/or [route]".to_string(),
        });
    };

    let route_id = resolve_route(&state, &short_name).await?;
    let tz = state.schedule.route_timezone(&route_id).await?;
    let entries = state.schedule.stop_times(&route_id, &stop_id).await?;

    let current = state.realtime.get().await;
    let empty = RealtimeFeed::default();
    let feed = current.as_deref().unwrap_or(&empty);

    fusion::augment(&entries, feed, tz)
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            message: "NO_TIMES_FOUND".to_string(),
        })
}

/// Trips with live updates, keyed by route short name.
async fn get_realtime_summary<P: FeedProvider>(
    State(state): State<AppState<P>>,
) -> Result<Json<BTreeMap<String, Vec<String>>>, AppError> {
    let Some(feed) = state.realtime.get().await else {
        return Ok(Json(BTreeMap::new()));
    };
    let directory = state.schedule.route_directory().await?;
    Ok(Json(trips_by_route(&feed, &directory)))
}

/// The raw cached feed.
async fn get_realtime<P: FeedProvider>(
    State(state): State<AppState<P>>,
) -> Result<Response, AppError> {
    let feed = state.realtime.get().await.ok_or_else(|| AppError::NotFound {
        message: "NO_REALTIME_DATA".to_string(),
    })?;
    Ok(Json(feed.as_ref()).into_response())
}

async fn resolve_route<P>(state: &AppState<P>, short_name: &str) -> Result<String, AppError> {
    let directory = state.schedule.route_directory().await?;
    directory
        .resolve(short_name)
        .map(|r| r.route_id.clone())
        .ok_or_else(|| AppError::NotFound {
            message: format!("Unknown route: {short_name}"),
        })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound { message: String },
    Unprocessable { message: String },
    Internal { message: String },
}

impl From<ScheduleError> for AppError {
    fn from(e: ScheduleError) -> Self {
        // An unresolvable timezone means the dataset is inconsistent, not
        // that the caller asked for something absent
        AppError::Internal {
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Unprocessable { message } => (StatusCode::UNPROCESSABLE_ENTITY, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, %message, "request failed");
        } else {
            debug!(%status, %message, "request rejected");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};

    use crate::realtime::{FeedSnapshot, RealtimeCache, RealtimeError};
    use crate::schedule::{DatasetGeneration, RepositoryConfig, ScheduleRepository};
    use crate::testing::build_dataset;

    /// Provider that always serves the same payload, or fails without one.
    struct FixedProvider(Option<Value>);

    impl FeedProvider for FixedProvider {
        async fn fetch(&self) -> Result<Value, RealtimeError> {
            self.0.clone().ok_or(RealtimeError::Unauthorized)
        }
    }

    async fn state_with(payload: Option<Value>) -> (TempDir, AppState<FixedProvider>) {
        let dir = tempdir().unwrap();
        let db = dir.path().join("gtfs.sqlite");
        build_dataset(dir.path(), &db).await;

        let schedule = ScheduleRepository::open(RepositoryConfig::new(&db), DatasetGeneration::new())
            .await
            .unwrap();
        let realtime = RealtimeCache::new(
            FixedProvider(payload),
            FeedSnapshot::new(dir.path().join("rt.json")),
        );
        let _ = realtime.refresh().await;

        (dir, AppState::new(Arc::new(schedule), Arc::new(realtime)))
    }

    fn stop_times_query(route: Option<&str>, stop_id: Option<&str>) -> Query<StopTimesQuery> {
        Query(StopTimesQuery {
            route: route.map(str::to_string),
            stop_id: stop_id.map(str::to_string),
        })
    }

    fn late_trip_delayed(delay: i64) -> Value {
        json!({
            "header": {"gtfs_realtime_version": "2.0", "timestamp": 1718000000},
            "entity": [{
                "id": "1",
                "trip_update": {
                    "trip": {"trip_id": "T5", "route_id": "R99"},
                    "stop_time_update": [{"stop_sequence": 1, "stop_id": "S2", "departure": {"delay": delay}}]
                }
            }]
        })
    }

    #[tokio::test]
    async fn stop_times_requires_both_parameters() {
        let (_dir, state) = state_with(None).await;

        let err = get_stop_times(State(state), stop_times_query(Some("99"), None))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (_dir, state) = state_with(None).await;

        let err = get_stop_times(State(state), stop_times_query(Some("777"), Some("S2")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_times_without_realtime() {
        let (_dir, state) = state_with(None).await;

        let Json(result) = get_stop_times(State(state), stop_times_query(Some("99"), Some("S2")))
            .await
            .unwrap();

        assert_eq!(result.route_id, "R99");
        assert_eq!(result.stop_name, "Stop Two");
        assert_eq!(result.times.len(), 1);

        let departure = &result.times[0];
        assert_eq!(departure.trip_id, "T5");
        assert_eq!(departure.destination.as_deref(), Some("Night Depot"));
        assert_eq!(departure.realtime_offset_seconds, None);
        assert!(departure.departure_mins >= 23 * 60);
    }

    #[tokio::test]
    async fn stop_times_apply_realtime_delay() {
        let (_dir, state) = state_with(Some(late_trip_delayed(600))).await;

        let Json(result) = get_stop_times(State(state), stop_times_query(Some("99"), Some("S2")))
            .await
            .unwrap();
        assert_eq!(result.times[0].realtime_offset_seconds, Some(600));
    }

    #[tokio::test]
    async fn no_departures_is_not_found() {
        let (_dir, state) = state_with(None).await;

        let err = get_stop_times(State(state), stop_times_query(Some("46A"), Some("S9")))
            .await
            .unwrap_err();
        match err {
            AppError::NotFound { ref message } => assert_eq!(message, "NO_TIMES_FOUND"),
            ref other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn routes_keyed_by_short_name() {
        let (_dir, state) = state_with(None).await;

        let Json(routes) = get_routes(State(state)).await.unwrap();
        assert_eq!(
            routes["46A"],
            RouteEntry {
                id: "R46".to_string(),
                agency: "Dublin Bus".to_string(),
            }
        );
        assert_eq!(routes["99"].id, "R99");
    }

    #[tokio::test]
    async fn agencies_are_listed() {
        let (_dir, state) = state_with(None).await;

        let Json(agencies) = get_agencies(State(state)).await.unwrap();
        let names: Vec<_> = agencies.iter().map(|a| a.agency_name.as_str()).collect();
        assert_eq!(names, vec!["Dublin Bus"]);
        assert_eq!(agencies[0].agency_timezone, "Europe/Dublin");
    }

    #[tokio::test]
    async fn router_allows_cross_origin_requests() {
        let (_dir, state) = state_with(None).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = client
            .get(format!("http://{addr}/getAgencies"))
            .header("Origin", "https://departures.example")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body[0]["agency_id"], "A1");

        let preflight = client
            .request(reqwest::Method::OPTIONS, format!("http://{addr}/getStopTimes"))
            .header("Origin", "https://departures.example")
            .header("Access-Control-Request-Method", "GET")
            .send()
            .await
            .unwrap();
        assert!(preflight.status().is_success());
        assert!(preflight.headers().contains_key("access-control-allow-methods"));

        server.abort();
    }

    #[tokio::test]
    async fn stops_by_route_is_case_insensitive() {
        let (_dir, state) = state_with(None).await;

        let query = Query(StopsByRouteQuery {
            route: Some("46a".to_string()),
        });
        let Json(response) = get_stops_by_route(State(state.clone()), query).await.unwrap();

        assert_eq!(response.route_id, "R46");
        assert_eq!(response.route_short_name, "46a");
        let outbound: Vec<_> = response.directions[0].iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(outbound, vec!["S1", "S2", "S3"]);

        let err = get_stops_by_route(State(state), Query(StopsByRouteQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn realtime_summary_and_raw_feed() {
        let (_dir, state) = state_with(Some(late_trip_delayed(60))).await;

        let Json(summary) = get_realtime_summary(State(state.clone())).await.unwrap();
        assert_eq!(summary["99"], vec!["T5".to_string()]);

        let response = get_realtime(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cold_cache_reports_no_realtime() {
        let (_dir, state) = state_with(None).await;

        let Json(summary) = get_realtime_summary(State(state.clone())).await.unwrap();
        assert!(summary.is_empty());

        let err = get_realtime(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let Json(health) = health(State(state)).await;
        assert!(!health.realtime.loaded);
        assert_eq!(health.realtime.failures, 1);
        assert_eq!(health.realtime.last_failure.unwrap().kind, "fetch");
    }

    #[test]
    fn schedule_errors_are_server_errors() {
        let err = AppError::from(ScheduleError::NotFound {
            route_id: "R1".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
