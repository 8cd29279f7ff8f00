//! Schedule repository error types.

/// Errors from schedule queries.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The route has no resolvable agency timezone (unknown route, missing
    /// agency, or an unrecognised IANA zone name)
    #[error("no timezone found for route {route_id}")]
    NotFound { route_id: String },

    /// The dataset could not be opened or queried
    #[error("schedule store error: {0}")]
    Database(#[from] sqlx::Error),
}
