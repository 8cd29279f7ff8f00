//! Web layer for the departures server.
//!
//! Thin JSON endpoints over the schedule repository, the realtime cache and
//! fusion. Routes are addressed by their public short name.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
