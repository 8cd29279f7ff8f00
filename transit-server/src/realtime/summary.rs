use std::collections::BTreeMap;

use crate::schedule::RouteDirectory;

use super::types::RealtimeFeed;

/// Trip ids with stop time updates, keyed by route short name.
///
/// Trips on routes the directory doesn't know are left out.
pub fn trips_by_route(feed: &RealtimeFeed, routes: &RouteDirectory) -> BTreeMap<String, Vec<String>> {
    let mut summary: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for update in feed.trip_updates() {
        if update.stop_time_update.is_none() {
            continue;
        }
        if let Some(short_name) = routes.short_name(&update.trip.route_id) {
            summary
                .entry(short_name.to_string())
                .or_default()
                .push(update.trip.trip_id.clone());
        }
    }
    summary
}
