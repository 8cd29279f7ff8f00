//! Route short name lookup.

use std::collections::HashMap;

use crate::domain::RouteSummary;

/// Maps public route short names ("46A") to dataset route ids and back.
///
/// Short names are matched case-insensitively. If two routes share a short
/// name, the last one in the input wins.
#[derive(Debug, Clone, Default)]
pub struct RouteDirectory {
    by_short_name: HashMap<String, RouteSummary>,
    short_names: HashMap<String, String>,
}

impl RouteDirectory {
    pub fn from_routes(routes: impl IntoIterator<Item = RouteSummary>) -> Self {
        let mut directory = Self::default();
        for route in routes {
            directory
                .short_names
                .insert(route.route_id.clone(), route.route_short_name.clone());
            directory
                .by_short_name
                .insert(route.route_short_name.to_uppercase(), route);
        }
        directory
    }

    /// Look up a route by short name.
    pub fn resolve(&self, short_name: &str) -> Option<&RouteSummary> {
        self.by_short_name.get(&short_name.trim().to_uppercase())
    }

    /// Short name for a dataset route id.
    pub fn short_name(&self, route_id: &str) -> Option<&str> {
        self.short_names.get(route_id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteSummary> {
        self.by_short_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_short_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_short_name.is_empty()
    }
}
