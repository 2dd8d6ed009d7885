//! Route markers computed once when the tree is assembled.
//!
//! A unit that is also a [`MarkerSource`] annotates every route whose chain
//! contains it. The annotations are collected per route into an
//! [`AccessMarkerList`], keyed by marker name, which guards read at request
//! time and the route listing exposes verbatim.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use strata_core::MarkerEntry;
use strata_router::RouteTree;

use crate::context::{Cursor, RouteInfo};
use crate::unit::UnitRef;

/// A unit that annotates the routes it guards.
pub trait MarkerSource: Send + Sync {
    /// Name the entries are filed under, e.g. `"access"`.
    fn marker_name(&self) -> &str;

    /// Entries for `route`, given where in its chain the unit sits.
    ///
    /// Defaults to [`scope_marks`].
    fn mark(&self, route: &RouteInfo, cursor: &Cursor) -> Vec<MarkerEntry> {
        let _ = cursor;
        scope_marks(route)
    }
}

/// One `Prefix` entry per mount scope of the route, root first, then the
/// full route path when it differs from the innermost scope, then the exact
/// method and path.
///
/// ```
/// use http::Method;
/// use strata_core::MarkerEntry;
/// use strata_middleware::{scope_marks, RouteInfo};
///
/// let route = RouteInfo {
///     index: 0,
///     method: Method::PUT,
///     path: "/api/users/user_:id".to_string(),
///     scopes: vec!["/api".to_string(), "/api/users".to_string()],
/// };
///
/// assert_eq!(
///     scope_marks(&route),
///     [
///         MarkerEntry::prefix("/api"),
///         MarkerEntry::prefix("/api/users"),
///         MarkerEntry::prefix("/api/users/user_:id"),
///         MarkerEntry::route(&Method::PUT, "/api/users/user_:id"),
///     ]
/// );
/// ```
#[must_use]
pub fn scope_marks(route: &RouteInfo) -> Vec<MarkerEntry> {
    let mut entries: Vec<MarkerEntry> = route
        .scopes
        .iter()
        .map(|scope| MarkerEntry::prefix(scope.clone()))
        .collect();
    if route.scopes.last() != Some(&route.path) {
        entries.push(MarkerEntry::prefix(route.path.clone()));
    }
    entries.push(MarkerEntry::route(&route.method, route.path.clone()));
    entries
}

/// Marker entries of one route, grouped by marker name.
///
/// Names keep the order in which their sources appear in the chain; entries
/// keep insertion order and are deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccessMarkerList {
    markers: IndexMap<String, Vec<MarkerEntry>>,
}

impl AccessMarkerList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends entries under `name`, skipping ones already present.
    pub fn extend(&mut self, name: &str, entries: impl IntoIterator<Item = MarkerEntry>) {
        let slot = self.markers.entry(name.to_string()).or_default();
        for entry in entries {
            if !slot.contains(&entry) {
                slot.push(entry);
            }
        }
    }

    /// Entries under `name`; empty if none.
    #[must_use]
    pub fn get(&self, name: &str) -> &[MarkerEntry] {
        self.markers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Marker names, in chain order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.markers.keys().map(String::as_str)
    }

    /// Returns `true` if no marker source touched the route.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.values().all(Vec::is_empty)
    }
}

/// Builds every route's [`AccessMarkerList`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerAggregator;

impl MarkerAggregator {
    /// Walks each route's chain and asks every marker source on it for
    /// entries. The result is indexed by route index.
    #[must_use]
    pub fn aggregate(tree: &RouteTree<UnitRef>) -> Vec<Arc<AccessMarkerList>> {
        tree.routes()
            .iter()
            .map(|route| {
                let info = RouteInfo::from_route(route);
                let mut list = AccessMarkerList::new();
                for (position, link) in route.chain().iter().enumerate() {
                    if let Some(source) = link.unit.marker_source() {
                        let cursor = Cursor {
                            origin: link.unit.id(),
                            position,
                            prefix: link.scope.clone(),
                        };
                        list.extend(source.marker_name(), source.mark(&info, &cursor));
                    }
                }
                if !list.is_empty() {
                    tracing::debug!(
                        http.method = %info.method,
                        http.route = %info.path,
                        markers = ?list.names().collect::<Vec<_>>(),
                        "route markers aggregated"
                    );
                }
                Arc::new(list)
            })
            .collect()
    }
}
