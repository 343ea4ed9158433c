//! Last-known-good tracking of routes.
//!
//! A route that fails validation is marked NotAccepted, but the last version
//! that was accepted stays in effect until a newer version is accepted or
//! the route is deleted.

use chrono::{DateTime, Utc};
use gateway_core::{ObjectKey, ResourceStatus};
use gateway_routing::AiGatewayRoute;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::snapshot::ConfigSnapshot;
use crate::validation::{SnapshotReport, ValidationReport};

#[derive(Debug, Clone, Default)]
struct Entry {
    active: Option<AiGatewayRoute>,
    status: ResourceStatus,
}

/// Active route versions and the status of the latest validation.
#[derive(Debug, Clone, Default)]
pub struct AcceptedRoutes {
    entries: BTreeMap<ObjectKey, Entry>,
}

impl AcceptedRoutes {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the validation outcome of a route version and return its status.
    pub fn record(
        &mut self,
        route: &AiGatewayRoute,
        report: &ValidationReport,
        now: DateTime<Utc>,
    ) -> &ResourceStatus {
        let key = route.metadata.key();
        let entry = self.entries.entry(key.clone()).or_default();
        entry
            .status
            .set_condition(report.condition(route.metadata.generation, now));

        if report.is_accepted() {
            let mut active = route.clone();
            active.status = entry.status.clone();
            entry.active = Some(active);
            info!(route = %key, generation = route.metadata.generation, "Route accepted");
        } else if let Some(active) = &entry.active {
            warn!(
                route = %key,
                generation = route.metadata.generation,
                active_generation = active.metadata.generation,
                "Route not accepted; keeping last accepted version"
            );
        } else {
            warn!(route = %key, "Route not accepted; no accepted version to keep");
        }
        &entry.status
    }

    /// Record every route of a snapshot and forget routes no longer in it.
    /// Routes without a report are left untouched.
    pub fn apply(&mut self, snapshot: &ConfigSnapshot, report: &SnapshotReport, now: DateTime<Utc>) {
        for route in snapshot.routes() {
            if let Some(route_report) = report.routes.get(&route.metadata.key()) {
                self.record(route, route_report, now);
            }
        }
        self.entries
            .retain(|key, _| snapshot.route(key).is_some());
    }

    /// Version of a route currently in effect.
    #[must_use]
    pub fn active(&self, key: &ObjectKey) -> Option<&AiGatewayRoute> {
        self.entries.get(key).and_then(|e| e.active.as_ref())
    }

    /// All route versions currently in effect.
    pub fn active_routes(&self) -> impl Iterator<Item = &AiGatewayRoute> {
        self.entries.values().filter_map(|e| e.active.as_ref())
    }

    /// Status from the latest validation of a route.
    #[must_use]
    pub fn status(&self, key: &ObjectKey) -> Option<&ResourceStatus> {
        self.entries.get(key).map(|e| &e.status)
    }

    /// Number of tracked routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no routes are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
