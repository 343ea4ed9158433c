//! Reconciliation of the configuration directory.
//!
//! Every pass loads the directory into a fresh snapshot, validates it,
//! updates the accepted routes and compiles the filter configuration of
//! each gateway from the routes currently in effect.

use anyhow::{Context, Result};
use chrono::Utc;
use gateway_config::{
    compile_filter_config, load_snapshot, AcceptedRoutes, ControllerSettings, FilterDocument,
    RouteValidator, SnapshotStore,
};
use gateway_telemetry::{Metrics, RhaiCostEvaluator};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Version of the published snapshot.
    pub version: u64,
    /// Objects accepted in this pass.
    pub accepted: usize,
    /// Objects and documents not accepted in this pass.
    pub rejected: usize,
    /// Filter configuration per gateway.
    pub filters: BTreeMap<String, FilterDocument>,
}

/// Owns the state carried between reconciliation passes.
pub struct Controller {
    config_dir: PathBuf,
    gateway: Option<String>,
    output_dir: Option<PathBuf>,
    validator: RouteValidator,
    metrics: Arc<Metrics>,
    store: SnapshotStore,
    accepted: AcceptedRoutes,
}

impl Controller {
    /// Create a controller from settings.
    pub fn new(settings: &ControllerSettings, metrics: Arc<Metrics>) -> Self {
        let mut validator = RouteValidator::new().with_metrics(Arc::clone(&metrics));
        if settings.expression.check_on_validate {
            validator = validator.with_evaluator(Arc::new(RhaiCostEvaluator::with_config(
                settings.evaluator_config(),
            )));
        }
        Self {
            config_dir: settings.config_dir.clone(),
            gateway: settings.gateway.clone(),
            output_dir: None,
            validator,
            metrics,
            store: SnapshotStore::default(),
            accepted: AcceptedRoutes::new(),
        }
    }

    /// Write each gateway's filter configuration to `<dir>/<gateway>.yaml`.
    #[must_use]
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    /// Directory being reconciled.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Published snapshots.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Accepted routes and their latest status.
    pub fn accepted(&self) -> &AcceptedRoutes {
        &self.accepted
    }

    /// Run one reconciliation pass.
    ///
    /// A directory that cannot be read leaves the previous snapshot and
    /// accepted routes in place.
    pub fn reconcile(&mut self) -> Result<ReconcileOutcome> {
        let snapshot = load_snapshot(&self.config_dir).with_context(|| {
            format!("Failed to load configuration from {}", self.config_dir.display())
        })?;

        let report = self.validator.validate_snapshot(&snapshot);
        for rejected in snapshot.rejected() {
            self.metrics.record_validation(&rejected.kind, false);
        }
        let rejected = report.rejected_count() + snapshot.rejected().len();
        let accepted = report.reports().count() - report.rejected_count();

        let now = Utc::now();
        self.accepted.apply(&snapshot, &report, now);

        let gateways: BTreeSet<String> = match &self.gateway {
            Some(gateway) => BTreeSet::from([gateway.clone()]),
            None => self
                .accepted
                .active_routes()
                .flat_map(|r| r.spec.target_refs.iter().map(|t| t.name.clone()))
                .collect(),
        };
        let filters: BTreeMap<String, FilterDocument> = gateways
            .into_iter()
            .map(|gateway| {
                let filter =
                    compile_filter_config(&gateway, self.accepted.active_routes(), &snapshot, now);
                (gateway, filter)
            })
            .collect();

        if let Some(dir) = &self.output_dir {
            write_filters(dir, &filters)?;
        }

        let version = self.store.publish(snapshot);
        self.metrics.set_snapshot_version(version);

        if rejected > 0 {
            warn!(version, accepted, rejected, "Configuration reconciled with rejections");
        } else {
            info!(version, accepted, gateways = filters.len(), "Configuration reconciled");
        }

        Ok(ReconcileOutcome {
            version,
            accepted,
            rejected,
            filters,
        })
    }
}

fn write_filters(dir: &Path, filters: &BTreeMap<String, FilterDocument>) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for (gateway, filter) in filters {
        let path = dir.join(format!("{gateway}.yaml"));
        let yaml = filter
            .to_yaml()
            .with_context(|| format!("Failed to render filter configuration for {gateway}"))?;
        std::fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(gateway = %gateway, path = %path.display(), "Wrote filter configuration");
    }
    Ok(())
}
