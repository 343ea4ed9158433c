//! Prometheus metrics for configuration validation and cost accounting.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Control plane metrics.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    validations: IntCounterVec,
    cost_evaluations: IntCounterVec,
    snapshot_version: IntGauge,
}

impl Metrics {
    /// Create and register all metrics in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("aigw".to_string()), None)?;

        let validations = IntCounterVec::new(
            Opts::new(
                "config_validations_total",
                "Validation outcomes of declarative objects",
            ),
            &["kind", "outcome"],
        )?;
        let cost_evaluations = IntCounterVec::new(
            Opts::new(
                "cost_evaluations_total",
                "Request cost computations by metadata key",
            ),
            &["metadata_key", "outcome"],
        )?;
        let snapshot_version = IntGauge::new(
            "config_snapshot_version",
            "Version of the active configuration snapshot",
        )?;

        registry.register(Box::new(validations.clone()))?;
        registry.register(Box::new(cost_evaluations.clone()))?;
        registry.register(Box::new(snapshot_version.clone()))?;

        Ok(Self {
            registry,
            validations,
            cost_evaluations,
            snapshot_version,
        })
    }

    /// Record the outcome of validating one object.
    pub fn record_validation(&self, kind: &str, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "not_accepted" };
        self.validations.with_label_values(&[kind, outcome]).inc();
    }

    /// Record the outcome of computing one request cost.
    pub fn record_cost_evaluation(&self, metadata_key: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.cost_evaluations
            .with_label_values(&[metadata_key, outcome])
            .inc();
    }

    /// Publish the active snapshot version.
    pub fn set_snapshot_version(&self, version: u64) {
        self.snapshot_version
            .set(i64::try_from(version).unwrap_or(i64::MAX));
    }

    /// Number of recorded validations for a kind and outcome.
    #[must_use]
    pub fn validation_count(&self, kind: &str, accepted: bool) -> u64 {
        let outcome = if accepted { "accepted" } else { "not_accepted" };
        self.validations.with_label_values(&[kind, outcome]).get()
    }

    /// Underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
