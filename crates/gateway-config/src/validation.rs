//! Validation of declarative objects against a snapshot.
//!
//! Validation is pure: it reads the object and the snapshot and returns a
//! report. Callers turn the report into a status condition.

use chrono::{DateTime, Utc};
use gateway_core::{
    ApiSchemaName, Condition, ObjectKey, SchemaRegistry, ValidationError, ValidationErrors,
};
use gateway_routing::{
    AiGatewayRoute, AiServiceBackend, BackendKind, BACKEND_KIND, INFERENCE_POOL_KIND, ROUTE_KIND,
};
use gateway_security::{BackendSecurityPolicy, SECURITY_POLICY_KIND};
use gateway_telemetry::{validate_cost_declarations, CostExpressionEvaluator, Metrics};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::snapshot::ConfigSnapshot;

/// A permitted reference from a route to a backend in another namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossNamespaceRef {
    /// Location of the reference within the route.
    pub field: String,
    /// Referencing route.
    pub route: ObjectKey,
    /// Referenced backend.
    pub target: ObjectKey,
}

/// Outcome of validating one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Failures; the object is accepted when empty.
    pub errors: ValidationErrors,
    /// Audit findings that do not prevent acceptance.
    pub cross_namespace_refs: Vec<CrossNamespaceRef>,
}

impl ValidationReport {
    /// Whether the object is accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }

    /// Status condition for the object.
    #[must_use]
    pub fn condition(&self, generation: i64, now: DateTime<Utc>) -> Condition {
        if !self.is_accepted() {
            return Condition::not_accepted(generation, &self.errors, now);
        }
        let message = match self.cross_namespace_refs.len() {
            0 => "Configuration accepted".to_string(),
            n => format!("Configuration accepted with {n} cross-namespace reference(s)"),
        };
        Condition::accepted(generation, message, now)
    }
}

/// Reports for every object of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    /// Route reports.
    pub routes: BTreeMap<ObjectKey, ValidationReport>,
    /// Backend reports.
    pub backends: BTreeMap<ObjectKey, ValidationReport>,
    /// Security policy reports.
    pub security_policies: BTreeMap<ObjectKey, ValidationReport>,
}

impl SnapshotReport {
    /// Whether every object was accepted.
    #[must_use]
    pub fn all_accepted(&self) -> bool {
        self.reports().all(|(_, _, r)| r.is_accepted())
    }

    /// All reports with their kind, in kind then key order.
    pub fn reports(&self) -> impl Iterator<Item = (&'static str, &ObjectKey, &ValidationReport)> {
        let routes = self.routes.iter().map(|(k, r)| (ROUTE_KIND, k, r));
        let backends = self.backends.iter().map(|(k, r)| (BACKEND_KIND, k, r));
        let policies = self
            .security_policies
            .iter()
            .map(|(k, r)| (SECURITY_POLICY_KIND, k, r));
        routes.chain(backends).chain(policies)
    }

    /// Number of rejected objects.
    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.reports().filter(|(_, _, r)| !r.is_accepted()).count()
    }
}

/// Validates routes, backends and security policies.
#[derive(Clone, Default)]
pub struct RouteValidator {
    registry: SchemaRegistry,
    evaluator: Option<Arc<dyn CostExpressionEvaluator>>,
    metrics: Option<Arc<Metrics>>,
}

impl fmt::Debug for RouteValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteValidator")
            .field("checks_expressions", &self.evaluator.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl RouteValidator {
    /// Validator without expression checks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile cost expressions with this evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn CostExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Record outcomes in these metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate a route: structure, input schema, costs and references.
    pub fn validate_route(&self, route: &AiGatewayRoute, snapshot: &ConfigSnapshot) -> ValidationReport {
        let mut report = ValidationReport::default();
        let namespace = route.namespace();
        let route_key = route.metadata.key();

        report.errors.extend(route.spec.validate_structure());
        let input = report
            .errors
            .collect(self.registry.resolve_input("spec.schema.name", &route.spec.schema));
        report.errors.extend(
            validate_cost_declarations(&route.spec.llm_request_costs, self.evaluator.as_deref())
                .into_iter()
                .map(|e| e.at("spec.llmRequestCosts")),
        );

        for (i, rule) in route.spec.rules.iter().enumerate() {
            for (j, backend_ref) in rule.backend_refs.iter().enumerate() {
                // Malformed references are already reported structurally.
                let Ok(kind) = backend_ref.classify() else {
                    continue;
                };
                if backend_ref.name.is_empty() {
                    continue;
                }
                let field = format!("spec.rules[{i}].backendRefs[{j}]");
                let target_namespace = backend_ref.resolve_namespace(namespace);
                let target = ObjectKey::new(target_namespace, &backend_ref.name);

                match kind {
                    BackendKind::Service => {
                        if backend_ref.is_cross_namespace(namespace) {
                            warn!(
                                audit = true,
                                route = %route_key,
                                backend = %target,
                                "Cross-namespace backend reference"
                            );
                            report.cross_namespace_refs.push(CrossNamespaceRef {
                                field: field.clone(),
                                route: route_key.clone(),
                                target: target.clone(),
                            });
                        }
                        match snapshot.backend(&target.namespace, &target.name) {
                            None => report.errors.push(ValidationError::not_found(
                                field,
                                BACKEND_KIND,
                                &target.namespace,
                                &target.name,
                            )),
                            Some(backend) => {
                                if let (Some(input), Ok(output)) = (
                                    &input,
                                    self.registry.parse("", &backend.spec.schema.name),
                                ) {
                                    report.errors.collect(
                                        self.registry.check_pair(&field, input.name, output),
                                    );
                                }
                            }
                        }
                    }
                    BackendKind::InferencePool => {
                        if backend_ref.is_cross_namespace(namespace) {
                            report.errors.push(ValidationError::invalid_reference(
                                format!("{field}.namespace"),
                                "InferencePool references must be in the route's namespace",
                            ));
                        } else if snapshot
                            .inference_pool(&target.namespace, &target.name)
                            .is_none()
                        {
                            report.errors.push(ValidationError::not_found(
                                field,
                                INFERENCE_POOL_KIND,
                                &target.namespace,
                                &target.name,
                            ));
                        }
                    }
                }
            }
        }

        self.record(ROUTE_KIND, &route_key, &report);
        report
    }

    /// Validate a backend: schema, header mutation and security policy
    /// attachment.
    pub fn validate_backend(
        &self,
        backend: &AiServiceBackend,
        snapshot: &ConfigSnapshot,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        let namespace = &backend.metadata.namespace;
        let spec = &backend.spec;

        let output = report
            .errors
            .collect(self.registry.resolve("spec.schema.name", &spec.schema));
        if let Some(output) = &output {
            report.errors.collect(self.registry.check_pair(
                "spec.schema.name",
                ApiSchemaName::OpenAi,
                output.name,
            ));
        }

        if spec.backend_ref.name.is_empty() {
            report
                .errors
                .push(ValidationError::invalid("spec.backendRef.name", "must not be empty"));
        }
        if let Some(mutation) = &spec.header_mutation {
            report.errors.extend(
                mutation
                    .validate()
                    .into_iter()
                    .map(|e| e.at("spec.headerMutation")),
            );
        }

        if let Some(reference) = &spec.backend_security_policy_ref {
            if snapshot.security_policy(namespace, &reference.name).is_none() {
                report.errors.push(ValidationError::not_found(
                    "spec.backendSecurityPolicyRef",
                    SECURITY_POLICY_KIND,
                    namespace,
                    &reference.name,
                ));
            }
        }

        let attached = snapshot.attached_policies(backend);
        if attached.len() > 1 {
            let names: Vec<_> = attached.iter().map(|p| p.metadata.name.as_str()).collect();
            report.errors.push(ValidationError::invalid_reference(
                "spec.backendSecurityPolicyRef",
                format!(
                    "at most one security policy may apply to a backend, found {}",
                    names.join(", ")
                ),
            ));
        }
        if let Some(output) = &output {
            let has_gcp = attached.iter().any(|p| p.spec.credentials.is_gcp());
            if self.registry.requires_gcp_credentials(output.name) && !has_gcp {
                report.errors.push(ValidationError::invalid_reference(
                    "spec.backendSecurityPolicyRef",
                    format!("schema {} requires a GCPCredentials security policy", output.name),
                ));
            }
        }

        self.record(BACKEND_KIND, &backend.metadata.key(), &report);
        report
    }

    /// Validate a security policy's targets. Its credential shape was
    /// checked when the document was converted.
    pub fn validate_security_policy(
        &self,
        policy: &BackendSecurityPolicy,
        snapshot: &ConfigSnapshot,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        let namespace = &policy.metadata.namespace;

        for (i, target) in policy.spec.target_refs.iter().enumerate() {
            let field = format!("spec.targetRefs[{i}]");
            if let Some(kind) = target.kind.as_deref().filter(|k| !k.is_empty()) {
                if kind != BACKEND_KIND {
                    report.errors.push(ValidationError::invalid_reference(
                        format!("{field}.kind"),
                        format!("security policies can only target {BACKEND_KIND}, got {kind}"),
                    ));
                    continue;
                }
            }
            if snapshot.backend(namespace, &target.name).is_none() {
                report.errors.push(ValidationError::not_found(
                    field,
                    BACKEND_KIND,
                    namespace,
                    &target.name,
                ));
            }
        }

        self.record(SECURITY_POLICY_KIND, &policy.metadata.key(), &report);
        report
    }

    /// Validate every object of a snapshot.
    pub fn validate_snapshot(&self, snapshot: &ConfigSnapshot) -> SnapshotReport {
        SnapshotReport {
            routes: snapshot
                .routes()
                .map(|r| (r.metadata.key(), self.validate_route(r, snapshot)))
                .collect(),
            backends: snapshot
                .backends()
                .map(|b| (b.metadata.key(), self.validate_backend(b, snapshot)))
                .collect(),
            security_policies: snapshot
                .security_policies()
                .map(|p| (p.metadata.key(), self.validate_security_policy(p, snapshot)))
                .collect(),
        }
    }

    fn record(&self, kind: &str, key: &ObjectKey, report: &ValidationReport) {
        if let Some(metrics) = &self.metrics {
            metrics.record_validation(kind, report.is_accepted());
        }
        if report.is_accepted() {
            debug!(kind, name = %key, "Accepted");
        } else {
            warn!(kind, name = %key, errors = %report.errors, "Not accepted");
        }
    }
}
