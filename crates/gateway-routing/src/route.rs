//! Unified AI routes.
//!
//! A route attaches to one or more gateways, declares the schema clients
//! speak, and lists rules that map matching requests to backends.

use chrono::{DateTime, Utc};
use gateway_core::{ObjectMeta, ResourceStatus, ValidationError, ValidationErrors, VersionedApiSchema};
use gateway_telemetry::CostDeclaration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::rules::RouteRule;

/// Document kind of a route.
pub const ROUTE_KIND: &str = "AIGatewayRoute";

/// Route document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiGatewayRoute {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Route spec.
    pub spec: RouteSpec,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ResourceStatus,
}

impl AiGatewayRoute {
    /// Create a route.
    pub fn new(metadata: ObjectMeta, spec: RouteSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ResourceStatus::default(),
        }
    }

    /// Namespace of the route.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Creation time, or `fallback` when the document carries none.
    #[must_use]
    pub fn created_at_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.metadata.creation_timestamp.unwrap_or(fallback)
    }

    /// Whether the route attaches to the named gateway.
    #[must_use]
    pub fn attaches_to(&self, gateway: &str) -> bool {
        self.spec.target_refs.iter().any(|t| t.name == gateway)
    }

    /// Index of the first rule applying to a request, in declaration order.
    pub fn select_rule<K: AsRef<str>, V: AsRef<str>>(
        &self,
        request_headers: &[(K, V)],
    ) -> Option<(usize, &RouteRule)> {
        self.spec
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches_request(request_headers))
    }
}

/// Route spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Gateways the route attaches to.
    #[validate(length(min = 1, max = 128, message = "must contain between 1 and 128 target references"))]
    pub target_refs: Vec<GatewayTargetRef>,
    /// Schema clients speak; must be OpenAI.
    pub schema: VersionedApiSchema,
    /// Rules, evaluated in order.
    #[validate(length(max = 128, message = "must contain at most 128 rules"))]
    pub rules: Vec<RouteRule>,
    /// Data plane filter settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_config: Option<FilterConfig>,
    /// Costs recorded for each request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_request_costs: Vec<CostDeclaration>,
}

impl RouteSpec {
    /// Create a spec attached to one gateway with an OpenAI input schema.
    pub fn new(gateway: impl Into<String>, rules: impl IntoIterator<Item = RouteRule>) -> Self {
        Self {
            target_refs: vec![GatewayTargetRef::gateway(gateway)],
            schema: VersionedApiSchema::new("OpenAI"),
            rules: rules.into_iter().collect(),
            filter_config: None,
            llm_request_costs: Vec::new(),
        }
    }

    /// Add a cost declaration.
    #[must_use]
    pub fn with_cost(mut self, cost: CostDeclaration) -> Self {
        self.llm_request_costs.push(cost);
        self
    }

    /// Set filter configuration.
    #[must_use]
    pub fn with_filter_config(mut self, config: FilterConfig) -> Self {
        self.filter_config = Some(config);
        self
    }

    /// Structural checks of the route spec in isolation: list limits, target names,
    /// rules and filter configuration.
    pub fn validate_structure(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if let Err(e) = Validate::validate(self) {
            errors.extend(ValidationErrors::from_validator(&e).at("spec"));
        }
        for (i, target) in self.target_refs.iter().enumerate() {
            if target.name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!("spec.targetRefs[{i}].name"),
                    "must not be empty",
                ));
            }
        }
        for (i, rule) in self.rules.iter().enumerate() {
            errors.extend(rule.validate_structure().at(&format!("spec.rules[{i}]")));
        }
        if let Some(filter) = &self.filter_config {
            if let Err(e) = filter.validate() {
                errors.push(e.at("spec.filterConfig"));
            }
        }
        errors
    }
}

/// Reference to a gateway the route attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTargetRef {
    /// API group; `gateway.networking.k8s.io` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Kind; `Gateway` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Gateway name.
    pub name: String,
    /// Listener within the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl GatewayTargetRef {
    /// Attach to a gateway by name.
    pub fn gateway(name: impl Into<String>) -> Self {
        Self {
            group: Some("gateway.networking.k8s.io".to_string()),
            kind: Some("Gateway".to_string()),
            name: name.into(),
            section_name: None,
        }
    }
}

/// Data plane filter implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterConfigType {
    /// External processor sidecar.
    #[default]
    ExternalProcessor,
    /// In-proxy dynamic module. Reserved.
    DynamicModule,
}

/// Data plane filter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Implementation.
    #[serde(rename = "type", default)]
    pub filter_type: FilterConfigType,
    /// External processor settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_processor: Option<ExternalProcessorConfig>,
}

impl FilterConfig {
    /// Only the external processor implementation is available.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.filter_type {
            FilterConfigType::ExternalProcessor => Ok(()),
            FilterConfigType::DynamicModule => Err(ValidationError::invalid(
                "type",
                "DynamicModule is reserved and not supported",
            )),
        }
    }
}

/// External processor settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProcessorConfig {
    /// Compute resources of the processor container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Container resource requests and limits, as quantity strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Limits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    /// Requests.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}
