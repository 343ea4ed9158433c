//! Runtime configuration consumed by the data plane filter.

use chrono::{DateTime, Utc};
use gateway_core::{
    ApiSchema, ApiSchemaName, ObjectKey, AI_MODEL_HEADER_KEY, SELECTED_ROUTE_HEADER_KEY,
};
use gateway_routing::{AiGatewayRoute, RouteRuleMatch, RuleTarget, WeightedEntry};
use gateway_telemetry::{CostDeclaration, METADATA_NAMESPACE};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::artifacts::GatewayAttachment;
use crate::effective::{EffectiveBackend, EffectiveRoute};
use crate::snapshot::ConfigSnapshot;

/// Filter configuration for one gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDocument {
    /// Changes with every compilation so the filter notices reloads.
    pub uuid: String,
    /// Dynamic metadata namespace for request costs.
    pub metadata_namespace: String,
    /// Costs to compute for every request.
    pub llm_request_costs: Vec<CostDeclaration>,
    /// Schema clients speak.
    pub schema: ApiSchema,
    /// Header carrying the requested model.
    pub model_name_header_key: String,
    /// Header carrying the selected route.
    pub selected_route_header_key: String,
    /// Rules of all attached routes in precedence order.
    pub rules: Vec<FilterRule>,
}

/// One rule of one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    /// Owning route as `namespace/name`.
    pub route: String,
    /// Rule position within the route.
    pub index: usize,
    /// Header matches; empty matches every request.
    pub matches: Vec<RouteRuleMatch>,
    /// Weighted backends, in declaration order.
    pub backends: Vec<FilterBackend>,
    /// Inference pool as `name.namespace` when endpoint picking is delegated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_pool: Option<String>,
    /// Request timeout.
    pub request_timeout: String,
    /// Owner reported for the rule's models.
    pub models_owned_by: String,
    /// Creation time reported for the rule's models.
    pub models_created_at: DateTime<Utc>,
}

/// A weighted backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterBackend {
    /// Backend as `name.namespace`.
    pub name: String,
    /// Output schema.
    pub schema: ApiSchema,
    /// Relative weight.
    pub weight: u32,
    /// Priority tier.
    pub priority: u32,
    /// Model sent upstream instead of the requested one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
    /// Security policy as `namespace/name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,
}

impl FilterDocument {
    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Compile the filter configuration of a gateway.
///
/// `routes` are the accepted routes; those not attached to `gateway` are
/// ignored. References that do not resolve in `snapshot` are skipped.
pub fn compile_filter_config<'a>(
    gateway: &str,
    routes: impl IntoIterator<Item = &'a AiGatewayRoute>,
    snapshot: &ConfigSnapshot,
    now: DateTime<Utc>,
) -> FilterDocument {
    let mut routes: Vec<_> = routes.into_iter().filter(|r| r.attaches_to(gateway)).collect();
    routes.sort_by(|a, b| a.metadata.precedence_cmp(&b.metadata));
    let attachment = GatewayAttachment::resolve(gateway, routes.iter().copied());

    let mut schema = None;
    let mut rules = Vec::new();
    for route in &routes {
        let effective = match EffectiveRoute::resolve(route, now) {
            Ok(effective) => effective,
            Err(errors) => {
                warn!(route = %route.metadata.key(), %errors, "Skipping unresolvable route");
                continue;
            }
        };
        schema.get_or_insert_with(|| effective.input_schema.clone());
        for rule in &effective.rules {
            let (backends, inference_pool) = match &rule.target {
                RuleTarget::Weighted(selector) => {
                    let mut entries: Vec<&WeightedEntry> =
                        selector.tiers().iter().flat_map(|t| t.entries.iter()).collect();
                    entries.sort_by_key(|e| e.index);
                    let backends = entries
                        .into_iter()
                        .filter_map(|e| filter_backend(e, snapshot))
                        .collect();
                    (backends, None)
                }
                RuleTarget::Delegated { name, namespace } => {
                    (Vec::new(), Some(format!("{name}.{namespace}")))
                }
                RuleTarget::Unrouted => (Vec::new(), None),
            };
            rules.push(FilterRule {
                route: effective.key.to_string(),
                index: rule.index,
                matches: rule.matches.clone(),
                backends,
                inference_pool,
                request_timeout: rule
                    .timeouts
                    .request
                    .as_ref()
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_default(),
                models_owned_by: rule.models_owned_by.clone(),
                models_created_at: rule.models_created_at,
            });
        }
    }

    let document = FilterDocument {
        uuid: Uuid::new_v4().to_string(),
        metadata_namespace: METADATA_NAMESPACE.to_string(),
        llm_request_costs: attachment.costs,
        schema: schema.unwrap_or_else(|| ApiSchema {
            name: ApiSchemaName::OpenAi,
            version: "v1".to_string(),
        }),
        model_name_header_key: AI_MODEL_HEADER_KEY.to_string(),
        selected_route_header_key: SELECTED_ROUTE_HEADER_KEY.to_string(),
        rules,
    };
    debug!(
        gateway,
        uuid = %document.uuid,
        rules = document.rules.len(),
        "Compiled filter configuration"
    );
    document
}

fn filter_backend(entry: &WeightedEntry, snapshot: &ConfigSnapshot) -> Option<FilterBackend> {
    let Some(backend) = snapshot.backend(&entry.namespace, &entry.name) else {
        warn!(backend = %entry.qualified_name(), "Skipping unknown backend");
        return None;
    };
    let effective = match EffectiveBackend::resolve(backend, snapshot) {
        Ok(effective) => effective,
        Err(errors) => {
            warn!(backend = %entry.qualified_name(), %errors, "Skipping unresolvable backend");
            return None;
        }
    };
    Some(FilterBackend {
        name: entry.qualified_name(),
        schema: effective.schema,
        weight: entry.weight,
        priority: entry.priority,
        model_name_override: entry.model_name_override.clone(),
        security_policy: effective.security_policy.as_ref().map(ObjectKey::to_string),
    })
}
