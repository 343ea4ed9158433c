//! Gateway attachment and names of generated data plane resources.
//!
//! Several routes may attach to the same gateway and declare the same cost
//! metadata key or different external processor resources. Routes are
//! ordered oldest first (routes without a creation time last, then by
//! namespace and name) and the first declaration wins.

use gateway_core::ObjectKey;
use gateway_routing::{AiGatewayRoute, ResourceRequirements};
use gateway_telemetry::CostDeclaration;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Prefix of the per-gateway extension policy.
pub const EXTENSION_POLICY_PREFIX: &str = "ai-eg-eep-";

/// Name of the per-namespace host rewrite filter.
pub const HOST_REWRITE_FILTER_NAME: &str = "ai-eg-host-rewrite";

/// Name of the HTTP route generated for a route.
#[must_use]
pub fn http_route_name(route: &AiGatewayRoute) -> &str {
    &route.metadata.name
}

/// Name of the extension policy generated for a gateway.
#[must_use]
pub fn extension_policy_name(gateway: &str) -> String {
    format!("{EXTENSION_POLICY_PREFIX}{gateway}")
}

/// A declaration shadowed by an earlier route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredEntry {
    /// Route whose declaration was ignored.
    pub route: ObjectKey,
    /// What was ignored, e.g. the cost metadata key.
    pub item: String,
    /// Route whose declaration is in effect.
    pub winner: ObjectKey,
}

/// Everything attached to one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayAttachment {
    /// Gateway name.
    pub gateway: String,
    /// Extension policy name.
    pub extension_policy: String,
    /// Attached routes in precedence order.
    pub routes: Vec<ObjectKey>,
    /// Effective cost declarations, first declaration per key.
    pub costs: Vec<CostDeclaration>,
    /// Cost declarations shadowed by earlier routes.
    pub ignored_costs: Vec<IgnoredEntry>,
    /// External processor resources from the first route declaring any.
    pub resources: Option<ResourceRequirements>,
    /// Resource declarations shadowed by an earlier route.
    pub ignored_resources: Vec<IgnoredEntry>,
}

impl GatewayAttachment {
    /// Resolve the routes attached to a gateway. Routes not attached to it
    /// are ignored; the input order does not matter.
    pub fn resolve<'a>(
        gateway: &str,
        routes: impl IntoIterator<Item = &'a AiGatewayRoute>,
    ) -> Self {
        let mut routes: Vec<_> = routes.into_iter().filter(|r| r.attaches_to(gateway)).collect();
        routes.sort_by(|a, b| a.metadata.precedence_cmp(&b.metadata));

        let mut attachment = Self {
            gateway: gateway.to_string(),
            extension_policy: extension_policy_name(gateway),
            routes: routes.iter().map(|r| r.metadata.key()).collect(),
            costs: Vec::new(),
            ignored_costs: Vec::new(),
            resources: None,
            ignored_resources: Vec::new(),
        };

        let mut cost_owners: Vec<(String, ObjectKey)> = Vec::new();
        let mut seen = HashSet::new();
        let mut resource_owner: Option<ObjectKey> = None;

        for route in routes {
            let key = route.metadata.key();
            for cost in &route.spec.llm_request_costs {
                if seen.insert(cost.metadata_key.clone()) {
                    cost_owners.push((cost.metadata_key.clone(), key.clone()));
                    attachment.costs.push(cost.clone());
                    continue;
                }
                let winner = cost_owners
                    .iter()
                    .find(|(k, _)| *k == cost.metadata_key)
                    .map_or_else(|| key.clone(), |(_, owner)| owner.clone());
                warn!(
                    gateway,
                    route = %key,
                    metadata_key = %cost.metadata_key,
                    winner = %winner,
                    "Ignoring duplicate cost metadata key"
                );
                attachment.ignored_costs.push(IgnoredEntry {
                    route: key.clone(),
                    item: cost.metadata_key.clone(),
                    winner,
                });
            }

            let resources = route
                .spec
                .filter_config
                .as_ref()
                .and_then(|f| f.external_processor.as_ref())
                .and_then(|p| p.resources.as_ref());
            if let Some(resources) = resources {
                match &resource_owner {
                    None => {
                        resource_owner = Some(key.clone());
                        attachment.resources = Some(resources.clone());
                    }
                    Some(winner) => {
                        warn!(
                            gateway,
                            route = %key,
                            winner = %winner,
                            "Ignoring external processor resources"
                        );
                        attachment.ignored_resources.push(IgnoredEntry {
                            route: key.clone(),
                            item: "filterConfig.externalProcessor.resources".to_string(),
                            winner: winner.clone(),
                        });
                    }
                }
            }
        }
        attachment
    }

    /// Namespaces needing a host rewrite filter.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<_> = self.routes.iter().map(|k| k.namespace.as_str()).collect();
        namespaces.sort_unstable();
        namespaces.dedup();
        namespaces
    }
}
