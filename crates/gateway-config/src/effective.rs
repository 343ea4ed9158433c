//! Default merge: routes and backends with every default filled in.

use chrono::{DateTime, Utc};
use gateway_core::{ApiSchema, ObjectKey, SchemaRegistry, ValidationErrors};
use gateway_routing::{
    AiGatewayRoute, AiServiceBackend, HeaderMutation, HttpRouteTimeouts, RouteRuleMatch,
    RuleTarget,
};
use gateway_telemetry::CostDeclaration;
use serde::Serialize;

use crate::snapshot::ConfigSnapshot;

/// A route as the data plane sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveRoute {
    /// Route identity.
    pub key: ObjectKey,
    /// Input schema with its version resolved.
    pub input_schema: ApiSchema,
    /// Creation time used for defaults.
    pub created_at: DateTime<Utc>,
    /// Rules in evaluation order.
    pub rules: Vec<EffectiveRule>,
    /// Declared request costs.
    pub costs: Vec<CostDeclaration>,
}

/// A rule with its defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveRule {
    /// Position within the route.
    pub index: usize,
    /// Header matches; empty matches every request.
    pub matches: Vec<RouteRuleMatch>,
    /// Timeouts with the request timeout filled in.
    pub timeouts: HttpRouteTimeouts,
    /// Owner reported for the rule's models.
    pub models_owned_by: String,
    /// Creation time reported for the rule's models.
    pub models_created_at: DateTime<Utc>,
    /// Dispatch strategy.
    pub target: RuleTarget,
}

impl EffectiveRoute {
    /// Resolve a route. `now` stands in for a missing creation timestamp.
    pub fn resolve(route: &AiGatewayRoute, now: DateTime<Utc>) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let input_schema = errors.collect(
            SchemaRegistry::new().resolve_input("spec.schema.name", &route.spec.schema),
        );
        let created_at = route.created_at_or(now);

        let mut rules = Vec::with_capacity(route.spec.rules.len());
        for (index, rule) in route.spec.rules.iter().enumerate() {
            match RuleTarget::from_rule(rule, route.namespace()) {
                Ok(target) => rules.push(EffectiveRule {
                    index,
                    matches: rule.matches.clone(),
                    timeouts: rule.effective_timeouts().into_owned(),
                    models_owned_by: rule.models_owned_by().to_string(),
                    models_created_at: rule.models_created_at(created_at),
                    target,
                }),
                Err(e) => errors.extend(e.at(&format!("spec.rules[{index}]"))),
            }
        }

        match input_schema {
            Some(input_schema) if errors.is_empty() => Ok(Self {
                key: route.metadata.key(),
                input_schema,
                created_at,
                rules,
                costs: route.spec.llm_request_costs.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// A backend with its schema and security policy resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveBackend {
    /// Backend identity.
    pub key: ObjectKey,
    /// Output schema with its version resolved.
    pub schema: ApiSchema,
    /// Attached security policy, if any.
    pub security_policy: Option<ObjectKey>,
    /// Header mutation with duplicate `set` entries dropped.
    pub header_mutation: Option<HeaderMutation>,
}

impl EffectiveBackend {
    /// Resolve a backend against a snapshot.
    pub fn resolve(
        backend: &AiServiceBackend,
        snapshot: &ConfigSnapshot,
    ) -> Result<Self, ValidationErrors> {
        let schema = SchemaRegistry::new()
            .resolve("spec.schema.name", &backend.spec.schema)
            .map_err(ValidationErrors::from)?;
        let security_policy = snapshot
            .attached_policies(backend)
            .first()
            .map(|p| p.metadata.key());
        let header_mutation = backend.spec.header_mutation.as_ref().map(|m| HeaderMutation {
            set: m.deduplicated_set().into_iter().cloned().collect(),
            remove: m.remove.clone(),
        });
        Ok(Self {
            key: backend.metadata.key(),
            schema,
            security_policy,
            header_mutation,
        })
    }
}
