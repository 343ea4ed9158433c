//! Request cost integration tests
//!
//! Tests for cost declarations as loaded from configuration, their
//! validation, and computing them for a request.

use crate::fixtures::*;
use crate::helpers::*;
use chrono::{Duration, Utc};
use gateway_config::{compile_filter_config, GatewayAttachment};
use gateway_core::ObjectKey;
use gateway_telemetry::{CostCalculator, CostContext, CostEvaluationError, CostType};

fn priced_route(name: &str, costs: Vec<serde_json::Value>) -> serde_json::Value {
    with_costs(route("ai", name, vec![rule(vec![backend_ref("openai")])]), costs)
}

/// Test costs are computed from usage and expressions
#[test]
fn test_compute_declared_costs() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[priced_route(
            "chat",
            vec![
                token_cost("llm_input_token", "InputToken"),
                token_cost("llm_output_token", "OutputToken"),
                token_cost("llm_total_token", "TotalToken"),
                expression_cost("weighted", "input_tokens + output_tokens * 4"),
                expression_cost("by_backend", "total_tokens + backend.len()"),
            ],
        )],
    );
    dir.write("backend.yaml", &[backend("ai", "openai", "OpenAI")]);

    let (snapshot, report) = dir.load_and_validate();
    assert!(report.all_accepted());
    let route = snapshot.route(&ObjectKey::new("ai", "chat")).unwrap();
    assert_eq!(route.spec.llm_request_costs[0].cost, CostType::InputToken);

    let calculator = CostCalculator::default();
    let ctx = CostContext::new("gpt-4o", "openai.ai").with_usage(100, 20, 130);
    let costs = calculator.compute_all(&route.spec.llm_request_costs, &ctx);

    assert!(costs.failures.is_empty());
    assert_eq!(costs.namespace(), "io.envoy.ai_gateway");
    assert_eq!(costs.values["llm_input_token"], 100);
    assert_eq!(costs.values["llm_output_token"], 20);
    assert_eq!(costs.values["llm_total_token"], 130);
    assert_eq!(costs.values["weighted"], 180);
    assert_eq!(costs.values["by_backend"], 139);
}

/// Test a failing expression is skipped without affecting the others
#[test]
fn test_failed_costs_are_skipped() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[priced_route(
            "chat",
            vec![
                expression_cost("refund", "input_tokens - 1000"),
                expression_cost("ratio", "output_tokens / 2.0"),
                token_cost("llm_total_token", "TotalToken"),
            ],
        )],
    );

    let snapshot = dir.load();
    let route = snapshot.route(&ObjectKey::new("ai", "chat")).unwrap();
    let ctx = CostContext::new("gpt-4o", "openai.ai").with_usage(10, 20, 30);
    let costs = CostCalculator::default().compute_all(&route.spec.llm_request_costs, &ctx);

    assert_eq!(costs.values.len(), 1);
    assert_eq!(costs.values["llm_total_token"], 30);
    assert_eq!(costs.failures.len(), 2);
    assert_eq!(
        costs.failures[0],
        CostEvaluationError::Negative {
            key: "refund".to_string(),
            value: -990,
        }
    );
    assert!(matches!(
        &costs.failures[1],
        CostEvaluationError::NonInteger { key, .. } if key == "ratio"
    ));
}

/// Test invalid cost declarations reject the route
#[test]
fn test_invalid_cost_declarations() {
    let dir = ConfigDir::new();
    dir.write(
        "routes.yaml",
        &[
            priced_route("syntax", vec![expression_cost("broken", "input_tokens +")]),
            priced_route(
                "duplicate",
                vec![
                    token_cost("llm_total_token", "TotalToken"),
                    token_cost("llm_total_token", "InputToken"),
                ],
            ),
            priced_route(
                "missing-expression",
                vec![serde_json::json!({ "metadataKey": "custom", "type": "CEL" })],
            ),
        ],
    );
    dir.write("backend.yaml", &[backend("ai", "openai", "OpenAI")]);

    let (snapshot, report) = dir.load_and_validate();

    let syntax = error_messages(&report.routes[&ObjectKey::new("ai", "syntax")]);
    assert_eq!(syntax.len(), 1);
    assert!(
        syntax[0].starts_with("spec.llmRequestCosts[0].cel: invalid cost expression"),
        "{syntax:?}"
    );

    let duplicate = error_messages(&report.routes[&ObjectKey::new("ai", "duplicate")]);
    assert_eq!(
        duplicate,
        ["spec.llmRequestCosts[1].metadataKey: duplicate metadata key \"llm_total_token\""]
    );

    assert!(snapshot.route(&ObjectKey::new("ai", "missing-expression")).is_none());
    let rejected = &snapshot.rejected()[0];
    assert_eq!(rejected.key, ObjectKey::new("ai", "missing-expression"));
    assert!(rejected.reason.contains("an expression is required"), "{}", rejected.reason);
}

/// Test the oldest route owns a metadata key shared across a gateway
#[test]
fn test_cost_keys_first_route_wins() {
    let now = Utc::now();
    let older = (now - Duration::hours(1)).to_rfc3339();
    let newer = now.to_rfc3339();

    let dir = ConfigDir::new();
    dir.write(
        "routes.yaml",
        &[
            created_at(
                priced_route("chat-v2", vec![expression_cost("llm_cost", "total_tokens * 3")]),
                &newer,
            ),
            created_at(
                priced_route(
                    "chat",
                    vec![
                        token_cost("llm_cost", "TotalToken"),
                        token_cost("llm_input_token", "InputToken"),
                    ],
                ),
                &older,
            ),
        ],
    );
    dir.write("backend.yaml", &[backend("ai", "openai", "OpenAI")]);

    let snapshot = dir.load();
    let attachment = GatewayAttachment::resolve(GATEWAY, snapshot.routes());
    assert_eq!(
        attachment.routes,
        [ObjectKey::new("ai", "chat"), ObjectKey::new("ai", "chat-v2")]
    );
    let keys: Vec<_> = attachment.costs.iter().map(|c| c.metadata_key.as_str()).collect();
    assert_eq!(keys, ["llm_cost", "llm_input_token"]);
    assert_eq!(attachment.costs[0].cost, CostType::TotalToken);
    assert_eq!(attachment.ignored_costs.len(), 1);
    assert_eq!(attachment.ignored_costs[0].route, ObjectKey::new("ai", "chat-v2"));
    assert_eq!(attachment.ignored_costs[0].winner, ObjectKey::new("ai", "chat"));

    let filter = compile_filter_config(GATEWAY, snapshot.routes(), &snapshot, now);
    assert_eq!(filter.llm_request_costs, attachment.costs);
}
