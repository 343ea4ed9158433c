//! Routing integration tests
//!
//! Tests for rule matching, weighted and priority backend selection, and
//! reference checks on route rules.

use crate::fixtures::*;
use crate::helpers::*;
use chrono::Utc;
use gateway_config::EffectiveRoute;
use gateway_core::{ErrorCategory, ObjectKey};
use gateway_routing::{RuleTarget, WeightedSelector};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::HashMap;

fn selector_for(dir: &ConfigDir, rule: usize) -> WeightedSelector {
    let snapshot = dir.load();
    let route = snapshot.route(&ObjectKey::new("ai", "chat")).unwrap();
    WeightedSelector::from_rule(&route.spec.rules[rule], route.namespace()).unwrap()
}

fn draw_counts(selector: &WeightedSelector, unavailable: &[&str]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for i in 0..1000 {
        let draw = f64::from(i) / 1000.0;
        if let Some(entry) =
            selector.select_available(draw, |e| !unavailable.contains(&e.name.as_str()))
        {
            *counts.entry(entry.name.clone()).or_default() += 1;
        }
    }
    counts
}

/// Test traffic splits by weight within the preferred tier
#[test]
fn test_weighted_split() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[route(
            "ai",
            "chat",
            vec![rule(vec![
                weighted_ref("openai", 3, 0),
                weighted_ref("azure", 1, 0),
                weighted_ref("bedrock", 5, 1),
            ])],
        )],
    );
    let selector = selector_for(&dir, 0);

    let counts = draw_counts(&selector, &[]);
    assert_eq!(counts["openai"], 750);
    assert_eq!(counts["azure"], 250);
    assert!(!counts.contains_key("bedrock"));

    let tier = &selector.tiers()[0];
    assert_eq!(tier.total_weight(), 4);
    assert!((tier.share(&tier.entries[0]) - 0.75).abs() < f64::EPSILON);
}

/// Test lower tiers take over when the preferred tier is unavailable
#[test]
fn test_priority_fallback() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[route(
            "ai",
            "chat",
            vec![rule(vec![
                weighted_ref("openai", 1, 0),
                weighted_ref("azure", 1, 1),
                weighted_ref("bedrock", 1, 2),
            ])],
        )],
    );
    let selector = selector_for(&dir, 0);

    let counts = draw_counts(&selector, &["openai"]);
    assert_eq!(counts.get("azure"), Some(&1000));

    let counts = draw_counts(&selector, &["openai", "azure"]);
    assert_eq!(counts.get("bedrock"), Some(&1000));

    assert!(draw_counts(&selector, &["openai", "azure", "bedrock"]).is_empty());
}

/// Test a tier whose weights are all zero receives no traffic
#[test]
fn test_zero_weight_tier_falls_through() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[route(
            "ai",
            "chat",
            vec![rule(vec![
                weighted_ref("openai", 0, 0),
                weighted_ref("azure", 0, 0),
                weighted_ref("bedrock", 2, 1),
            ])],
        )],
    );
    let selector = selector_for(&dir, 0);
    assert_eq!(selector.tiers().len(), 2);
    assert_eq!(draw_counts(&selector, &[]).get("bedrock"), Some(&1000));
}

/// Test random selection converges to the configured weights
#[test]
fn test_random_selection_converges() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[route(
            "ai",
            "chat",
            vec![rule(vec![weighted_ref("openai", 1, 0), weighted_ref("azure", 3, 0)])],
        )],
    );
    let selector = selector_for(&dir, 0);
    let mut rng = StdRng::seed_from_u64(7);

    let samples = 20_000;
    let azure = (0..samples)
        .filter_map(|_| selector.select_random(&mut rng, |_| true))
        .filter(|e| e.name == "azure")
        .count();
    let ratio = azure as f64 / f64::from(samples);
    assert!((ratio - 0.75).abs() < 0.02, "azure ratio {ratio}");
}

/// Test the first rule matching the request headers wins
#[test]
fn test_rule_selection_by_model() {
    let dir = ConfigDir::new();
    dir.write(
        "route.yaml",
        &[route(
            "ai",
            "chat",
            vec![
                model_rule("gpt-4o", vec![backend_ref("openai")]),
                model_rule("claude", vec![backend_ref("anthropic")]),
                rule(vec![backend_ref("fallback")]),
            ],
        )],
    );
    let snapshot = dir.load();
    let route = snapshot.route(&ObjectKey::new("ai", "chat")).unwrap();

    let pick = |model: &str| route.select_rule(&[("X-AI-EG-Model", model)]).map(|(i, _)| i);
    assert_eq!(pick("gpt-4o"), Some(0));
    assert_eq!(pick("claude"), Some(1));
    assert_eq!(pick("llama"), Some(2));
    assert_eq!(pick("GPT-4O"), Some(2));
}

/// Test defaults applied to rules and the dispatch strategy of each rule
#[test]
fn test_effective_rules() {
    let dir = ConfigDir::new();
    let mut chat = route(
        "ai",
        "chat",
        vec![rule(vec![backend_ref("openai")]), rule(vec![pool_ref("vllm")])],
    );
    chat["spec"]["rules"][1]["timeouts"] = serde_json::json!({ "backendRequest": "10s" });
    chat["spec"]["rules"][1]["modelsOwnedBy"] = serde_json::json!("Acme");
    dir.write("route.yaml", &[created_at(chat, "2024-05-01T12:00:00Z")]);

    let snapshot = dir.load();
    let route = snapshot.route(&ObjectKey::new("ai", "chat")).unwrap();
    let effective = EffectiveRoute::resolve(route, Utc::now()).unwrap();

    let first = &effective.rules[0];
    assert_eq!(first.timeouts.request.as_ref().unwrap().as_str(), "60s");
    assert_eq!(first.models_owned_by, "Envoy AI Gateway");
    assert_eq!(first.models_created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");

    let second = &effective.rules[1];
    assert_eq!(second.timeouts.request.as_ref().unwrap().as_str(), "60s");
    assert_eq!(second.timeouts.backend_request.as_ref().unwrap().as_str(), "10s");
    assert_eq!(second.models_owned_by, "Acme");
    assert_eq!(
        second.target,
        RuleTarget::Delegated {
            name: "vllm".to_string(),
            namespace: "ai".to_string(),
        }
    );
}

/// Test structural and reference errors on rules
#[test]
fn test_rule_reference_errors() {
    let dir = ConfigDir::new();
    let mut too_many_headers = model_rule("gpt-4o", vec![backend_ref("openai")]);
    too_many_headers["matches"][0]["headers"] = serde_json::Value::Array(
        (0..17)
            .map(|i| serde_json::json!({ "name": format!("x-h{i}"), "value": "v" }))
            .collect(),
    );
    dir.write(
        "route.yaml",
        &[
            route("ai", "headers", vec![too_many_headers]),
            route("ai", "mixed", vec![rule(vec![backend_ref("openai"), pool_ref("vllm")])]),
            route("ai", "pools", vec![rule(vec![pool_ref("vllm"), pool_ref("other")])]),
            route(
                "ai",
                "remote-pool",
                vec![rule(vec![{
                    let mut r = pool_ref("vllm");
                    r["namespace"] = serde_json::json!("infra");
                    r
                }])],
            ),
        ],
    );
    dir.write(
        "backends.yaml",
        &[backend("ai", "openai", "OpenAI"), inference_pool("ai", "vllm"), inference_pool("ai", "other")],
    );

    let (_, report) = dir.load_and_validate();
    let route_report = |name: &str| &report.routes[&ObjectKey::new("ai", name)];

    let headers = route_report("headers");
    assert_eq!(headers.errors.primary_category(), Some(ErrorCategory::Structural));
    assert!(error_messages(headers)[0].contains("headers"));

    assert!(!route_report("mixed").is_accepted());
    assert!(!route_report("pools").is_accepted());

    let remote = route_report("remote-pool");
    assert_eq!(remote.errors.primary_category(), Some(ErrorCategory::Reference));
    assert!(remote.cross_namespace_refs.is_empty());
}

/// Test cross-namespace backend references are accepted and audited
#[test]
fn test_cross_namespace_backend_is_audited() {
    let dir = ConfigDir::new();
    let mut shared_ref = backend_ref("openai");
    shared_ref["namespace"] = serde_json::json!("shared");
    dir.write("route.yaml", &[route("ai", "chat", vec![rule(vec![shared_ref])])]);
    dir.write("backends.yaml", &[backend("shared", "openai", "OpenAI")]);

    let (_, report) = dir.load_and_validate();
    let chat = &report.routes[&ObjectKey::new("ai", "chat")];
    assert!(chat.is_accepted());
    assert_eq!(chat.cross_namespace_refs.len(), 1);
    assert_eq!(chat.cross_namespace_refs[0].target, ObjectKey::new("shared", "openai"));
    assert_eq!(
        chat.condition(1, Utc::now()).message,
        "Configuration accepted with 1 cross-namespace reference(s)"
    );
}
