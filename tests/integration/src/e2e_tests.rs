//! End-to-end tests
//!
//! Configuration directory in, validated snapshot and filter configuration
//! out, across several reloads.

use crate::fixtures::*;
use crate::helpers::*;
use chrono::Utc;
use gateway_config::{compile_filter_config, AcceptedRoutes, ConfigSnapshot, SnapshotStore};
use gateway_core::{ConditionType, ObjectKey};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn base_config(dir: &ConfigDir) {
    dir.write(
        "backends.yaml",
        &[
            backend("ai", "openai", "OpenAI"),
            backend("ai", "bedrock", "AWSBedrock"),
            api_key_policy("ai", "openai-key", "openai"),
        ],
    );
    dir.write(
        "route.yaml",
        &[with_costs(
            generation(
                route(
                    "ai",
                    "chat",
                    vec![
                        model_rule(
                            "gpt-4o",
                            vec![weighted_ref("openai", 4, 0), weighted_ref("bedrock", 1, 1)],
                        ),
                        rule(vec![backend_ref("bedrock")]),
                    ],
                ),
                1,
            ),
            vec![
                token_cost("llm_input_token", "InputToken"),
                expression_cost("weighted", "input_tokens + 3 * output_tokens"),
            ],
        )],
    );
}

/// Test a directory compiles into the expected filter configuration
#[test]
fn test_directory_to_filter() {
    let dir = ConfigDir::new();
    base_config(&dir);

    let (snapshot, report) = dir.load_and_validate();
    assert!(report.all_accepted(), "{report:?}");
    assert!(snapshot.rejected().is_empty());

    let mut accepted = AcceptedRoutes::new();
    accepted.apply(&snapshot, &report, Utc::now());
    let filter = compile_filter_config(GATEWAY, accepted.active_routes(), &snapshot, Utc::now());

    assert_eq!(filter.metadata_namespace, "io.envoy.ai_gateway");
    assert_eq!(filter.rules.len(), 2);
    assert_eq!(filter.llm_request_costs.len(), 2);

    let first = &filter.rules[0];
    assert_eq!(first.route, "ai/chat");
    assert_eq!(first.request_timeout, "60s");
    assert_eq!(first.models_owned_by, "Envoy AI Gateway");
    let backends: Vec<_> = first
        .backends
        .iter()
        .map(|b| (b.name.as_str(), b.weight, b.priority, b.security_policy.as_deref()))
        .collect();
    assert_eq!(
        backends,
        vec![
            ("openai.ai", 4, 0, Some("ai/openai-key")),
            ("bedrock.ai", 1, 1, None),
        ]
    );
    assert_eq!(filter.rules[1].backends[0].schema.to_string(), "AWSBedrock");
}

/// Test the last accepted route version stays in effect across bad reloads
#[test]
fn test_last_known_good_across_reloads() {
    let dir = ConfigDir::new();
    base_config(&dir);
    let store = SnapshotStore::default();
    let mut accepted = AcceptedRoutes::new();
    let key = ObjectKey::new("ai", "chat");

    let mut reload = |dir: &ConfigDir| {
        let (snapshot, report) = dir.load_and_validate();
        accepted.apply(&snapshot, &report, Utc::now());
        let filter = compile_filter_config(GATEWAY, accepted.active_routes(), &snapshot, Utc::now());
        let status = accepted
            .status(&key)
            .and_then(|s| s.condition())
            .map(|c| (c.condition_type, c.observed_generation));
        let active = accepted.active(&key).map(|r| r.metadata.generation);
        store.publish(snapshot);
        (filter, status, active)
    };

    let (filter, status, active) = reload(&dir);
    assert_eq!(status, Some((ConditionType::Accepted, 1)));
    assert_eq!(active, Some(1));
    assert_eq!(filter.rules.len(), 2);

    // Generation 2 references a backend that does not exist.
    dir.write(
        "route.yaml",
        &[generation(route("ai", "chat", vec![rule(vec![backend_ref("ghost")])]), 2)],
    );
    let (filter, status, active) = reload(&dir);
    assert_eq!(status, Some((ConditionType::NotAccepted, 2)));
    assert_eq!(active, Some(1));
    assert_eq!(filter.rules.len(), 2);
    assert_eq!(filter.rules[0].backends[0].name, "openai.ai");

    // Generation 3 is valid again.
    dir.write(
        "route.yaml",
        &[generation(route("ai", "chat", vec![rule(vec![backend_ref("bedrock")])]), 3)],
    );
    let (filter, status, active) = reload(&dir);
    assert_eq!(status, Some((ConditionType::Accepted, 3)));
    assert_eq!(active, Some(3));
    assert_eq!(filter.rules.len(), 1);

    // Deleting the route removes it.
    dir.remove("route.yaml");
    let (filter, status, active) = reload(&dir);
    assert_eq!(status, None);
    assert_eq!(active, None);
    assert!(filter.rules.is_empty());

    assert_eq!(store.version(), 4);
}

/// Test subscribers observe every publication
#[tokio::test]
async fn test_store_notifies_subscribers() {
    let dir = ConfigDir::new();
    base_config(&dir);
    let store = Arc::new(SnapshotStore::new(ConfigSnapshot::new()));
    let mut versions = store.subscribe();

    let publisher = Arc::clone(&store);
    let snapshot = dir.load();
    let handle = tokio::spawn(async move { publisher.publish(snapshot) });

    versions.changed().await.unwrap();
    assert_eq!(*versions.borrow(), 1);
    assert_eq!(handle.await.unwrap(), 1);

    let current = store.load();
    assert!(current.route(&ObjectKey::new("ai", "chat")).is_some());
    assert_eq!(current.backends().count(), 2);
}

/// Test broken documents are rejected without aborting the load
#[test]
fn test_rejected_documents_do_not_abort_load() {
    let dir = ConfigDir::new();
    base_config(&dir);

    let mut broken = api_key_policy("ai", "double", "bedrock");
    broken["spec"]["anthropicAPIKey"] = serde_json::json!({ "secretRef": { "name": "x" } });
    let mut wrong_version = backend("ai", "legacy", "OpenAI");
    wrong_version["apiVersion"] = serde_json::json!("aigateway.envoyproxy.io/v1beta9");
    dir.write("extra.yaml", &[broken, wrong_version]);

    let (snapshot, report) = dir.load_and_validate();
    assert!(report.all_accepted());

    let rejected: Vec<_> = snapshot
        .rejected()
        .iter()
        .map(|r| (r.kind.as_str(), r.key.to_string()))
        .collect();
    assert_eq!(
        rejected,
        vec![
            ("BackendSecurityPolicy", "ai/double".to_string()),
            ("AIServiceBackend", "ai/legacy".to_string()),
        ]
    );
    assert!(snapshot.rejected()[0].reason.contains("anthropicAPIKey"));
    assert_eq!(
        snapshot.rejected()[0].condition(Utc::now()).reason,
        "InvalidSpec"
    );
}

/// Test a duplicate definition keeps the first one read
#[test]
fn test_duplicate_documents_first_wins() {
    let dir = ConfigDir::new();
    base_config(&dir);
    // Files are read in path order, so this one comes after backends.yaml.
    dir.write("duplicates.yaml", &[backend("ai", "openai", "AzureOpenAI")]);

    let snapshot = dir.load();
    let openai = snapshot.backend("ai", "openai").unwrap();
    assert_eq!(openai.spec.schema.name, "OpenAI");
    assert_eq!(snapshot.rejected().len(), 1);
    assert!(snapshot.rejected()[0].reason.contains("duplicate"));
}
