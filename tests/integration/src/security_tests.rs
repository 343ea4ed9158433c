//! Security policy integration tests
//!
//! Tests for credential shapes, policy attachment and the checks backends
//! run against their attached policies.

use crate::fixtures::*;
use crate::helpers::*;
use gateway_config::EffectiveBackend;
use gateway_core::{ErrorCategory, ObjectKey};
use gateway_security::BackendCredentials;
use serde_json::json;

/// Test a policy carrying two credential mechanisms is rejected at load
#[test]
fn test_conflicting_credentials_rejected() {
    let dir = ConfigDir::new();
    let mut policy = api_key_policy("ai", "openai-key", "openai");
    policy["spec"]["anthropicAPIKey"] = json!({ "secretRef": { "name": "other" } });
    dir.write("policy.yaml", &[policy, api_key_policy("ai", "valid-key", "openai")]);
    dir.write("backend.yaml", &[backend("ai", "openai", "OpenAI")]);

    let snapshot = dir.load();
    assert!(snapshot.security_policy("ai", "openai-key").is_none());
    let valid = snapshot.security_policy("ai", "valid-key").unwrap();
    assert!(matches!(
        &valid.spec.credentials,
        BackendCredentials::ApiKey(key) if key.secret_ref.name == "valid-key-secret"
    ));

    let rejected = &snapshot.rejected()[0];
    assert_eq!(rejected.kind, "BackendSecurityPolicy");
    assert_eq!(rejected.key, ObjectKey::new("ai", "openai-key"));
    assert!(
        rejected.reason.contains("spec.anthropicAPIKey: must not be set when type is APIKey"),
        "{}",
        rejected.reason
    );
}

/// Test AWS credentials need exactly one source
#[test]
fn test_aws_credentials_need_one_source() {
    let dir = ConfigDir::new();
    let policy = |name: &str, aws: serde_json::Value| {
        json!({
            "apiVersion": gateway_core::API_VERSION,
            "kind": "BackendSecurityPolicy",
            "metadata": { "name": name, "namespace": "ai" },
            "spec": { "targetRefs": [{ "name": "bedrock" }], "type": "AWSCredentials", "awsCredentials": aws },
        })
    };
    dir.write(
        "policy.yaml",
        &[
            policy("none", json!({ "region": "us-east-1" })),
            policy(
                "file",
                json!({
                    "region": "us-east-1",
                    "credentialsFile": { "secretRef": { "name": "aws" } },
                }),
            ),
        ],
    );

    let snapshot = dir.load();
    assert!(snapshot.security_policy("ai", "file").is_some());
    assert_eq!(snapshot.rejected().len(), 1);
    assert!(snapshot.rejected()[0].reason.contains("exactly one of"));
}

/// Test GCP schemas require GCP credentials
#[test]
fn test_gcp_schema_requires_gcp_policy() {
    let dir = ConfigDir::new();
    dir.write(
        "backends.yaml",
        &[
            backend("ai", "vertex", "GCPVertexAI"),
            backend("ai", "claude", "GCPAnthropic"),
        ],
    );
    dir.write(
        "policies.yaml",
        &[
            gcp_policy("ai", "vertex-sa", "vertex"),
            api_key_policy("ai", "claude-key", "claude"),
        ],
    );

    let (_, report) = dir.load_and_validate();
    assert!(report.backends[&ObjectKey::new("ai", "vertex")].is_accepted());

    let claude = &report.backends[&ObjectKey::new("ai", "claude")];
    assert_eq!(claude.errors.primary_category(), Some(ErrorCategory::Reference));
    assert!(error_messages(claude)[0].contains("requires a GCPCredentials security policy"));
}

/// Test a backend may have at most one security policy
#[test]
fn test_multiple_policies_rejected() {
    let dir = ConfigDir::new();
    let mut openai = backend("ai", "openai", "OpenAI");
    openai["spec"]["backendSecurityPolicyRef"] = json!({ "name": "by-ref" });
    dir.write("backend.yaml", &[openai]);
    dir.write(
        "policies.yaml",
        &[
            api_key_policy("ai", "by-ref", "unrelated"),
            api_key_policy("ai", "by-target", "openai"),
        ],
    );

    let (_, report) = dir.load_and_validate();
    let openai = &report.backends[&ObjectKey::new("ai", "openai")];
    assert!(!openai.is_accepted());
    let messages = error_messages(openai);
    assert!(
        messages.iter().any(|m| m.contains("found by-ref, by-target")),
        "{messages:?}"
    );

    let by_ref = &report.security_policies[&ObjectKey::new("ai", "by-ref")];
    assert_eq!(by_ref.errors.primary_category(), Some(ErrorCategory::Reference));
}

/// Test policy references resolve within the owning namespace
#[test]
fn test_policy_references_are_namespaced() {
    let dir = ConfigDir::new();
    let mut openai = backend("ai", "openai", "OpenAI");
    openai["spec"]["backendSecurityPolicyRef"] = json!({ "name": "shared-key" });
    dir.write("backend.yaml", &[openai]);
    dir.write("policies.yaml", &[api_key_policy("shared", "shared-key", "openai")]);

    let (_, report) = dir.load_and_validate();
    let openai = &report.backends[&ObjectKey::new("ai", "openai")];
    assert_eq!(
        error_messages(openai),
        ["spec.backendSecurityPolicyRef: BackendSecurityPolicy ai/shared-key not found"]
    );

    let policy = &report.security_policies[&ObjectKey::new("shared", "shared-key")];
    assert_eq!(
        error_messages(policy),
        ["spec.targetRefs[0]: AIServiceBackend shared/openai not found"]
    );
}

/// Test the effective backend carries its attached policy
#[test]
fn test_effective_backend_policy() {
    let dir = ConfigDir::new();
    dir.write(
        "backends.yaml",
        &[
            backend("ai", "openai", "OpenAI"),
            backend("ai", "bedrock", "AWSBedrock"),
        ],
    );
    dir.write("policy.yaml", &[api_key_policy("ai", "openai-key", "openai")]);

    let (snapshot, report) = dir.load_and_validate();
    assert!(report.all_accepted());

    let openai = snapshot.backend("ai", "openai").unwrap();
    let effective = EffectiveBackend::resolve(openai, &snapshot).unwrap();
    assert_eq!(effective.security_policy, Some(ObjectKey::new("ai", "openai-key")));
    assert_eq!(effective.schema.version, "v1");

    let bedrock = snapshot.backend("ai", "bedrock").unwrap();
    let effective = EffectiveBackend::resolve(bedrock, &snapshot).unwrap();
    assert_eq!(effective.security_policy, None);
    assert_eq!(effective.schema.version, "");
}
