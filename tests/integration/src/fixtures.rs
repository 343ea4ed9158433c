//! Declarative documents for integration tests

use gateway_core::API_VERSION;
use serde_json::{json, Value};

/// Gateway every fixture route attaches to.
pub const GATEWAY: &str = "envoy-ai-gateway";

/// A route attached to [`GATEWAY`].
pub fn route(namespace: &str, name: &str, rules: Vec<Value>) -> Value {
    json!({
        "apiVersion": API_VERSION,
        "kind": "AIGatewayRoute",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "targetRefs": [{ "name": GATEWAY }],
            "schema": { "name": "OpenAI" },
            "rules": rules,
        },
    })
}

/// Set a route's creation timestamp (RFC 3339).
pub fn created_at(mut route: Value, timestamp: &str) -> Value {
    route["metadata"]["creationTimestamp"] = json!(timestamp);
    route
}

/// Set a route's generation.
pub fn generation(mut route: Value, generation: i64) -> Value {
    route["metadata"]["generation"] = json!(generation);
    route
}

/// Append request costs to a route.
pub fn with_costs(mut route: Value, costs: Vec<Value>) -> Value {
    route["spec"]["llmRequestCosts"] = Value::Array(costs);
    route
}

/// A rule matching every request.
pub fn rule(backend_refs: Vec<Value>) -> Value {
    json!({ "backendRefs": backend_refs })
}

/// A rule matching one model.
pub fn model_rule(model: &str, backend_refs: Vec<Value>) -> Value {
    json!({
        "matches": [{ "headers": [{ "type": "Exact", "name": "x-ai-eg-model", "value": model }] }],
        "backendRefs": backend_refs,
    })
}

/// Reference to a backend in the route's namespace.
pub fn backend_ref(name: &str) -> Value {
    json!({ "name": name })
}

/// Reference with weight and priority.
pub fn weighted_ref(name: &str, weight: u32, priority: u32) -> Value {
    json!({ "name": name, "weight": weight, "priority": priority })
}

/// Reference to an inference pool.
pub fn pool_ref(name: &str) -> Value {
    json!({ "name": name, "group": "inference.networking.k8s.io", "kind": "InferencePool" })
}

/// A backend with the given output schema.
pub fn backend(namespace: &str, name: &str, schema: &str) -> Value {
    json!({
        "apiVersion": API_VERSION,
        "kind": "AIServiceBackend",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "schema": { "name": schema },
            "backendRef": { "name": name, "kind": "Backend", "group": "gateway.envoyproxy.io" },
        },
    })
}

/// An API key policy targeting one backend.
pub fn api_key_policy(namespace: &str, name: &str, target: &str) -> Value {
    json!({
        "apiVersion": API_VERSION,
        "kind": "BackendSecurityPolicy",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "targetRefs": [{ "name": target }],
            "type": "APIKey",
            "apiKey": { "secretRef": { "name": format!("{name}-secret") } },
        },
    })
}

/// A GCP credentials-file policy targeting one backend.
pub fn gcp_policy(namespace: &str, name: &str, target: &str) -> Value {
    json!({
        "apiVersion": API_VERSION,
        "kind": "BackendSecurityPolicy",
        "metadata": { "name": name, "namespace": namespace },
        "spec": {
            "targetRefs": [{ "name": target }],
            "type": "GCPCredentials",
            "gcpCredentials": {
                "projectName": "acme",
                "region": "us-central1",
                "credentialsFile": { "secretRef": { "name": "gcp-sa" } },
            },
        },
    })
}

/// An inference pool.
pub fn inference_pool(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": "inference.networking.k8s.io/v1",
        "kind": "InferencePool",
        "metadata": { "name": name, "namespace": namespace },
    })
}

/// A token cost.
pub fn token_cost(key: &str, cost_type: &str) -> Value {
    json!({ "metadataKey": key, "type": cost_type })
}

/// An expression cost.
pub fn expression_cost(key: &str, expression: &str) -> Value {
    json!({ "metadataKey": key, "type": "CEL", "cel": expression })
}
