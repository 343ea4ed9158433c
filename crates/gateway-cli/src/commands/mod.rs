//! CLI command implementations.

pub mod cost;
pub mod explain;
pub mod render;
pub mod validate;

use anyhow::{Context, Result};
use clap::Args;
use gateway_config::{load_snapshot, ConfigSnapshot, RouteValidator};
use gateway_core::{ObjectKey, DEFAULT_NAMESPACE};
use gateway_telemetry::RhaiCostEvaluator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Location of the declarative configuration.
#[derive(Args, Debug, Clone)]
pub struct ConfigSource {
    /// Configuration file or directory of YAML/JSON documents
    #[arg(short, long, env = "AIGW_CONFIG_DIR", default_value = "config")]
    pub config: PathBuf,
}

impl ConfigSource {
    /// Load every document below the configured path.
    pub fn load(&self) -> Result<ConfigSnapshot> {
        let snapshot = load_snapshot(&self.config).with_context(|| {
            format!("Failed to load configuration from {}", self.config.display())
        })?;
        debug!(
            path = %self.config.display(),
            objects = snapshot.len(),
            rejected = snapshot.rejected().len(),
            "Loaded configuration"
        );
        Ok(snapshot)
    }
}

/// Validator used by all commands.
pub fn validator(check_expressions: bool) -> RouteValidator {
    let validator = RouteValidator::new();
    if check_expressions {
        validator.with_evaluator(Arc::new(RhaiCostEvaluator::new()))
    } else {
        validator
    }
}

/// Parse `namespace/name`, or a bare name in the default namespace.
pub fn parse_key(value: &str) -> ObjectKey {
    match value.split_once('/') {
        Some((namespace, name)) => ObjectKey::new(namespace, name),
        None => ObjectKey::new(DEFAULT_NAMESPACE, value),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use tempfile::TempDir;

    pub const ROUTE: &str = r#"
apiVersion: aigateway.envoyproxy.io/v1alpha1
kind: AIGatewayRoute
metadata:
  name: chat
  namespace: ai
  creationTimestamp: "2024-05-01T12:00:00Z"
spec:
  targetRefs:
    - name: envoy-ai-gateway
  schema:
    name: OpenAI
  rules:
    - matches:
        - headers:
            - name: x-ai-eg-model
              value: gpt-4o
      backendRefs:
        - name: openai
          weight: 3
        - name: azure
          weight: 1
        - name: bedrock
          priority: 1
  llmRequestCosts:
    - metadataKey: llm_total_token
      type: TotalToken
    - metadataKey: weighted
      type: CEL
      cel: "input_tokens + output_tokens * 2"
"#;

    pub const BACKENDS: &str = r#"
apiVersion: aigateway.envoyproxy.io/v1alpha1
kind: AIServiceBackend
metadata:
  name: openai
  namespace: ai
spec:
  schema:
    name: OpenAI
  backendRef:
    name: openai
    kind: Backend
    group: gateway.envoyproxy.io
---
apiVersion: aigateway.envoyproxy.io/v1alpha1
kind: AIServiceBackend
metadata:
  name: azure
  namespace: ai
spec:
  schema:
    name: AzureOpenAI
    version: "2024-10-21"
  backendRef:
    name: azure
    kind: Backend
    group: gateway.envoyproxy.io
---
apiVersion: aigateway.envoyproxy.io/v1alpha1
kind: AIServiceBackend
metadata:
  name: bedrock
  namespace: ai
spec:
  schema:
    name: AWSBedrock
  backendRef:
    name: bedrock
    kind: Backend
    group: gateway.envoyproxy.io
"#;

    /// Directory holding a valid route and its backends.
    pub fn valid_config() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("route.yaml"), ROUTE).unwrap();
        fs::write(dir.path().join("backends.yaml"), BACKENDS).unwrap();
        dir
    }

    /// Same as [`valid_config`] with one backend missing.
    pub fn broken_config() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("route.yaml"), ROUTE).unwrap();
        let backends: Vec<_> = BACKENDS.split("---").take(2).collect();
        fs::write(dir.path().join("backends.yaml"), backends.join("---")).unwrap();
        dir
    }
}
