//! Backend references from route rules.
//!
//! A reference names either a conventional [`AiServiceBackend`](crate::AiServiceBackend)
//! (no group/kind) or an inference pool (group `inference.networking.k8s.io`,
//! kind `InferencePool`). Any other group/kind combination is rejected.

use gateway_core::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API group of inference pools.
pub const INFERENCE_POOL_GROUP: &str = "inference.networking.k8s.io";

/// Kind of inference pools.
pub const INFERENCE_POOL_KIND: &str = "InferencePool";

/// Weight assumed when a reference declares none.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Priority assumed when a reference declares none.
pub const DEFAULT_PRIORITY: u32 = 0;

/// What a backend reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// A conventional service backend.
    Service,
    /// An inference pool performing its own endpoint selection.
    InferencePool,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "AIServiceBackend"),
            Self::InferencePool => write!(f, "InferencePool"),
        }
    }
}

/// Reference from a route rule to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBackendRef {
    /// Name of the referent.
    pub name: String,
    /// Namespace of the referent; the route's namespace when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// API group; set together with `kind` for inference pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Kind; set together with `group` for inference pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Model name sent upstream instead of the requested one. Ignored for pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
    /// Relative share of traffic within the priority tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    /// Priority tier; lower is preferred. Ignored for pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl RouteBackendRef {
    /// Reference a service backend.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            group: None,
            kind: None,
            model_name_override: None,
            weight: None,
            priority: None,
        }
    }

    /// Reference an inference pool.
    pub fn inference_pool(name: impl Into<String>) -> Self {
        Self {
            group: Some(INFERENCE_POOL_GROUP.to_string()),
            kind: Some(INFERENCE_POOL_KIND.to_string()),
            ..Self::service(name)
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the weight.
    #[must_use]
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the model name override.
    #[must_use]
    pub fn with_model_name_override(mut self, model: impl Into<String>) -> Self {
        self.model_name_override = Some(model.into());
        self
    }

    /// Classify the reference by its group and kind.
    ///
    /// Empty strings count as absent.
    pub fn classify(&self) -> Result<BackendKind, ValidationError> {
        match (non_empty(self.group.as_ref()), non_empty(self.kind.as_ref())) {
            (None, None) => Ok(BackendKind::Service),
            (Some(INFERENCE_POOL_GROUP), Some(INFERENCE_POOL_KIND)) => {
                Ok(BackendKind::InferencePool)
            }
            (group, kind) => Err(ValidationError::invalid(
                "",
                format!(
                    "unsupported backend reference group {:?} kind {:?}; omit both for an AIServiceBackend or use {INFERENCE_POOL_GROUP}/{INFERENCE_POOL_KIND}",
                    group.unwrap_or_default(),
                    kind.unwrap_or_default(),
                ),
            )),
        }
    }

    /// Whether the reference points at an inference pool.
    #[must_use]
    pub fn is_inference_pool(&self) -> bool {
        matches!(self.classify(), Ok(BackendKind::InferencePool))
    }

    /// Namespace of the referent, falling back to `default_namespace`.
    #[must_use]
    pub fn resolve_namespace<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        non_empty(self.namespace.as_ref()).unwrap_or(default_namespace)
    }

    /// Whether the referent lives outside the route's namespace.
    #[must_use]
    pub fn is_cross_namespace(&self, route_namespace: &str) -> bool {
        self.resolve_namespace(route_namespace) != route_namespace
    }

    /// Declared weight, or the default. Negative weights are reported by
    /// validation and read as zero here.
    #[must_use]
    pub fn effective_weight(&self) -> u32 {
        self.weight
            .map_or(DEFAULT_WEIGHT, |w| u32::try_from(w).unwrap_or(0))
    }

    /// Declared priority, or the default.
    #[must_use]
    pub fn effective_priority(&self) -> u32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    /// `name.namespace` identifier used by the data plane.
    #[must_use]
    pub fn qualified_name(&self, route_namespace: &str) -> String {
        format!("{}.{}", self.name, self.resolve_namespace(route_namespace))
    }

    /// Check the reference in isolation: non-empty name, known kind,
    /// non-negative weight.
    pub fn validate(&self) -> Result<BackendKind, Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.name.is_empty() {
            errors.push(ValidationError::invalid("name", "must not be empty"));
        }
        if let Some(weight) = self.weight {
            if weight < 0 {
                errors.push(ValidationError::invalid(
                    "weight",
                    format!("must be non-negative, got {weight}"),
                ));
            }
        }
        let kind = self.classify();
        match kind {
            Ok(kind) if errors.is_empty() => Ok(kind),
            Ok(_) => Err(errors),
            Err(e) => {
                errors.push(e);
                Err(errors)
            }
        }
    }
}
