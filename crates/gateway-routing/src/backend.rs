//! Service backends: the upstream a route rule forwards to, the schema it
//! speaks, and request header adjustments.

use gateway_core::{
    LocalObjectReference, ObjectMeta, ResourceStatus, ValidationError, VersionedApiSchema,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Document kind of a service backend.
pub const BACKEND_KIND: &str = "AIServiceBackend";

/// Maximum number of entries in each header mutation list.
pub const MAX_HEADER_MUTATIONS: usize = 16;

/// Service backend document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiServiceBackend {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Backend spec.
    pub spec: BackendSpec,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ResourceStatus,
}

impl AiServiceBackend {
    /// Create a backend.
    pub fn new(metadata: ObjectMeta, spec: BackendSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ResourceStatus::default(),
        }
    }
}

/// Backend spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    /// Output schema the backend expects.
    pub schema: VersionedApiSchema,
    /// Network-level backend object.
    pub backend_ref: BackendObjectReference,
    /// Security policy used to authenticate upstream requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_security_policy_ref: Option<LocalObjectReference>,
    /// Request header adjustments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_mutation: Option<HeaderMutation>,
}

impl BackendSpec {
    /// Create a spec.
    pub fn new(schema: impl Into<VersionedApiSchema>, backend_ref: BackendObjectReference) -> Self {
        Self {
            schema: schema.into(),
            backend_ref,
            backend_security_policy_ref: None,
            header_mutation: None,
        }
    }

    /// Attach a security policy.
    #[must_use]
    pub fn with_security_policy(mut self, name: impl Into<String>) -> Self {
        self.backend_security_policy_ref = Some(LocalObjectReference::new(name));
        self
    }

    /// Set header mutation.
    #[must_use]
    pub fn with_header_mutation(mut self, mutation: HeaderMutation) -> Self {
        self.header_mutation = Some(mutation);
        self
    }
}

/// Network-level object (e.g. an Envoy Gateway `Backend` or a `Service`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendObjectReference {
    /// Object name.
    pub name: String,
    /// Object namespace; the backend's namespace when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// API group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Port, for kinds that need one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl BackendObjectReference {
    /// Reference an Envoy Gateway `Backend` by name.
    pub fn envoy_backend(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            group: Some("gateway.envoyproxy.io".to_string()),
            kind: Some("Backend".to_string()),
            port: None,
        }
    }
}

/// A header name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Headers to set and remove on requests forwarded to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMutation {
    /// Headers to overwrite or add.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<HttpHeader>,
    /// Header names to remove, compared case-insensitively.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

impl HeaderMutation {
    /// Check list limits and names.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let set = self.deduplicated_set();
        if set.len() > MAX_HEADER_MUTATIONS {
            errors.push(ValidationError::cardinality(
                "set",
                0,
                MAX_HEADER_MUTATIONS,
                set.len(),
            ));
        }
        if self.remove.len() > MAX_HEADER_MUTATIONS {
            errors.push(ValidationError::cardinality(
                "remove",
                0,
                MAX_HEADER_MUTATIONS,
                self.remove.len(),
            ));
        }
        for (i, header) in self.set.iter().enumerate() {
            if header.name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!("set[{i}].name"),
                    "must not be empty",
                ));
            }
        }
        for (i, name) in self.remove.iter().enumerate() {
            if name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!("remove[{i}]"),
                    "must not be empty",
                ));
            }
        }
        errors
    }

    /// `set` entries with later duplicates (case-insensitive name) dropped.
    #[must_use]
    pub fn deduplicated_set(&self) -> Vec<&HttpHeader> {
        let mut seen = HashSet::new();
        self.set
            .iter()
            .filter(|h| seen.insert(h.name.to_ascii_lowercase()))
            .collect()
    }

    /// Apply the mutation to a header list: removals first, then sets.
    pub fn apply(&self, headers: &mut Vec<(String, String)>) {
        headers.retain(|(name, _)| !self.remove.iter().any(|r| r.eq_ignore_ascii_case(name)));
        for header in self.deduplicated_set() {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case(&header.name));
            headers.push((header.name.clone(), header.value.clone()));
        }
    }
}
