//! Object metadata and references shared by every declarative document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// API group/version of the declarative documents.
pub const API_VERSION: &str = "aigateway.envoyproxy.io/v1alpha1";

/// Namespace assumed when a document does not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Request header carrying the model name extracted from the request body.
///
/// Rules can match on it like any other header.
pub const AI_MODEL_HEADER_KEY: &str = "x-ai-eg-model";

/// Request header recording which route rule was selected.
pub const SELECTED_ROUTE_HEADER_KEY: &str = "x-ai-eg-selected-route";

/// Standard object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, unique per kind within a namespace.
    pub name: String,
    /// Namespace; `default` when omitted.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Creation time; drives model metadata defaults and first-wins ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Spec generation observed by status conditions.
    #[serde(default)]
    pub generation: i64,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ObjectMeta {
    /// Create metadata for a named object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            creation_timestamp: None,
            generation: 0,
        }
    }

    /// Set the creation timestamp.
    #[must_use]
    pub fn with_creation_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.creation_timestamp = Some(ts);
        self
    }

    /// Set the generation.
    #[must_use]
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    /// Key identifying this object within its kind.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Stable precedence order: oldest first, objects without a timestamp
    /// after all timestamped ones, then namespace, then name.
    #[must_use]
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        let by_time = match (self.creation_timestamp, other.creation_timestamp) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time
            .then_with(|| self.namespace.cmp(&other.namespace))
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Namespace/name pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
}

impl ObjectKey {
    /// Create a new key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to an object in the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalObjectReference {
    /// Name of the referent.
    pub name: String,
}

impl LocalObjectReference {
    /// Create a new reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Reference to a secret, optionally in another namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretObjectReference {
    /// Secret name.
    pub name: String,
    /// Secret namespace; the referencing object's namespace when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretObjectReference {
    /// Create a same-namespace secret reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_namespace_defaults() {
        let meta: ObjectMeta = serde_yaml::from_str("name: route-a").unwrap();
        assert_eq!(meta.namespace, "default");
        assert!(meta.creation_timestamp.is_none());
        assert_eq!(meta.key().to_string(), "default/route-a");
    }

    #[test]
    fn test_precedence_order() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let older = ObjectMeta::new("z", "z").with_creation_timestamp(t0);
        let newer = ObjectMeta::new("a", "a").with_creation_timestamp(t1);
        let untimed = ObjectMeta::new("a", "a");
        assert_eq!(older.precedence_cmp(&newer), Ordering::Less);
        assert_eq!(newer.precedence_cmp(&untimed), Ordering::Less);

        let same_a = ObjectMeta::new("a", "b").with_creation_timestamp(t0);
        let same_b = ObjectMeta::new("a", "c").with_creation_timestamp(t0);
        assert_eq!(same_a.precedence_cmp(&same_b), Ordering::Less);
    }
}
