//! Immutable configuration snapshots and their publication.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use gateway_core::{Condition, ObjectKey, ObjectMeta};
use gateway_routing::{AiGatewayRoute, AiServiceBackend};
use gateway_security::BackendSecurityPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Inference pool; only its identity is needed to resolve references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferencePool {
    /// Object metadata.
    pub metadata: ObjectMeta,
}

impl InferencePool {
    /// Create a pool.
    pub fn new(metadata: ObjectMeta) -> Self {
        Self { metadata }
    }
}

/// A document that could not be turned into an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedObject {
    /// Document kind.
    pub kind: String,
    /// Identity taken from the document's metadata.
    pub key: ObjectKey,
    /// Why it was rejected.
    pub reason: String,
}

impl RejectedObject {
    /// Create a rejected object.
    pub fn new(kind: impl Into<String>, key: ObjectKey, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key,
            reason: reason.into(),
        }
    }

    /// Status condition reported for the document.
    #[must_use]
    pub fn condition(&self, now: DateTime<Utc>) -> Condition {
        Condition::rejected(0, "InvalidSpec", self.reason.clone(), now)
    }
}

/// All declarative objects known at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    routes: BTreeMap<ObjectKey, AiGatewayRoute>,
    backends: BTreeMap<ObjectKey, AiServiceBackend>,
    security_policies: BTreeMap<ObjectKey, BackendSecurityPolicy>,
    inference_pools: BTreeMap<ObjectKey, InferencePool>,
    rejected: Vec<RejectedObject>,
}

impl ConfigSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Returns `false` and keeps the existing one on a duplicate key.
    pub fn insert_route(&mut self, route: AiGatewayRoute) -> bool {
        insert_first(&mut self.routes, route.metadata.key(), route)
    }

    /// Add a backend. Returns `false` and keeps the existing one on a duplicate key.
    pub fn insert_backend(&mut self, backend: AiServiceBackend) -> bool {
        insert_first(&mut self.backends, backend.metadata.key(), backend)
    }

    /// Add a security policy. Returns `false` and keeps the existing one on a duplicate key.
    pub fn insert_security_policy(&mut self, policy: BackendSecurityPolicy) -> bool {
        insert_first(&mut self.security_policies, policy.metadata.key(), policy)
    }

    /// Add an inference pool. Returns `false` and keeps the existing one on a duplicate key.
    pub fn insert_inference_pool(&mut self, pool: InferencePool) -> bool {
        insert_first(&mut self.inference_pools, pool.metadata.key(), pool)
    }

    /// Record a document that failed conversion.
    pub fn reject(&mut self, rejected: RejectedObject) {
        self.rejected.push(rejected);
    }

    /// Route by key.
    #[must_use]
    pub fn route(&self, key: &ObjectKey) -> Option<&AiGatewayRoute> {
        self.routes.get(key)
    }

    /// Backend by namespace and name.
    #[must_use]
    pub fn backend(&self, namespace: &str, name: &str) -> Option<&AiServiceBackend> {
        self.backends.get(&ObjectKey::new(namespace, name))
    }

    /// Security policy by namespace and name.
    #[must_use]
    pub fn security_policy(&self, namespace: &str, name: &str) -> Option<&BackendSecurityPolicy> {
        self.security_policies.get(&ObjectKey::new(namespace, name))
    }

    /// Inference pool by namespace and name.
    #[must_use]
    pub fn inference_pool(&self, namespace: &str, name: &str) -> Option<&InferencePool> {
        self.inference_pools.get(&ObjectKey::new(namespace, name))
    }

    /// All routes in key order.
    pub fn routes(&self) -> impl Iterator<Item = &AiGatewayRoute> {
        self.routes.values()
    }

    /// All backends in key order.
    pub fn backends(&self) -> impl Iterator<Item = &AiServiceBackend> {
        self.backends.values()
    }

    /// All security policies in key order.
    pub fn security_policies(&self) -> impl Iterator<Item = &BackendSecurityPolicy> {
        self.security_policies.values()
    }

    /// All inference pools in key order.
    pub fn inference_pools(&self) -> impl Iterator<Item = &InferencePool> {
        self.inference_pools.values()
    }

    /// Documents rejected while loading.
    #[must_use]
    pub fn rejected(&self) -> &[RejectedObject] {
        &self.rejected
    }

    /// Policies attached to a backend, either through the backend's own
    /// reference or through a policy's target list. Missing references are
    /// not included.
    #[must_use]
    pub fn attached_policies(&self, backend: &AiServiceBackend) -> Vec<&BackendSecurityPolicy> {
        let namespace = &backend.metadata.namespace;
        let mut keys = BTreeSet::new();
        if let Some(reference) = &backend.spec.backend_security_policy_ref {
            keys.insert(ObjectKey::new(namespace, &reference.name));
        }
        for policy in self.security_policies.values() {
            if &policy.metadata.namespace == namespace && policy.targets(&backend.metadata.name) {
                keys.insert(policy.metadata.key());
            }
        }
        keys.iter()
            .filter_map(|key| self.security_policies.get(key))
            .collect()
    }

    /// Routes attached to a gateway, oldest first.
    #[must_use]
    pub fn routes_for_gateway(&self, gateway: &str) -> Vec<&AiGatewayRoute> {
        let mut routes: Vec<_> = self
            .routes
            .values()
            .filter(|r| r.attaches_to(gateway))
            .collect();
        routes.sort_by(|a, b| a.metadata.precedence_cmp(&b.metadata));
        routes
    }

    /// Names of all gateways routes attach to.
    #[must_use]
    pub fn gateways(&self) -> BTreeSet<String> {
        self.routes
            .values()
            .flat_map(|r| r.spec.target_refs.iter().map(|t| t.name.clone()))
            .collect()
    }

    /// Number of accepted documents (rejected ones excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
            + self.backends.len()
            + self.security_policies.len()
            + self.inference_pools.len()
    }

    /// Whether the snapshot holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_first<T>(map: &mut BTreeMap<ObjectKey, T>, key: ObjectKey, value: T) -> bool {
    if map.contains_key(&key) {
        return false;
    }
    map.insert(key, value);
    true
}

/// Holds the active snapshot and announces replacements.
///
/// Readers take a cheap `Arc` of the current snapshot; subscribers receive
/// the version number of every publication.
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<ConfigSnapshot>,
    version: watch::Sender<u64>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(ConfigSnapshot::default())
    }
}

impl SnapshotStore {
    /// Create a store with an initial snapshot at version 0.
    #[must_use]
    pub fn new(initial: ConfigSnapshot) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(initial),
            version,
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Replace the snapshot and return the new version.
    pub fn publish(&self, snapshot: ConfigSnapshot) -> u64 {
        self.current.store(Arc::new(snapshot));
        let next = *self.version.borrow() + 1;
        self.version.send_replace(next);
        next
    }

    /// Version of the current snapshot.
    #[must_use]
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Receive version numbers of future publications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}
