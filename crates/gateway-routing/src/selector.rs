//! Weighted, priority-tiered backend selection.
//!
//! Backends are grouped into tiers by priority; the lowest priority number
//! is preferred. Within a tier each backend receives `weight / sum(weights)`
//! of the traffic. A tier is skipped when none of its available backends has
//! a positive weight, so traffic falls through to the next tier. Zero-weight
//! backends stay listed in their tier but are never selected.
//!
//! Selection is a pure function of a uniform draw in `[0, 1)`; callers
//! supply the draw (or an RNG) so that routing decisions are reproducible.

use gateway_core::{ValidationError, ValidationErrors};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::backend_ref::BackendKind;
use crate::rules::RouteRule;

/// A selectable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightedEntry {
    /// Position of the reference within its rule.
    pub index: usize,
    /// Backend name.
    pub name: String,
    /// Backend namespace.
    pub namespace: String,
    /// Relative weight; zero receives no traffic.
    pub weight: u32,
    /// Priority tier.
    pub priority: u32,
    /// Model name sent upstream instead of the requested one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
}

impl WeightedEntry {
    /// `name.namespace` identifier.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.name, self.namespace)
    }
}

/// Backends sharing a priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityTier {
    /// Priority of every entry.
    pub priority: u32,
    /// Entries in declaration order.
    pub entries: Vec<WeightedEntry>,
}

impl PriorityTier {
    /// Sum of all weights in the tier.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.weight)).sum()
    }

    /// Share of the tier's traffic going to an entry, assuming all entries
    /// are available. Zero for every entry when the tier weighs nothing.
    #[must_use]
    pub fn share(&self, entry: &WeightedEntry) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            0.0
        } else {
            f64::from(entry.weight) / total as f64
        }
    }
}

/// Selector over the backends of one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeightedSelector {
    tiers: Vec<PriorityTier>,
}

impl WeightedSelector {
    /// Group entries into tiers, keeping declaration order within a tier.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = WeightedEntry>) -> Self {
        let mut grouped: BTreeMap<u32, Vec<WeightedEntry>> = BTreeMap::new();
        for entry in entries {
            grouped.entry(entry.priority).or_default().push(entry);
        }
        Self {
            tiers: grouped
                .into_iter()
                .map(|(priority, entries)| PriorityTier { priority, entries })
                .collect(),
        }
    }

    /// Build a selector from a rule of service backends.
    pub fn from_rule(rule: &RouteRule, route_namespace: &str) -> Result<Self, ValidationErrors> {
        match rule.backend_kind()? {
            Some(BackendKind::InferencePool) => Err(ValidationError::invalid(
                "backendRefs",
                "inference pool rules are not weighted",
            )
            .into()),
            _ => Ok(Self::new(rule.backend_refs.iter().enumerate().map(
                |(index, r)| WeightedEntry {
                    index,
                    name: r.name.clone(),
                    namespace: r.resolve_namespace(route_namespace).to_string(),
                    weight: r.effective_weight(),
                    priority: r.effective_priority(),
                    model_name_override: r.model_name_override.clone(),
                },
            ))),
        }
    }

    /// Tiers in preference order.
    #[must_use]
    pub fn tiers(&self) -> &[PriorityTier] {
        &self.tiers
    }

    /// Whether there is nothing to select from.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|t| t.entries.is_empty())
    }

    /// Select with every backend available.
    #[must_use]
    pub fn select(&self, draw: f64) -> Option<&WeightedEntry> {
        self.select_available(draw, |_| true)
    }

    /// Select among available backends.
    ///
    /// `draw` is a uniform sample in `[0, 1)`; values outside are clamped and
    /// NaN reads as zero. Returns `None` when no tier has an available
    /// backend with positive weight.
    pub fn select_available<F>(&self, draw: f64, is_available: F) -> Option<&WeightedEntry>
    where
        F: Fn(&WeightedEntry) -> bool,
    {
        let draw = if draw.is_nan() { 0.0 } else { draw.clamp(0.0, 1.0) };

        for tier in &self.tiers {
            let candidates: Vec<&WeightedEntry> = tier
                .entries
                .iter()
                .filter(|e| e.weight > 0 && is_available(e))
                .collect();
            let total: u64 = candidates.iter().map(|e| u64::from(e.weight)).sum();
            if total == 0 {
                continue;
            }

            let point = ((draw * total as f64) as u64).min(total - 1);
            let mut cumulative = 0u64;
            for entry in candidates {
                cumulative += u64::from(entry.weight);
                if point < cumulative {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// Select among available backends using a random draw.
    pub fn select_random<R, F>(&self, rng: &mut R, is_available: F) -> Option<&WeightedEntry>
    where
        R: Rng + ?Sized,
        F: Fn(&WeightedEntry) -> bool,
    {
        let draw: f64 = rng.gen();
        self.select_available(draw, is_available)
    }
}

/// How a rule dispatches traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleTarget {
    /// Weighted selection among service backends.
    Weighted(WeightedSelector),
    /// Endpoint selection delegated to an inference pool.
    Delegated {
        /// Pool name.
        name: String,
        /// Pool namespace.
        namespace: String,
    },
    /// The rule has no backends.
    Unrouted,
}

impl RuleTarget {
    /// Derive the dispatch strategy of a rule.
    pub fn from_rule(rule: &RouteRule, route_namespace: &str) -> Result<Self, ValidationErrors> {
        match rule.backend_kind()? {
            None => Ok(Self::Unrouted),
            Some(BackendKind::Service) => Ok(Self::Weighted(WeightedSelector::from_rule(
                rule,
                route_namespace,
            )?)),
            Some(BackendKind::InferencePool) => {
                let pool = &rule.backend_refs[0];
                Ok(Self::Delegated {
                    name: pool.name.clone(),
                    namespace: pool.resolve_namespace(route_namespace).to_string(),
                })
            }
        }
    }
}
