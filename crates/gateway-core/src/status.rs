//! Lifecycle status of declarative objects.
//!
//! An object carries at most one condition: the outcome of its most recent
//! validation. Setting a new condition replaces whatever was there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

/// Condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// Configuration is valid and in effect.
    Accepted,
    /// Configuration was rejected.
    NotAccepted,
}

/// Validation outcome attached to an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Outcome.
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable explanation.
    pub message: String,
    /// Generation the outcome applies to.
    pub observed_generation: i64,
    /// When the outcome was recorded.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Build an accepted condition.
    pub fn accepted(generation: i64, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            condition_type: ConditionType::Accepted,
            reason: "Accepted".to_string(),
            message: message.into(),
            observed_generation: generation,
            last_transition_time: now,
        }
    }

    /// Build a rejected condition from validation failures.
    pub fn not_accepted(generation: i64, errors: &ValidationErrors, now: DateTime<Utc>) -> Self {
        let reason = errors
            .primary_category()
            .map_or("NotAccepted", |category| category.reason());
        Self {
            condition_type: ConditionType::NotAccepted,
            reason: reason.to_string(),
            message: errors.to_string(),
            observed_generation: generation,
            last_transition_time: now,
        }
    }

    /// Build a rejected condition with a free-form message.
    pub fn rejected(
        generation: i64,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            condition_type: ConditionType::NotAccepted,
            reason: reason.into(),
            message: message.into(),
            observed_generation: generation,
            last_transition_time: now,
        }
    }

    /// Whether this condition reports acceptance.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.condition_type == ConditionType::Accepted
    }
}

/// Status block holding at most one condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Most recent condition, if any. Serialized as a list for compatibility.
    #[serde(default, with = "single_condition")]
    pub conditions: Option<Condition>,
}

impl ResourceStatus {
    /// Replace the current condition.
    ///
    /// The transition time is kept when the outcome and message did not change.
    pub fn set_condition(&mut self, condition: Condition) {
        let unchanged = self.conditions.as_ref().is_some_and(|current| {
            current.condition_type == condition.condition_type
                && current.message == condition.message
        });
        if unchanged {
            if let Some(current) = self.conditions.as_mut() {
                current.observed_generation = condition.observed_generation;
                current.reason = condition.reason;
            }
        } else {
            self.conditions = Some(condition);
        }
    }

    /// Current condition.
    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.conditions.as_ref()
    }

    /// Whether the current condition reports acceptance.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.conditions.as_ref().is_some_and(Condition::is_accepted)
    }
}

mod single_condition {
    use super::Condition;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Condition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Condition>, D::Error> {
        let mut list: Vec<Condition> = Vec::deserialize(deserializer)?;
        Ok(list.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn test_only_most_recent_condition_kept() {
        let mut status = ResourceStatus::default();
        status.set_condition(Condition::accepted(1, "ok", at(0)));
        assert!(status.is_accepted());

        let errors = ValidationErrors::from(ValidationError::invalid("spec", "broken"));
        status.set_condition(Condition::not_accepted(2, &errors, at(1)));
        let condition = status.condition().unwrap();
        assert_eq!(condition.condition_type, ConditionType::NotAccepted);
        assert_eq!(condition.reason, "InvalidSpec");
        assert_eq!(condition.message, "spec: broken");
        assert!(!status.is_accepted());
    }

    #[test]
    fn test_unchanged_condition_keeps_transition_time() {
        let mut status = ResourceStatus::default();
        status.set_condition(Condition::accepted(1, "ok", at(0)));
        status.set_condition(Condition::accepted(2, "ok", at(5)));
        let condition = status.condition().unwrap();
        assert_eq!(condition.last_transition_time, at(0));
        assert_eq!(condition.observed_generation, 2);
    }

    #[test]
    fn test_serialized_as_list_keeping_last() {
        let mut status = ResourceStatus::default();
        status.set_condition(Condition::accepted(1, "ok", at(0)));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["conditions"].as_array().unwrap().len(), 1);
        assert_eq!(json["conditions"][0]["type"], "Accepted");

        let parsed: ResourceStatus = serde_json::from_value(serde_json::json!({
            "conditions": [
                {"type": "Accepted", "reason": "Accepted", "message": "old",
                 "observedGeneration": 1, "lastTransitionTime": "2024-01-01T00:00:00Z"},
                {"type": "NotAccepted", "reason": "InvalidSpec", "message": "new",
                 "observedGeneration": 2, "lastTransitionTime": "2024-01-01T00:01:00Z"}
            ]
        }))
        .unwrap();
        assert_eq!(parsed.condition().unwrap().message, "new");
    }
}
