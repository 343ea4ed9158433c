//! Route rules: request matching, backend references, timeouts and the
//! model metadata advertised on the models endpoint.

use chrono::{DateTime, Utc};
use gateway_core::{GatewayDuration, ValidationError, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use validator::Validate;

use crate::backend_ref::{BackendKind, RouteBackendRef};

/// Maximum header predicates within one match.
pub const MAX_HEADERS_PER_MATCH: usize = 16;

/// Request timeout applied when a rule does not declare one.
pub const DEFAULT_REQUEST_TIMEOUT: &str = "60s";

/// Owner reported for models when a rule does not declare one.
pub const DEFAULT_MODELS_OWNED_BY: &str = "Envoy AI Gateway";

/// How a header value is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderMatchType {
    /// Exact string comparison.
    #[default]
    Exact,
    /// Regular expression; accepted by the parser, rejected by validation.
    RegularExpression,
}

/// Header predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    /// Comparison type.
    #[serde(rename = "type", default)]
    pub match_type: HeaderMatchType,
    /// Header name, compared case-insensitively.
    pub name: String,
    /// Expected value.
    pub value: String,
}

impl HeaderMatch {
    /// Exact match on a header.
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            match_type: HeaderMatchType::Exact,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Conjunction of header predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRuleMatch {
    /// Predicates; all must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatch>,
}

impl RouteRuleMatch {
    /// Match requiring all of the given exact header values.
    pub fn headers(headers: impl IntoIterator<Item = HeaderMatch>) -> Self {
        Self {
            headers: headers.into_iter().collect(),
        }
    }

    /// Check predicate count, names and match types.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.headers.len() > MAX_HEADERS_PER_MATCH {
            errors.push(ValidationError::cardinality(
                "headers",
                0,
                MAX_HEADERS_PER_MATCH,
                self.headers.len(),
            ));
        }
        for (i, header) in self.headers.iter().enumerate() {
            if header.name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!("headers[{i}].name"),
                    "must not be empty",
                ));
            }
            if header.match_type != HeaderMatchType::Exact {
                errors.push(ValidationError::invalid(
                    format!("headers[{i}].type"),
                    "only Exact header matches are supported",
                ));
            }
        }
        errors
    }

    /// Whether every predicate holds for the request headers.
    pub fn matches<K: AsRef<str>, V: AsRef<str>>(&self, request_headers: &[(K, V)]) -> bool {
        self.headers.iter().all(|predicate| {
            request_headers.iter().any(|(name, value)| {
                name.as_ref().eq_ignore_ascii_case(&predicate.name)
                    && value.as_ref() == predicate.value
            })
        })
    }
}

/// Timeouts of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteTimeouts {
    /// End-to-end request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<GatewayDuration>,
    /// Timeout of each upstream attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_request: Option<GatewayDuration>,
}

/// A route rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    /// Backends traffic is sent to.
    #[serde(default)]
    #[validate(length(max = 128, message = "must contain at most 128 backend references"))]
    pub backend_refs: Vec<RouteBackendRef>,
    /// Alternatives; the rule applies when any match holds, or always when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(length(max = 128, message = "must contain at most 128 matches"))]
    pub matches: Vec<RouteRuleMatch>,
    /// Timeout overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<HttpRouteTimeouts>,
    /// Owner reported for the rule's models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_owned_by: Option<String>,
    /// Creation time reported for the rule's models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_created_at: Option<DateTime<Utc>>,
}

impl RouteRule {
    /// Rule forwarding to the given backends.
    pub fn new(backend_refs: impl IntoIterator<Item = RouteBackendRef>) -> Self {
        Self {
            backend_refs: backend_refs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a match.
    #[must_use]
    pub fn with_match(mut self, m: RouteRuleMatch) -> Self {
        self.matches.push(m);
        self
    }

    /// Match requests whose model header equals `model`.
    #[must_use]
    pub fn for_model(self, model: impl Into<String>) -> Self {
        self.with_match(RouteRuleMatch::headers([HeaderMatch::exact(
            gateway_core::AI_MODEL_HEADER_KEY,
            model,
        )]))
    }

    /// Set timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: HttpRouteTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Timeouts with the default request timeout filled in.
    ///
    /// Borrows the declared timeouts when they already carry a request
    /// timeout; otherwise returns a copy. The rule itself is never modified.
    #[must_use]
    pub fn effective_timeouts(&self) -> Cow<'_, HttpRouteTimeouts> {
        match &self.timeouts {
            Some(timeouts) if timeouts.request.is_some() => Cow::Borrowed(timeouts),
            Some(timeouts) => Cow::Owned(HttpRouteTimeouts {
                request: Some(GatewayDuration::new(DEFAULT_REQUEST_TIMEOUT)),
                ..timeouts.clone()
            }),
            None => Cow::Owned(HttpRouteTimeouts {
                request: Some(GatewayDuration::new(DEFAULT_REQUEST_TIMEOUT)),
                backend_request: None,
            }),
        }
    }

    /// Effective request timeout as a standard duration.
    pub fn request_timeout(&self) -> Result<Duration, ValidationError> {
        self.effective_timeouts()
            .request
            .as_ref()
            .map_or(Ok(Duration::from_secs(60)), GatewayDuration::to_std)
    }

    /// Owner reported for the rule's models.
    #[must_use]
    pub fn models_owned_by(&self) -> &str {
        self.models_owned_by
            .as_deref()
            .filter(|owner| !owner.is_empty())
            .unwrap_or(DEFAULT_MODELS_OWNED_BY)
    }

    /// Creation time reported for the rule's models, defaulting to the
    /// route's creation time.
    #[must_use]
    pub fn models_created_at(&self, route_created_at: DateTime<Utc>) -> DateTime<Utc> {
        self.models_created_at.unwrap_or(route_created_at)
    }

    /// Whether the rule applies to a request.
    pub fn matches_request<K: AsRef<str>, V: AsRef<str>>(&self, request_headers: &[(K, V)]) -> bool {
        self.matches.is_empty() || self.matches.iter().any(|m| m.matches(request_headers))
    }

    /// Kind shared by all references, checking homogeneity and pool
    /// cardinality. `None` when the rule has no references.
    pub fn backend_kind(&self) -> Result<Option<BackendKind>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut kinds = Vec::with_capacity(self.backend_refs.len());
        for (i, backend_ref) in self.backend_refs.iter().enumerate() {
            match backend_ref.validate() {
                Ok(kind) => kinds.push(kind),
                Err(errs) => errors.extend(errs.into_iter().map(|e| e.at(&format!("backendRefs[{i}]")))),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let pools = kinds
            .iter()
            .filter(|k| **k == BackendKind::InferencePool)
            .count();
        if pools > 0 && pools < kinds.len() {
            errors.push(ValidationError::exclusivity(
                "backendRefs",
                "cannot mix InferencePool and AIServiceBackend references in the same rule",
            ));
        } else if pools > 1 {
            errors.push(ValidationError::exclusivity(
                "backendRefs",
                format!("only one InferencePool backend is allowed per rule, got {pools}"),
            ));
        }
        errors.into_result(kinds.first().copied())
    }

    /// Structural checks of the rule in isolation.
    pub fn validate_structure(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if let Err(e) = Validate::validate(self) {
            errors.extend(ValidationErrors::from_validator(&e));
        }
        if let Err(e) = self.backend_kind() {
            errors.extend(e);
        }
        for (i, m) in self.matches.iter().enumerate() {
            errors.extend(m.validate().into_iter().map(|e| e.at(&format!("matches[{i}]"))));
        }
        if let Some(timeouts) = &self.timeouts {
            for (name, value) in [
                ("timeouts.request", &timeouts.request),
                ("timeouts.backendRequest", &timeouts.backend_request),
            ] {
                if let Some(Err(e)) = value.as_ref().map(GatewayDuration::to_std) {
                    errors.push(e.at(name));
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_effective_timeouts_default() {
        let rule = RouteRule::new([RouteBackendRef::service("a")]);
        let timeouts = rule.effective_timeouts();
        assert!(matches!(timeouts, Cow::Owned(_)));
        assert_eq!(timeouts.request, Some(GatewayDuration::new("60s")));
        assert_eq!(timeouts.backend_request, None);
        assert!(rule.timeouts.is_none());
        assert_eq!(rule.request_timeout().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_effective_timeouts_fills_request_only() {
        let rule = RouteRule::new([RouteBackendRef::service("a")]).with_timeouts(HttpRouteTimeouts {
            request: None,
            backend_request: Some(GatewayDuration::new("10s")),
        });
        let timeouts = rule.effective_timeouts();
        assert_eq!(timeouts.request, Some(GatewayDuration::new("60s")));
        assert_eq!(timeouts.backend_request, Some(GatewayDuration::new("10s")));
        assert_eq!(rule.timeouts.as_ref().unwrap().request, None);
    }

    #[test]
    fn test_effective_timeouts_keeps_declared() {
        let declared = HttpRouteTimeouts {
            request: Some(GatewayDuration::new("5m")),
            backend_request: None,
        };
        let rule = RouteRule::new([RouteBackendRef::service("a")]).with_timeouts(declared.clone());
        let timeouts = rule.effective_timeouts();
        assert!(matches!(timeouts, Cow::Borrowed(_)));
        assert_eq!(*timeouts, declared);
        assert_eq!(rule.request_timeout().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_model_metadata_defaults() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut rule = RouteRule::new([RouteBackendRef::service("a")]);
        assert_eq!(rule.models_owned_by(), "Envoy AI Gateway");
        assert_eq!(rule.models_created_at(created), created);

        let declared = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        rule.models_owned_by = Some("Meta".to_string());
        rule.models_created_at = Some(declared);
        assert_eq!(rule.models_owned_by(), "Meta");
        assert_eq!(rule.models_created_at(created), declared);
    }

    #[test]
    fn test_matching() {
        let rule = RouteRule::new([RouteBackendRef::service("a")])
            .for_model("gpt-4o")
            .with_match(RouteRuleMatch::headers([
                HeaderMatch::exact("x-ai-eg-model", "gpt-4o-mini"),
                HeaderMatch::exact("x-tenant", "blue"),
            ]));
        assert!(rule.matches_request(&[("X-AI-EG-Model", "gpt-4o")]));
        assert!(!rule.matches_request(&[("x-ai-eg-model", "gpt-4o-mini")]));
        assert!(rule.matches_request(&[("x-ai-eg-model", "gpt-4o-mini"), ("x-tenant", "blue")]));
        assert!(!rule.matches_request(&[("x-ai-eg-model", "GPT-4O")]));

        let catch_all = RouteRule::new([RouteBackendRef::service("a")]);
        assert!(catch_all.matches_request::<&str, &str>(&[]));
    }

    #[test]
    fn test_header_limits_and_regex_rejected() {
        let sixteen = RouteRuleMatch::headers(
            (0..16).map(|i| HeaderMatch::exact(format!("h{i}"), "v")),
        );
        assert!(sixteen.validate().is_empty());

        let seventeen = RouteRuleMatch::headers(
            (0..17).map(|i| HeaderMatch::exact(format!("h{i}"), "v")),
        );
        assert!(matches!(
            seventeen.validate()[0],
            ValidationError::Cardinality { actual: 17, .. }
        ));

        let regex = RouteRuleMatch::headers([HeaderMatch {
            match_type: HeaderMatchType::RegularExpression,
            name: "x-ai-eg-model".to_string(),
            value: "gpt-.*".to_string(),
        }]);
        assert_eq!(regex.validate()[0].field(), "headers[0].type");
    }

    #[test]
    fn test_backend_kind_homogeneity() {
        let service = RouteRule::new([RouteBackendRef::service("a"), RouteBackendRef::service("b")]);
        assert_eq!(service.backend_kind().unwrap(), Some(BackendKind::Service));

        let pool = RouteRule::new([RouteBackendRef::inference_pool("p")]);
        assert_eq!(pool.backend_kind().unwrap(), Some(BackendKind::InferencePool));

        let mixed = RouteRule::new([
            RouteBackendRef::service("a"),
            RouteBackendRef::inference_pool("p"),
        ]);
        assert!(mixed.backend_kind().unwrap_err().to_string().contains("cannot mix"));

        let two_pools = RouteRule::new([
            RouteBackendRef::inference_pool("p"),
            RouteBackendRef::inference_pool("q"),
        ]);
        assert!(two_pools
            .backend_kind()
            .unwrap_err()
            .to_string()
            .contains("only one InferencePool"));

        assert_eq!(RouteRule::default().backend_kind().unwrap(), None);
    }

    #[test]
    fn test_validate_structure() {
        let rule = RouteRule::new([RouteBackendRef::service("a").with_weight(-2)]).with_timeouts(
            HttpRouteTimeouts {
                request: Some(GatewayDuration::new("forever")),
                backend_request: None,
            },
        );
        let errors = rule.validate_structure();
        let fields: Vec<_> = errors.iter().map(ValidationError::field).collect();
        assert_eq!(fields, vec!["backendRefs[0].weight", "timeouts.request"]);

        let too_many = RouteRule::new((0..129).map(|i| RouteBackendRef::service(format!("b{i}"))));
        assert!(too_many
            .validate_structure()
            .to_string()
            .contains("at most 128 backend references"));
    }

    #[test]
    fn test_wire_shape() {
        let rule: RouteRule = serde_yaml::from_str(
            r"
matches:
  - headers:
      - name: x-ai-eg-model
        value: llama-3
backendRefs:
  - name: vllm
    weight: 3
timeouts:
  backendRequest: 30s
modelsOwnedBy: Meta
modelsCreatedAt: 2024-05-01T00:00:00Z
",
        )
        .unwrap();
        assert_eq!(rule.matches[0].headers[0].match_type, HeaderMatchType::Exact);
        assert_eq!(rule.backend_refs[0].effective_weight(), 3);
        assert_eq!(rule.models_owned_by(), "Meta");
        assert_eq!(
            rule.effective_timeouts().backend_request,
            Some(GatewayDuration::new("30s"))
        );
    }
}
