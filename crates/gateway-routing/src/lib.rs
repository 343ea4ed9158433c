//! # Gateway Routing
//!
//! Declarative routing model for the AI Gateway.
//!
//! This crate provides:
//! - `AIGatewayRoute` documents with ordered, header-matched rules
//! - `AIServiceBackend` documents with upstream schema and header mutation
//! - Backend reference classification (service vs. inference pool)
//! - Weighted, priority-tiered backend selection

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod backend_ref;
pub mod route;
pub mod rules;
pub mod selector;

// Re-export main types
pub use backend::{
    AiServiceBackend, BackendObjectReference, BackendSpec, HeaderMutation, HttpHeader,
    BACKEND_KIND, MAX_HEADER_MUTATIONS,
};
pub use backend_ref::{
    BackendKind, RouteBackendRef, DEFAULT_PRIORITY, DEFAULT_WEIGHT, INFERENCE_POOL_GROUP,
    INFERENCE_POOL_KIND,
};
pub use route::{
    AiGatewayRoute, ExternalProcessorConfig, FilterConfig, FilterConfigType, GatewayTargetRef,
    ResourceRequirements, RouteSpec, ROUTE_KIND,
};
pub use rules::{
    HeaderMatch, HeaderMatchType, HttpRouteTimeouts, RouteRule, RouteRuleMatch,
    DEFAULT_MODELS_OWNED_BY, DEFAULT_REQUEST_TIMEOUT, MAX_HEADERS_PER_MATCH,
};
pub use selector::{PriorityTier, RuleTarget, WeightedEntry, WeightedSelector};
