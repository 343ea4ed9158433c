//! # Gateway Telemetry
//!
//! Request cost accounting and observability for the AI gateway control plane.
//!
//! This crate provides:
//! - Cost declarations and per-request cost computation
//! - A sandboxed expression evaluator for custom cost formulas
//! - Prometheus metrics for validation and cost outcomes
//! - Structured logging setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod expression;
pub mod logging;
pub mod metrics;

// Re-export main types
pub use cost::{
    validate_cost_declarations, CostCalculator, CostContext, CostDeclaration,
    CostEvaluationError, CostType, RequestCosts, MAX_COSTS_PER_ROUTE, METADATA_NAMESPACE,
};
pub use expression::{
    CostExpressionEvaluator, ExpressionValue, RhaiCostEvaluator, RhaiEvaluatorConfig,
};
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::Metrics;
