//! # Gateway Core
//!
//! Core object model and error taxonomy for the AI gateway control plane.
//!
//! This crate provides the foundational types used throughout the workspace:
//! - The API schema registry and route/backend schema pairing rules
//! - Object metadata and cross-object references
//! - Gateway-API style durations
//! - Status conditions (only the most recent is retained)
//! - Validation errors grouped by category

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod duration;
pub mod error;
pub mod schema;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use duration::GatewayDuration;
pub use error::{ErrorCategory, ValidationError, ValidationErrors, ValidationResult};
pub use schema::{ApiSchema, ApiSchemaName, SchemaRegistry, VersionedApiSchema};
pub use status::{Condition, ConditionType, ResourceStatus};
pub use types::{
    LocalObjectReference, ObjectKey, ObjectMeta, SecretObjectReference, AI_MODEL_HEADER_KEY,
    API_VERSION, DEFAULT_NAMESPACE, SELECTED_ROUTE_HEADER_KEY,
};
