//! # Gateway Config
//!
//! Configuration loading, validation and publication for the AI Gateway
//! control plane.
//!
//! This crate provides:
//! - Loading of declarative documents from YAML/JSON files and directories
//! - Immutable snapshots published through an atomic store
//! - Validation of routes, backends and security policies
//! - Default merging into effective routes and backends
//! - Gateway attachment, generated artifact names and filter compilation
//! - Last-known-good tracking of accepted routes
//! - Controller settings with environment overrides

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accepted;
pub mod artifacts;
pub mod effective;
pub mod error;
pub mod filter;
pub mod loader;
pub mod settings;
pub mod snapshot;
pub mod validation;

// Re-export main types
pub use accepted::AcceptedRoutes;
pub use artifacts::{
    extension_policy_name, http_route_name, GatewayAttachment, IgnoredEntry,
    EXTENSION_POLICY_PREFIX, HOST_REWRITE_FILTER_NAME,
};
pub use effective::{EffectiveBackend, EffectiveRoute, EffectiveRule};
pub use error::{ConfigError, ConfigResult};
pub use filter::{compile_filter_config, FilterBackend, FilterDocument, FilterRule};
pub use loader::{load_snapshot, DocumentFormat, SnapshotBuilder};
pub use settings::{ControllerSettings, ExpressionSettings, LogSettings, ENV_PREFIX};
pub use snapshot::{ConfigSnapshot, InferencePool, RejectedObject, SnapshotStore};
pub use validation::{CrossNamespaceRef, RouteValidator, SnapshotReport, ValidationReport};
