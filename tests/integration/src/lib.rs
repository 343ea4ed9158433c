//! Integration tests for the AI Gateway control plane
//!
//! This crate provides integration tests covering:
//! - Loading, validating and publishing configuration directories
//! - Weighted and priority backend selection
//! - Security policy attachment
//! - Request cost declarations and computation
//! - End-to-end filter compilation with last-known-good routes

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;

#[cfg(test)]
mod cost_tests;
#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod routing_tests;
#[cfg(test)]
mod security_tests;
