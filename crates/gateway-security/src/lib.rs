//! # Gateway Security
//!
//! Backend security policies for the AI gateway control plane.
//!
//! A policy tells the data plane how to authenticate upstream requests to
//! one or more backends. Exactly one credential mechanism is configured per
//! policy; in memory that is a sum type, on the wire it is a `type` tag plus
//! the matching variant field:
//!
//! - static API keys (generic, Azure, Anthropic)
//! - AWS credentials file or OIDC web-identity exchange
//! - Azure client secret or OIDC federated token
//! - GCP service-account key or Workload Identity Federation with optional
//!   service-account impersonation
//!
//! Credential minting and rotation are performed elsewhere; this crate only
//! models and checks the declarations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod policy;
pub mod wire;

pub use policy::{
    ApiKeyCredentials, AwsCredentialSource, AwsCredentials, AwsCredentialsFile, AwsOidcExchange,
    AzureCredentialSource, AzureCredentials, BackendCredentials, BackendSecurityPolicy,
    GcpCredentialSource, GcpCredentials, GcpCredentialsFile, GcpWorkloadIdentityFederation,
    OidcConfig, OidcExchangeToken, OidcProvider, PolicyTargetRef, PolicyType,
    SecurityPolicySpec, ServiceAccountImpersonation, SECURITY_POLICY_KIND,
};
pub use wire::SecurityPolicySpecWire;
