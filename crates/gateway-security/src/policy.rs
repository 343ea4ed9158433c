//! Typed security policy model.

use gateway_core::{ObjectMeta, ResourceStatus, SecretObjectReference};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::wire::SecurityPolicySpecWire;

/// Document kind of a security policy.
pub const SECURITY_POLICY_KIND: &str = "BackendSecurityPolicy";

/// Security policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSecurityPolicy {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Policy spec.
    pub spec: SecurityPolicySpec,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ResourceStatus,
}

impl BackendSecurityPolicy {
    /// Create a policy.
    pub fn new(metadata: ObjectMeta, spec: SecurityPolicySpec) -> Self {
        Self {
            metadata,
            spec,
            status: ResourceStatus::default(),
        }
    }

    /// Whether the policy lists the backend among its targets.
    #[must_use]
    pub fn targets(&self, backend_name: &str) -> bool {
        self.spec
            .target_refs
            .iter()
            .any(|target| target.name == backend_name)
    }
}

/// Policy spec: attachment targets plus exactly one credential mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SecurityPolicySpecWire", into = "SecurityPolicySpecWire")]
pub struct SecurityPolicySpec {
    /// Backends (same namespace) this policy applies to.
    pub target_refs: Vec<PolicyTargetRef>,
    /// Credential mechanism.
    pub credentials: BackendCredentials,
}

impl SecurityPolicySpec {
    /// Create a spec without explicit targets.
    #[must_use]
    pub fn new(credentials: BackendCredentials) -> Self {
        Self {
            target_refs: Vec::new(),
            credentials,
        }
    }

    /// Add a backend target.
    #[must_use]
    pub fn with_target(mut self, backend_name: impl Into<String>) -> Self {
        self.target_refs.push(PolicyTargetRef::backend(backend_name));
        self
    }
}

/// Reference to a backend targeted by a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetRef {
    /// API group of the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Kind of the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Target name.
    pub name: String,
}

impl PolicyTargetRef {
    /// Target a backend by name.
    pub fn backend(name: impl Into<String>) -> Self {
        Self {
            group: Some("aigateway.envoyproxy.io".to_string()),
            kind: Some("AIServiceBackend".to_string()),
            name: name.into(),
        }
    }
}

/// Wire tag of a credential mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyType {
    /// Static API key sent as a bearer token.
    ApiKey,
    /// AWS SigV4 signing.
    AwsCredentials,
    /// Azure OpenAI `api-key` header.
    AzureApiKey,
    /// Anthropic `x-api-key` header.
    AnthropicApiKey,
    /// Azure Entra ID access tokens.
    AzureCredentials,
    /// GCP access tokens.
    GcpCredentials,
}

impl PolicyType {
    /// All tags.
    pub const ALL: [Self; 6] = [
        Self::ApiKey,
        Self::AwsCredentials,
        Self::AzureApiKey,
        Self::AnthropicApiKey,
        Self::AzureCredentials,
        Self::GcpCredentials,
    ];

    /// Wire tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "APIKey",
            Self::AwsCredentials => "AWSCredentials",
            Self::AzureApiKey => "AzureAPIKey",
            Self::AnthropicApiKey => "AnthropicAPIKey",
            Self::AzureCredentials => "AzureCredentials",
            Self::GcpCredentials => "GCPCredentials",
        }
    }

    /// Wire name of the variant field carrying this mechanism.
    #[must_use]
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::ApiKey => "apiKey",
            Self::AwsCredentials => "awsCredentials",
            Self::AzureApiKey => "azureAPIKey",
            Self::AnthropicApiKey => "anthropicAPIKey",
            Self::AzureCredentials => "azureCredentials",
            Self::GcpCredentials => "gcpCredentials",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Credential mechanism of a policy; exactly one per policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCredentials {
    /// Static API key.
    ApiKey(ApiKeyCredentials),
    /// Azure OpenAI API key.
    AzureApiKey(ApiKeyCredentials),
    /// Anthropic API key.
    AnthropicApiKey(ApiKeyCredentials),
    /// AWS credentials.
    Aws(AwsCredentials),
    /// Azure Entra ID credentials.
    Azure(AzureCredentials),
    /// GCP credentials.
    Gcp(GcpCredentials),
}

impl BackendCredentials {
    /// Wire tag for this mechanism.
    #[must_use]
    pub fn policy_type(&self) -> PolicyType {
        match self {
            Self::ApiKey(_) => PolicyType::ApiKey,
            Self::AzureApiKey(_) => PolicyType::AzureApiKey,
            Self::AnthropicApiKey(_) => PolicyType::AnthropicApiKey,
            Self::Aws(_) => PolicyType::AwsCredentials,
            Self::Azure(_) => PolicyType::AzureCredentials,
            Self::Gcp(_) => PolicyType::GcpCredentials,
        }
    }

    /// Whether this mechanism yields GCP access tokens.
    #[must_use]
    pub fn is_gcp(&self) -> bool {
        matches!(self, Self::Gcp(_))
    }

    /// Secrets the data plane must be able to read.
    #[must_use]
    pub fn secret_refs(&self) -> Vec<&SecretObjectReference> {
        match self {
            Self::ApiKey(key) | Self::AzureApiKey(key) | Self::AnthropicApiKey(key) => {
                vec![&key.secret_ref]
            }
            Self::Aws(aws) => match &aws.source {
                AwsCredentialSource::CredentialsFile(file) => vec![&file.secret_ref],
                AwsCredentialSource::OidcExchange(oidc) => vec![&oidc.exchange.oidc.client_secret],
            },
            Self::Azure(azure) => match &azure.source {
                AzureCredentialSource::ClientSecret(secret) => vec![secret],
                AzureCredentialSource::OidcExchange(oidc) => vec![&oidc.oidc.client_secret],
            },
            Self::Gcp(gcp) => match &gcp.source {
                GcpCredentialSource::CredentialsFile(file) => vec![&file.secret_ref],
                GcpCredentialSource::WorkloadIdentityFederation(wif) => {
                    vec![&wif.oidc_exchange_token.oidc.client_secret]
                }
            },
        }
    }

    /// Short human-readable summary, e.g. `AWSCredentials(oidc, us-east-1)`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::ApiKey(key) | Self::AzureApiKey(key) | Self::AnthropicApiKey(key) => {
                format!("{}(secret {})", self.policy_type(), key.secret_ref.name)
            }
            Self::Aws(aws) => {
                let source = match &aws.source {
                    AwsCredentialSource::CredentialsFile(_) => "credentials-file",
                    AwsCredentialSource::OidcExchange(_) => "oidc",
                };
                format!("{}({source}, {})", self.policy_type(), aws.region)
            }
            Self::Azure(azure) => {
                let source = match &azure.source {
                    AzureCredentialSource::ClientSecret(_) => "client-secret",
                    AzureCredentialSource::OidcExchange(_) => "oidc",
                };
                format!("{}({source}, tenant {})", self.policy_type(), azure.tenant_id)
            }
            Self::Gcp(gcp) => {
                let source = match &gcp.source {
                    GcpCredentialSource::CredentialsFile(_) => "credentials-file".to_string(),
                    GcpCredentialSource::WorkloadIdentityFederation(wif) => {
                        match &wif.service_account_impersonation {
                            Some(sa) => format!("wif as {}", sa.service_account_name),
                            None => "wif".to_string(),
                        }
                    }
                };
                format!("{}({source}, {})", self.policy_type(), gcp.project_name)
            }
        }
    }
}

/// Secret holding a static API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyCredentials {
    /// Secret containing the key under `apiKey`.
    pub secret_ref: SecretObjectReference,
}

/// AWS credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    /// AWS region used for signing.
    pub region: String,
    /// Where credentials come from.
    pub source: AwsCredentialSource,
}

/// Source of AWS credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsCredentialSource {
    /// Shared credentials file stored in a secret.
    CredentialsFile(AwsCredentialsFile),
    /// OIDC token exchanged for temporary credentials via `AssumeRoleWithWebIdentity`.
    OidcExchange(AwsOidcExchange),
}

/// AWS shared credentials file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentialsFile {
    /// Secret containing the file under `credentials`.
    pub secret_ref: SecretObjectReference,
    /// Profile within the file.
    #[serde(default = "default_aws_profile")]
    pub profile: String,
}

fn default_aws_profile() -> String {
    "default".to_string()
}

/// OIDC exchange for an AWS role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AwsOidcExchange {
    /// OIDC token request.
    #[serde(flatten)]
    pub exchange: OidcExchangeToken,
    /// Role to assume with the exchanged token.
    #[validate(length(min = 1, message = "awsRoleArn must not be empty"))]
    pub aws_role_arn: String,
}

/// Azure Entra ID credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    /// Application (client) ID.
    pub client_id: String,
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Where the client assertion comes from.
    pub source: AzureCredentialSource,
}

/// Source of Azure credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AzureCredentialSource {
    /// Client secret stored in a secret.
    ClientSecret(SecretObjectReference),
    /// Federated OIDC token.
    OidcExchange(OidcExchangeToken),
}

/// GCP credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpCredentials {
    /// GCP project name.
    pub project_name: String,
    /// GCP region.
    pub region: String,
    /// Where credentials come from.
    pub source: GcpCredentialSource,
}

/// Source of GCP credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcpCredentialSource {
    /// Service account key file stored in a secret.
    CredentialsFile(GcpCredentialsFile),
    /// Workload Identity Federation.
    WorkloadIdentityFederation(GcpWorkloadIdentityFederation),
}

/// GCP service account key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpCredentialsFile {
    /// Secret containing the key under `service_account.json`.
    pub secret_ref: SecretObjectReference,
}

/// GCP Workload Identity Federation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GcpWorkloadIdentityFederation {
    /// Project hosting the workload identity pool.
    #[serde(rename = "projectID")]
    #[validate(length(min = 1, message = "projectID must not be empty"))]
    pub project_id: String,
    /// Identity provider within the pool.
    #[validate(length(min = 1, message = "workloadIdentityProviderName must not be empty"))]
    pub workload_identity_provider_name: String,
    /// OIDC token exchanged for a federated token.
    pub oidc_exchange_token: OidcExchangeToken,
    /// Workload identity pool.
    #[validate(length(min = 1, message = "workloadIdentityPoolName must not be empty"))]
    pub workload_identity_pool_name: String,
    /// Optional service account to impersonate with the federated token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_impersonation: Option<ServiceAccountImpersonation>,
}

/// Service account impersonation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountImpersonation {
    /// Service account name, without the domain part.
    pub service_account_name: String,
}

/// OIDC token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcExchangeToken {
    /// Identity provider configuration.
    pub oidc: OidcConfig,
    /// Grant type; client credentials when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    /// Audience of the requested token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// OIDC client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcConfig {
    /// Identity provider.
    pub provider: OidcProvider,
    /// Client ID.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Secret holding the client secret.
    pub client_secret: SecretObjectReference,
    /// Requested scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// OIDC identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcProvider {
    /// Issuer URL.
    pub issuer: String,
    /// Token endpoint; discovered from the issuer when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}
