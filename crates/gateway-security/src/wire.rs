//! Wire form of security policies and its checked conversion.
//!
//! Documents carry a `type` tag and one optional field per mechanism. The
//! conversion into [`SecurityPolicySpec`] enforces that exactly the field
//! named by the tag is set, and that each mechanism sets exactly one of its
//! credential sources.

use gateway_core::{SecretObjectReference, ValidationError, ValidationErrors};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::policy::{
    ApiKeyCredentials, AwsCredentialSource, AwsCredentials, AwsCredentialsFile, AwsOidcExchange,
    AzureCredentialSource, AzureCredentials, BackendCredentials, GcpCredentialSource,
    GcpCredentials, GcpCredentialsFile, GcpWorkloadIdentityFederation, OidcExchangeToken,
    PolicyTargetRef, PolicyType, SecurityPolicySpec,
};

/// Security policy spec as written in documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicySpecWire {
    /// Targeted backends.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_refs: Vec<PolicyTargetRef>,
    /// Mechanism tag.
    #[serde(rename = "type")]
    pub policy_type: String,
    /// `APIKey` settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKeyCredentials>,
    /// `AzureAPIKey` settings.
    #[serde(rename = "azureAPIKey", default, skip_serializing_if = "Option::is_none")]
    pub azure_api_key: Option<ApiKeyCredentials>,
    /// `AnthropicAPIKey` settings.
    #[serde(rename = "anthropicAPIKey", default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<ApiKeyCredentials>,
    /// `AWSCredentials` settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_credentials: Option<AwsCredentialsWire>,
    /// `AzureCredentials` settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_credentials: Option<AzureCredentialsWire>,
    /// `GCPCredentials` settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_credentials: Option<GcpCredentialsWire>,
}

/// AWS settings as written in documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentialsWire {
    /// Region.
    #[validate(length(min = 1, message = "region must not be empty"))]
    pub region: String,
    /// Credentials file source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<AwsCredentialsFile>,
    /// OIDC exchange source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_exchange_token: Option<AwsOidcExchange>,
}

/// Azure settings as written in documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AzureCredentialsWire {
    /// Client ID.
    #[serde(rename = "clientID")]
    #[validate(length(min = 1, message = "clientID must not be empty"))]
    pub client_id: String,
    /// Tenant ID.
    #[serde(rename = "tenantID")]
    #[validate(length(min = 1, message = "tenantID must not be empty"))]
    pub tenant_id: String,
    /// Client secret source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_ref: Option<SecretObjectReference>,
    /// OIDC exchange source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_exchange_token: Option<OidcExchangeToken>,
}

/// GCP settings as written in documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GcpCredentialsWire {
    /// Project name.
    #[validate(length(min = 1, message = "projectName must not be empty"))]
    pub project_name: String,
    /// Region.
    #[validate(length(min = 1, message = "region must not be empty"))]
    pub region: String,
    /// Key file source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<GcpCredentialsFile>,
    /// Workload Identity Federation source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_identity_federation_config: Option<GcpWorkloadIdentityFederation>,
}

impl SecurityPolicySpecWire {
    /// Wire names of the mechanism fields that are set.
    fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.api_key.is_some() {
            fields.push(PolicyType::ApiKey.field_name());
        }
        if self.azure_api_key.is_some() {
            fields.push(PolicyType::AzureApiKey.field_name());
        }
        if self.anthropic_api_key.is_some() {
            fields.push(PolicyType::AnthropicApiKey.field_name());
        }
        if self.aws_credentials.is_some() {
            fields.push(PolicyType::AwsCredentials.field_name());
        }
        if self.azure_credentials.is_some() {
            fields.push(PolicyType::AzureCredentials.field_name());
        }
        if self.gcp_credentials.is_some() {
            fields.push(PolicyType::GcpCredentials.field_name());
        }
        fields
    }
}

enum OneOf<A, B> {
    First(A),
    Second(B),
}

fn check_validate<T: Validate>(value: &T, prefix: &str, errors: &mut ValidationErrors) {
    if let Err(e) = value.validate() {
        errors.extend(ValidationErrors::from_validator(&e).at(prefix));
    }
}

fn exactly_one<A, B>(
    field: &str,
    a: Option<A>,
    a_name: &str,
    b: Option<B>,
    b_name: &str,
) -> Result<OneOf<A, B>, ValidationError> {
    match (a, b) {
        (Some(a), None) => Ok(OneOf::First(a)),
        (None, Some(b)) => Ok(OneOf::Second(b)),
        (Some(_), Some(_)) => Err(ValidationError::exclusivity(
            field,
            format!("only one of {a_name} or {b_name} may be set"),
        )),
        (None, None) => Err(ValidationError::exclusivity(
            field,
            format!("exactly one of {a_name} or {b_name} must be set"),
        )),
    }
}

fn convert_aws(wire: AwsCredentialsWire, errors: &mut ValidationErrors) -> Option<AwsCredentials> {
    const FIELD: &str = "spec.awsCredentials";
    check_validate(&wire, FIELD, errors);
    if let Some(oidc) = &wire.oidc_exchange_token {
        check_validate(oidc, &format!("{FIELD}.oidcExchangeToken"), errors);
    }
    let source = match exactly_one(
        FIELD,
        wire.credentials_file,
        "credentialsFile",
        wire.oidc_exchange_token,
        "oidcExchangeToken",
    ) {
        Ok(OneOf::First(file)) => AwsCredentialSource::CredentialsFile(file),
        Ok(OneOf::Second(oidc)) => AwsCredentialSource::OidcExchange(oidc),
        Err(e) => {
            errors.push(e);
            return None;
        }
    };
    Some(AwsCredentials {
        region: wire.region,
        source,
    })
}

fn convert_azure(
    wire: AzureCredentialsWire,
    errors: &mut ValidationErrors,
) -> Option<AzureCredentials> {
    const FIELD: &str = "spec.azureCredentials";
    check_validate(&wire, FIELD, errors);
    let source = match exactly_one(
        FIELD,
        wire.client_secret_ref,
        "clientSecretRef",
        wire.oidc_exchange_token,
        "oidcExchangeToken",
    ) {
        Ok(OneOf::First(secret)) => AzureCredentialSource::ClientSecret(secret),
        Ok(OneOf::Second(oidc)) => AzureCredentialSource::OidcExchange(oidc),
        Err(e) => {
            errors.push(e);
            return None;
        }
    };
    Some(AzureCredentials {
        client_id: wire.client_id,
        tenant_id: wire.tenant_id,
        source,
    })
}

fn convert_gcp(wire: GcpCredentialsWire, errors: &mut ValidationErrors) -> Option<GcpCredentials> {
    const FIELD: &str = "spec.gcpCredentials";
    check_validate(&wire, FIELD, errors);
    if let Some(wif) = &wire.workload_identity_federation_config {
        check_validate(
            wif,
            &format!("{FIELD}.workloadIdentityFederationConfig"),
            errors,
        );
        if let Some(sa) = &wif.service_account_impersonation {
            if sa.service_account_name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!(
                        "{FIELD}.workloadIdentityFederationConfig.serviceAccountImpersonation.serviceAccountName"
                    ),
                    "must not be empty",
                ));
            }
        }
    }
    let source = match exactly_one(
        FIELD,
        wire.credentials_file,
        "credentialsFile",
        wire.workload_identity_federation_config,
        "workloadIdentityFederationConfig",
    ) {
        Ok(OneOf::First(file)) => GcpCredentialSource::CredentialsFile(file),
        Ok(OneOf::Second(wif)) => GcpCredentialSource::WorkloadIdentityFederation(wif),
        Err(e) => {
            errors.push(e);
            return None;
        }
    };
    Some(GcpCredentials {
        project_name: wire.project_name,
        region: wire.region,
        source,
    })
}

impl TryFrom<SecurityPolicySpecWire> for SecurityPolicySpec {
    type Error = ValidationErrors;

    fn try_from(wire: SecurityPolicySpecWire) -> Result<Self, Self::Error> {
        let mut errors = ValidationErrors::new();

        for (i, target) in wire.target_refs.iter().enumerate() {
            if target.name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!("spec.targetRefs[{i}].name"),
                    "must not be empty",
                ));
            }
        }

        let policy_type: PolicyType = match wire.policy_type.parse() {
            Ok(t) => t,
            Err(name) => {
                errors.push(ValidationError::invalid(
                    "spec.type",
                    format!("unknown security policy type {name:?}"),
                ));
                return Err(errors);
            }
        };

        let present = wire.present_fields();
        let expected = policy_type.field_name();
        for field in present.iter().filter(|f| **f != expected) {
            errors.push(ValidationError::exclusivity(
                format!("spec.{field}"),
                format!("must not be set when type is {policy_type}"),
            ));
        }
        if !present.contains(&expected) {
            errors.push(ValidationError::exclusivity(
                format!("spec.{expected}"),
                format!("must be set when type is {policy_type}"),
            ));
            return Err(errors);
        }

        let credentials = match policy_type {
            PolicyType::ApiKey => wire.api_key.map(BackendCredentials::ApiKey),
            PolicyType::AzureApiKey => wire.azure_api_key.map(BackendCredentials::AzureApiKey),
            PolicyType::AnthropicApiKey => {
                wire.anthropic_api_key.map(BackendCredentials::AnthropicApiKey)
            }
            PolicyType::AwsCredentials => wire
                .aws_credentials
                .and_then(|aws| convert_aws(aws, &mut errors))
                .map(BackendCredentials::Aws),
            PolicyType::AzureCredentials => wire
                .azure_credentials
                .and_then(|azure| convert_azure(azure, &mut errors))
                .map(BackendCredentials::Azure),
            PolicyType::GcpCredentials => wire
                .gcp_credentials
                .and_then(|gcp| convert_gcp(gcp, &mut errors))
                .map(BackendCredentials::Gcp),
        };

        if let Some(BackendCredentials::ApiKey(key)
        | BackendCredentials::AzureApiKey(key)
        | BackendCredentials::AnthropicApiKey(key)) = &credentials
        {
            if key.secret_ref.name.is_empty() {
                errors.push(ValidationError::invalid(
                    format!("spec.{expected}.secretRef.name"),
                    "must not be empty",
                ));
            }
        }

        match credentials {
            Some(credentials) if errors.is_empty() => Ok(Self {
                target_refs: wire.target_refs,
                credentials,
            }),
            _ => Err(errors),
        }
    }
}

impl From<SecurityPolicySpec> for SecurityPolicySpecWire {
    fn from(spec: SecurityPolicySpec) -> Self {
        let mut wire = Self {
            target_refs: spec.target_refs,
            policy_type: spec.credentials.policy_type().as_str().to_string(),
            ..Self::default()
        };
        match spec.credentials {
            BackendCredentials::ApiKey(key) => wire.api_key = Some(key),
            BackendCredentials::AzureApiKey(key) => wire.azure_api_key = Some(key),
            BackendCredentials::AnthropicApiKey(key) => wire.anthropic_api_key = Some(key),
            BackendCredentials::Aws(aws) => {
                let (credentials_file, oidc_exchange_token) = match aws.source {
                    AwsCredentialSource::CredentialsFile(file) => (Some(file), None),
                    AwsCredentialSource::OidcExchange(oidc) => (None, Some(oidc)),
                };
                wire.aws_credentials = Some(AwsCredentialsWire {
                    region: aws.region,
                    credentials_file,
                    oidc_exchange_token,
                });
            }
            BackendCredentials::Azure(azure) => {
                let (client_secret_ref, oidc_exchange_token) = match azure.source {
                    AzureCredentialSource::ClientSecret(secret) => (Some(secret), None),
                    AzureCredentialSource::OidcExchange(oidc) => (None, Some(oidc)),
                };
                wire.azure_credentials = Some(AzureCredentialsWire {
                    client_id: azure.client_id,
                    tenant_id: azure.tenant_id,
                    client_secret_ref,
                    oidc_exchange_token,
                });
            }
            BackendCredentials::Gcp(gcp) => {
                let (credentials_file, workload_identity_federation_config) = match gcp.source {
                    GcpCredentialSource::CredentialsFile(file) => (Some(file), None),
                    GcpCredentialSource::WorkloadIdentityFederation(wif) => (None, Some(wif)),
                };
                wire.gcp_credentials = Some(GcpCredentialsWire {
                    project_name: gcp.project_name,
                    region: gcp.region,
                    credentials_file,
                    workload_identity_federation_config,
                });
            }
        }
        wire
    }
}
