//! API schema registry.
//!
//! A schema names the request/response dialect a client speaks (route input)
//! or a backend expects (backend output). The gateway translates from the
//! route input to each backend output; only the pairs listed here have
//! translators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Supported API schema names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiSchemaName {
    /// OpenAI-compatible chat/completions/embeddings API.
    #[serde(rename = "OpenAI")]
    OpenAi,
    /// AWS Bedrock runtime API.
    #[serde(rename = "AWSBedrock")]
    AwsBedrock,
    /// Azure OpenAI API.
    #[serde(rename = "AzureOpenAI")]
    AzureOpenAi,
    /// GCP Vertex AI generative API.
    #[serde(rename = "GCPVertexAI")]
    GcpVertexAi,
    /// Anthropic models served through GCP Vertex AI.
    #[serde(rename = "GCPAnthropic")]
    GcpAnthropic,
}

impl ApiSchemaName {
    /// All supported schemas.
    pub const ALL: [Self; 5] = [
        Self::OpenAi,
        Self::AwsBedrock,
        Self::AzureOpenAi,
        Self::GcpVertexAi,
        Self::GcpAnthropic,
    ];

    /// Wire name of this schema.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::AwsBedrock => "AWSBedrock",
            Self::AzureOpenAi => "AzureOpenAI",
            Self::GcpVertexAi => "GCPVertexAI",
            Self::GcpAnthropic => "GCPAnthropic",
        }
    }
}

impl fmt::Display for ApiSchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiSchemaName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|schema| schema.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Schema as declared in a document.
///
/// The name is kept as a string so that an unknown schema surfaces as a
/// schema error on the object instead of a parse failure of the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedApiSchema {
    /// Schema name.
    pub name: String,
    /// Optional dialect version, e.g. a path prefix or API version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl VersionedApiSchema {
    /// Declare a schema without a version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl From<ApiSchemaName> for VersionedApiSchema {
    fn from(name: ApiSchemaName) -> Self {
        Self::new(name.as_str())
    }
}

/// Resolved schema with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiSchema {
    /// Schema name.
    pub name: ApiSchemaName,
    /// Effective version; may be empty.
    pub version: String,
}

impl fmt::Display for ApiSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}

/// Registry of supported schemas and translation pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Create the registry.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Look up a schema by wire name.
    pub fn parse(&self, field: &str, name: &str) -> Result<ApiSchemaName, ValidationError> {
        name.parse().map_err(|name| ValidationError::UnsupportedSchema {
            field: field.to_string(),
            name,
        })
    }

    /// Resolve a declared schema, applying version defaults.
    ///
    /// OpenAI defaults to `v1` when the version is unset or empty; every
    /// other dialect defaults to an empty version.
    pub fn resolve(
        &self,
        field: &str,
        schema: &VersionedApiSchema,
    ) -> Result<ApiSchema, ValidationError> {
        let name = self.parse(field, &schema.name)?;
        let declared = schema.version.as_deref().unwrap_or_default();
        let version = match name {
            ApiSchemaName::OpenAi if declared.is_empty() => "v1".to_string(),
            _ => declared.to_string(),
        };
        Ok(ApiSchema { name, version })
    }

    /// Resolve a route input schema; only OpenAI is accepted.
    pub fn resolve_input(
        &self,
        field: &str,
        schema: &VersionedApiSchema,
    ) -> Result<ApiSchema, ValidationError> {
        let resolved = self.resolve(field, schema)?;
        if !self.is_input_schema(resolved.name) {
            return Err(ValidationError::InvalidInputSchema {
                field: field.to_string(),
                name: resolved.name.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Whether a schema may be used as a route input.
    #[must_use]
    pub fn is_input_schema(&self, name: ApiSchemaName) -> bool {
        name == ApiSchemaName::OpenAi
    }

    /// Whether a translator exists from `input` to `output`.
    #[must_use]
    pub fn supports_pair(&self, input: ApiSchemaName, output: ApiSchemaName) -> bool {
        input == ApiSchemaName::OpenAi && ApiSchemaName::ALL.contains(&output)
    }

    /// Check a route/backend pairing.
    pub fn check_pair(
        &self,
        field: &str,
        input: ApiSchemaName,
        output: ApiSchemaName,
    ) -> Result<(), ValidationError> {
        if self.supports_pair(input, output) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedSchemaPair {
                field: field.to_string(),
                input: input.to_string(),
                output: output.to_string(),
            })
        }
    }

    /// Whether backends speaking this schema need GCP credentials attached.
    #[must_use]
    pub fn requires_gcp_credentials(&self, output: ApiSchemaName) -> bool {
        matches!(
            output,
            ApiSchemaName::GcpVertexAi | ApiSchemaName::GcpAnthropic
        )
    }
}
