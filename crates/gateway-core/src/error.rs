//! Validation error taxonomy.
//!
//! Every configuration problem maps to one of three categories:
//! - **Schema**: unsupported API schema, or a schema in a role it cannot fill
//! - **Structural**: cardinality, mutual exclusion or malformed values
//! - **Reference**: a named object that does not exist or is attached ambiguously
//!
//! Per-request cost evaluation failures live with the cost model and never
//! affect acceptance of a configuration.

use serde::Serialize;
use std::fmt;

/// Result type for validation operations.
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// API schema problems.
    Schema,
    /// Shape, cardinality and exclusivity problems.
    Structural,
    /// Dangling or ambiguous references.
    Reference,
}

impl ErrorCategory {
    /// Condition reason used when this category rejects an object.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Schema => "InvalidSchema",
            Self::Structural => "InvalidSpec",
            Self::Reference => "InvalidReference",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema => write!(f, "schema"),
            Self::Structural => write!(f, "structural"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// A single configuration validation failure.
///
/// `field` is a JSON-path style location within the offending object,
/// e.g. `spec.rules[0].backendRefs[1]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    /// Schema name is not in the registry.
    #[error("{field}: unsupported API schema {name:?}")]
    UnsupportedSchema {
        /// Location of the schema.
        field: String,
        /// Offending schema name.
        name: String,
    },

    /// Schema is known but not valid as a route input.
    #[error("{field}: schema {name} cannot be used as a route input schema")]
    InvalidInputSchema {
        /// Location of the schema.
        field: String,
        /// Offending schema name.
        name: String,
    },

    /// Route input schema cannot be translated to the backend schema.
    #[error("{field}: translation from {input} to {output} is not supported")]
    UnsupportedSchemaPair {
        /// Location of the backend schema.
        field: String,
        /// Route input schema.
        input: String,
        /// Backend output schema.
        output: String,
    },

    /// Malformed or out-of-range value.
    #[error("{field}: {message}")]
    InvalidField {
        /// Location of the value.
        field: String,
        /// Human-readable description.
        message: String,
    },

    /// List exceeds (or falls below) its allowed length.
    #[error("{field}: expected between {min} and {max} entries, got {actual}")]
    Cardinality {
        /// Location of the list.
        field: String,
        /// Minimum number of entries.
        min: usize,
        /// Maximum number of entries.
        max: usize,
        /// Actual number of entries.
        actual: usize,
    },

    /// Mutually exclusive fields were combined, or a required one-of is absent.
    #[error("{field}: {message}")]
    Exclusivity {
        /// Location of the enclosing object.
        field: String,
        /// Human-readable description.
        message: String,
    },

    /// Named object does not exist.
    #[error("{field}: {kind} {namespace}/{name} not found")]
    NotFound {
        /// Location of the reference.
        field: String,
        /// Kind of the referenced object.
        kind: String,
        /// Namespace of the referenced object.
        namespace: String,
        /// Name of the referenced object.
        name: String,
    },

    /// Reference is ambiguous or not permitted.
    #[error("{field}: {message}")]
    InvalidReference {
        /// Location of the reference.
        field: String,
        /// Human-readable description.
        message: String,
    },
}

impl ValidationError {
    /// Create an invalid field error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an exclusivity error.
    pub fn exclusivity(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exclusivity {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a cardinality error.
    pub fn cardinality(field: impl Into<String>, min: usize, max: usize, actual: usize) -> Self {
        Self::Cardinality {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    /// Create a not-found reference error.
    pub fn not_found(
        field: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            field: field.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an invalid reference error.
    pub fn invalid_reference(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedSchema { .. }
            | Self::InvalidInputSchema { .. }
            | Self::UnsupportedSchemaPair { .. } => ErrorCategory::Schema,
            Self::InvalidField { .. } | Self::Cardinality { .. } | Self::Exclusivity { .. } => {
                ErrorCategory::Structural
            }
            Self::NotFound { .. } | Self::InvalidReference { .. } => ErrorCategory::Reference,
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedSchema { .. } => "unsupported_schema",
            Self::InvalidInputSchema { .. } => "invalid_input_schema",
            Self::UnsupportedSchemaPair { .. } => "unsupported_schema_pair",
            Self::InvalidField { .. } => "invalid_field",
            Self::Cardinality { .. } => "cardinality",
            Self::Exclusivity { .. } => "exclusivity",
            Self::NotFound { .. } => "not_found",
            Self::InvalidReference { .. } => "invalid_reference",
        }
    }

    /// Location of the offending value.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::UnsupportedSchema { field, .. }
            | Self::InvalidInputSchema { field, .. }
            | Self::UnsupportedSchemaPair { field, .. }
            | Self::InvalidField { field, .. }
            | Self::Cardinality { field, .. }
            | Self::Exclusivity { field, .. }
            | Self::NotFound { field, .. }
            | Self::InvalidReference { field, .. } => field,
        }
    }

    /// Prefix the field location, e.g. to nest a rule error under `spec.rules[2]`.
    #[must_use]
    pub fn at(mut self, prefix: &str) -> Self {
        let field = match &mut self {
            Self::UnsupportedSchema { field, .. }
            | Self::InvalidInputSchema { field, .. }
            | Self::UnsupportedSchemaPair { field, .. }
            | Self::InvalidField { field, .. }
            | Self::Cardinality { field, .. }
            | Self::Exclusivity { field, .. }
            | Self::NotFound { field, .. }
            | Self::InvalidReference { field, .. } => field,
        };
        *field = if field.is_empty() {
            prefix.to_string()
        } else if field.starts_with('[') {
            format!("{prefix}{field}")
        } else {
            format!("{prefix}.{field}")
        };
        self
    }
}

/// A non-empty collection of validation failures for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Record every failure from another collection.
    pub fn extend(&mut self, other: impl IntoIterator<Item = ValidationError>) {
        self.0.extend(other);
    }

    /// Record a failure from a result, returning the success value if any.
    pub fn collect<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    /// Whether no failures were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over recorded failures.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Category of the first failure; it decides the condition reason.
    #[must_use]
    pub fn primary_category(&self) -> Option<ErrorCategory> {
        self.0.first().map(ValidationError::category)
    }

    /// Convert into a result: `Ok(value)` when empty.
    pub fn into_result<T>(self, value: T) -> ValidationResult<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Prefix every recorded location.
    #[must_use]
    pub fn at(self, prefix: &str) -> Self {
        Self(self.0.into_iter().map(|e| e.at(prefix)).collect())
    }

    /// Convert `validator` derive failures into structural errors, with field
    /// names in their wire (camelCase) form.
    #[must_use]
    pub fn from_validator(errors: &validator::ValidationErrors) -> Self {
        let mut out = Self::new();
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (field, errs) in fields {
            for err in errs {
                let message = err
                    .message
                    .as_ref()
                    .map_or_else(|| err.code.to_string(), ToString::to_string);
                out.push(ValidationError::invalid(wire_field_name(&field), message));
            }
        }
        out
    }
}

fn wire_field_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
