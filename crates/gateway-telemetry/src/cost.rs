//! Per-request cost accounting.
//!
//! Routes declare named costs. After each request the data plane computes
//! every declared cost from token usage and records it as dynamic metadata
//! under [`METADATA_NAMESPACE`], where rate limiters and access logs pick it
//! up. A cost that cannot be computed is skipped for that request only.

use gateway_core::{ValidationError, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::expression::{CostExpressionEvaluator, ExpressionValue, RhaiCostEvaluator};
use crate::metrics::Metrics;

/// Dynamic metadata namespace for computed costs.
pub const METADATA_NAMESPACE: &str = "io.envoy.ai_gateway";

/// Maximum number of cost declarations per route.
pub const MAX_COSTS_PER_ROUTE: usize = 36;

/// How a cost is computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CostType {
    /// Prompt tokens.
    InputToken,
    /// Completion tokens.
    OutputToken,
    /// Total tokens as reported by the backend.
    TotalToken,
    /// Custom expression over the request context.
    Expression(String),
}

impl CostType {
    /// Wire tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputToken => "InputToken",
            Self::OutputToken => "OutputToken",
            Self::TotalToken => "TotalToken",
            Self::Expression(_) => "CEL",
        }
    }
}

/// A named cost attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CostDeclarationWire", into = "CostDeclarationWire")]
pub struct CostDeclaration {
    /// Metadata key the value is stored under.
    pub metadata_key: String,
    /// Computation.
    pub cost: CostType,
}

impl CostDeclaration {
    /// Create a declaration.
    pub fn new(metadata_key: impl Into<String>, cost: CostType) -> Self {
        Self {
            metadata_key: metadata_key.into(),
            cost,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CostDeclarationWire {
    metadata_key: String,
    #[serde(rename = "type")]
    cost_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cel: Option<String>,
}

impl TryFrom<CostDeclarationWire> for CostDeclaration {
    type Error = ValidationErrors;

    fn try_from(wire: CostDeclarationWire) -> Result<Self, Self::Error> {
        let mut errors = ValidationErrors::new();
        if wire.metadata_key.is_empty() {
            errors.push(ValidationError::invalid("metadataKey", "must not be empty"));
        }
        let cel = wire.cel.filter(|c| !c.trim().is_empty());
        let cost = match (wire.cost_type.as_str(), cel) {
            ("CEL", Some(expression)) => Some(CostType::Expression(expression)),
            ("CEL", None) => {
                errors.push(ValidationError::exclusivity(
                    "cel",
                    "an expression is required when type is CEL",
                ));
                None
            }
            (token @ ("InputToken" | "OutputToken" | "TotalToken"), cel) => {
                if cel.is_some() {
                    errors.push(ValidationError::exclusivity(
                        "cel",
                        format!("must not be set when type is {token}"),
                    ));
                }
                Some(match token {
                    "InputToken" => CostType::InputToken,
                    "OutputToken" => CostType::OutputToken,
                    _ => CostType::TotalToken,
                })
            }
            (other, _) => {
                errors.push(ValidationError::invalid(
                    "type",
                    format!("unknown cost type {other:?}"),
                ));
                None
            }
        };
        match cost {
            Some(cost) if errors.is_empty() => Ok(Self {
                metadata_key: wire.metadata_key,
                cost,
            }),
            _ => Err(errors),
        }
    }
}

impl From<CostDeclaration> for CostDeclarationWire {
    fn from(decl: CostDeclaration) -> Self {
        let cost_type = decl.cost.as_str().to_string();
        let cel = match decl.cost {
            CostType::Expression(expression) => Some(expression),
            _ => None,
        };
        Self {
            metadata_key: decl.metadata_key,
            cost_type,
            cel,
        }
    }
}

/// Inputs available to cost computation for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostContext {
    /// Requested model name.
    pub model: String,
    /// Selected backend as `name.namespace`.
    pub backend: String,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
}

impl CostContext {
    /// Create a context with zero usage.
    pub fn new(model: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            backend: backend.into(),
            ..Self::default()
        }
    }

    /// Set token usage.
    #[must_use]
    pub fn with_usage(mut self, input: u64, output: u64, total: u64) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self.total_tokens = total;
        self
    }
}

/// Failure to compute a cost for one request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CostEvaluationError {
    /// Expression produced a negative number.
    #[error("cost {key}: expression evaluated to negative value {value}")]
    Negative {
        /// Metadata key.
        key: String,
        /// Value produced.
        value: i64,
    },

    /// Expression produced something other than an integer.
    #[error("cost {key}: expression evaluated to non-integer {type_name}")]
    NonInteger {
        /// Metadata key.
        key: String,
        /// Type of the value produced.
        type_name: String,
    },

    /// Expression failed to run.
    #[error("cost {key}: expression evaluation failed: {message}")]
    Evaluation {
        /// Metadata key.
        key: String,
        /// Evaluator message.
        message: String,
    },
}

impl CostEvaluationError {
    /// Metadata key of the failed cost.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Negative { key, .. }
            | Self::NonInteger { key, .. }
            | Self::Evaluation { key, .. } => key,
        }
    }
}

/// Costs computed for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestCosts {
    /// Successfully computed values by metadata key.
    pub values: BTreeMap<String, u64>,
    /// Costs that could not be computed and were skipped.
    pub failures: Vec<CostEvaluationError>,
}

impl RequestCosts {
    /// Metadata namespace the values are recorded under.
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        METADATA_NAMESPACE
    }
}

impl fmt::Display for RequestCosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", METADATA_NAMESPACE)?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, "}}")
    }
}

/// Computes declared costs with an injected expression evaluator.
#[derive(Clone)]
pub struct CostCalculator {
    evaluator: Arc<dyn CostExpressionEvaluator>,
    metrics: Option<Arc<Metrics>>,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(Arc::new(RhaiCostEvaluator::new()))
    }
}

impl fmt::Debug for CostCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostCalculator")
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl CostCalculator {
    /// Create a calculator.
    #[must_use]
    pub fn new(evaluator: Arc<dyn CostExpressionEvaluator>) -> Self {
        Self {
            evaluator,
            metrics: None,
        }
    }

    /// Record outcomes in metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The evaluator used for expressions.
    #[must_use]
    pub fn evaluator(&self) -> &dyn CostExpressionEvaluator {
        self.evaluator.as_ref()
    }

    /// Compute one cost.
    pub fn compute(
        &self,
        decl: &CostDeclaration,
        ctx: &CostContext,
    ) -> Result<u64, CostEvaluationError> {
        let key = || decl.metadata_key.clone();
        match &decl.cost {
            CostType::InputToken => Ok(ctx.input_tokens),
            CostType::OutputToken => Ok(ctx.output_tokens),
            CostType::TotalToken => Ok(ctx.total_tokens),
            CostType::Expression(expression) => {
                let value = self
                    .evaluator
                    .evaluate(expression, ctx)
                    .map_err(|message| CostEvaluationError::Evaluation {
                        key: key(),
                        message,
                    })?;
                match value {
                    ExpressionValue::UInt(v) => Ok(v),
                    ExpressionValue::Int(v) => {
                        u64::try_from(v).map_err(|_| CostEvaluationError::Negative {
                            key: key(),
                            value: v,
                        })
                    }
                    ExpressionValue::Float(_) => Err(CostEvaluationError::NonInteger {
                        key: key(),
                        type_name: "float".to_string(),
                    }),
                    ExpressionValue::Other(type_name) => {
                        Err(CostEvaluationError::NonInteger { key: key(), type_name })
                    }
                }
            }
        }
    }

    /// Compute every declared cost for a request. Failures are logged and
    /// skipped without affecting the other costs.
    pub fn compute_all(&self, decls: &[CostDeclaration], ctx: &CostContext) -> RequestCosts {
        let mut costs = RequestCosts::default();
        for decl in decls {
            match self.compute(decl, ctx) {
                Ok(value) => {
                    debug!(key = %decl.metadata_key, value, "Computed request cost");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_cost_evaluation(&decl.metadata_key, true);
                    }
                    costs.values.insert(decl.metadata_key.clone(), value);
                }
                Err(e) => {
                    warn!(
                        key = %decl.metadata_key,
                        model = %ctx.model,
                        backend = %ctx.backend,
                        error = %e,
                        "Skipping request cost"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_cost_evaluation(&decl.metadata_key, false);
                    }
                    costs.failures.push(e);
                }
            }
        }
        costs
    }
}

/// Check a route's cost declarations: count, unique keys and, when an
/// evaluator is given, expressions that compile.
pub fn validate_cost_declarations(
    decls: &[CostDeclaration],
    evaluator: Option<&dyn CostExpressionEvaluator>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if decls.len() > MAX_COSTS_PER_ROUTE {
        errors.push(ValidationError::cardinality(
            "",
            0,
            MAX_COSTS_PER_ROUTE,
            decls.len(),
        ));
    }
    let mut seen = HashSet::new();
    for (i, decl) in decls.iter().enumerate() {
        if !seen.insert(decl.metadata_key.as_str()) {
            errors.push(ValidationError::invalid(
                format!("[{i}].metadataKey"),
                format!("duplicate metadata key {:?}", decl.metadata_key),
            ));
        }
        if let (CostType::Expression(expression), Some(evaluator)) = (&decl.cost, evaluator) {
            if let Err(message) = evaluator.check(expression) {
                errors.push(ValidationError::invalid(
                    format!("[{i}].cel"),
                    format!("invalid cost expression: {message}"),
                ));
            }
        }
    }
    errors
}
