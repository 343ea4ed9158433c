//! Cost command - compute the request costs a route records.

use anyhow::{Context, Result};
use clap::Args;
use gateway_core::AI_MODEL_HEADER_KEY;
use gateway_routing::{AiGatewayRoute, WeightedSelector};
use gateway_telemetry::{CostCalculator, CostContext, CostType, RequestCosts, METADATA_NAMESPACE};
use serde::Serialize;
use tabled::Tabled;

use super::{parse_key, ConfigSource};
use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the cost command.
#[derive(Args, Debug)]
pub struct CostArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Route as namespace/name
    #[arg(short, long)]
    pub route: String,

    /// Requested model
    #[arg(short, long)]
    pub model: String,

    /// Selected backend as name.namespace (derived from the matching rule when omitted)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Prompt tokens
    #[arg(long, default_value = "0")]
    pub input_tokens: u64,

    /// Completion tokens
    #[arg(long, default_value = "0")]
    pub output_tokens: u64,

    /// Total tokens (input plus output when omitted)
    #[arg(long)]
    pub total_tokens: Option<u64>,
}

/// Computed costs.
#[derive(Debug, Serialize)]
pub struct CostOutput {
    pub route: String,
    pub model: String,
    pub backend: String,
    pub namespace: String,
    pub costs: Vec<CostRow>,
}

/// One declared cost.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct CostRow {
    #[tabled(rename = "Metadata key")]
    pub metadata_key: String,
    #[tabled(rename = "Type")]
    pub cost_type: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Execute the cost command.
pub async fn execute(args: CostArgs, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let snapshot = args.source.load()?;
    let key = parse_key(&args.route);
    let route = snapshot
        .route(&key)
        .with_context(|| format!("Route {key} not found"))?;

    let result = compute(route, &args, &CostCalculator::default());
    match format {
        OutputFormat::Json => CommandResult::success(result).print()?,
        OutputFormat::Text => {
            output::section(&format!("Costs for route {}", result.route));
            output::key_value("Model", &result.model);
            output::key_value("Backend", &result.backend);
            output::key_value("Metadata namespace", &result.namespace);
            println!();
            output::table(&result.costs);
        }
    }
    Ok(())
}

/// Compute every cost declared by a route.
pub fn compute(route: &AiGatewayRoute, args: &CostArgs, calculator: &CostCalculator) -> CostOutput {
    let backend = args
        .backend
        .clone()
        .or_else(|| default_backend(route, &args.model))
        .unwrap_or_default();
    let total = args
        .total_tokens
        .unwrap_or(args.input_tokens.saturating_add(args.output_tokens));
    let ctx = CostContext::new(&args.model, &backend).with_usage(
        args.input_tokens,
        args.output_tokens,
        total,
    );

    let decls = &route.spec.llm_request_costs;
    let costs: RequestCosts = calculator.compute_all(decls, &ctx);
    let rows = decls
        .iter()
        .map(|decl| {
            let value = match costs.values.get(&decl.metadata_key) {
                Some(value) => value.to_string(),
                None => costs
                    .failures
                    .iter()
                    .find(|f| f.key() == decl.metadata_key)
                    .map_or_else(|| "-".to_string(), |f| format!("error: {f}")),
            };
            let cost_type = match &decl.cost {
                CostType::Expression(expression) => format!("CEL ({expression})"),
                other => other.as_str().to_string(),
            };
            CostRow {
                metadata_key: decl.metadata_key.clone(),
                cost_type,
                value,
            }
        })
        .collect();

    CostOutput {
        route: route.metadata.key().to_string(),
        model: args.model.clone(),
        backend,
        namespace: METADATA_NAMESPACE.to_string(),
        costs: rows,
    }
}

/// Highest-priority backend of the rule matching the model.
fn default_backend(route: &AiGatewayRoute, model: &str) -> Option<String> {
    let (_, rule) = route.select_rule(&[(AI_MODEL_HEADER_KEY, model)])?;
    let selector = WeightedSelector::from_rule(rule, route.namespace()).ok()?;
    selector.select(0.0).map(|entry| entry.qualified_name())
}
