//! Explain command - show how routes dispatch traffic.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use gateway_config::{EffectiveRoute, SnapshotReport};
use gateway_routing::{AiGatewayRoute, RuleTarget};
use serde::Serialize;
use tabled::Tabled;

use super::{parse_key, ConfigSource};
use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the explain command.
#[derive(Args, Debug)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Route to explain as namespace/name (all routes when omitted)
    #[arg(short, long)]
    pub route: Option<String>,

    /// Request header as name=value, used to pick the matching rule
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

/// Explanation of one route.
#[derive(Debug, Serialize)]
pub struct RouteExplanation {
    pub route: String,
    pub accepted: bool,
    pub gateways: Vec<String>,
    pub input_schema: String,
    pub rules: Vec<RuleExplanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<usize>,
}

/// Explanation of one rule.
#[derive(Debug, Serialize)]
pub struct RuleExplanation {
    pub index: usize,
    pub matches: Vec<String>,
    pub request_timeout: String,
    pub models_owned_by: String,
    pub models_created_at: DateTime<Utc>,
    pub target: String,
    pub backends: Vec<BackendShare>,
}

/// Traffic share of one backend.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct BackendShare {
    #[tabled(rename = "Rule")]
    pub rule: usize,
    #[tabled(rename = "Priority")]
    pub priority: u32,
    #[tabled(rename = "Backend")]
    pub backend: String,
    #[tabled(rename = "Weight")]
    pub weight: u32,
    #[tabled(rename = "Share", display_with = "display_share")]
    pub share: f64,
    #[tabled(rename = "Model")]
    pub model: String,
}

/// Execute the explain command.
pub async fn execute(args: ExplainArgs, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let snapshot = args.source.load()?;
    let report = super::validator(false).validate_snapshot(&snapshot);

    let routes: Vec<&AiGatewayRoute> = match &args.route {
        Some(name) => {
            let key = parse_key(name);
            vec![snapshot
                .route(&key)
                .with_context(|| format!("Route {key} not found"))?]
        }
        None => snapshot.routes().collect(),
    };

    let explanations = routes
        .into_iter()
        .map(|route| explain_route(route, &report, &args.headers, Utc::now()))
        .collect::<Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => CommandResult::success(explanations).print()?,
        OutputFormat::Text => print_text(&explanations, !args.headers.is_empty()),
    }
    Ok(())
}

/// Explain one route.
pub fn explain_route(
    route: &AiGatewayRoute,
    report: &SnapshotReport,
    headers: &[(String, String)],
    now: DateTime<Utc>,
) -> Result<RouteExplanation> {
    let key = route.metadata.key();
    let effective = EffectiveRoute::resolve(route, now)
        .map_err(|errors| anyhow::anyhow!("Route {key} cannot be explained: {errors}"))?;

    let rules = effective
        .rules
        .iter()
        .map(|rule| {
            let matches = rule
                .matches
                .iter()
                .map(|m| {
                    m.headers
                        .iter()
                        .map(|h| format!("{}={}", h.name, h.value))
                        .collect::<Vec<_>>()
                        .join(" & ")
                })
                .collect();
            let (target, backends) = match &rule.target {
                RuleTarget::Weighted(selector) => {
                    let backends = selector
                        .tiers()
                        .iter()
                        .flat_map(|tier| {
                            tier.entries.iter().map(move |entry| BackendShare {
                                rule: rule.index,
                                priority: tier.priority,
                                backend: entry.qualified_name(),
                                weight: entry.weight,
                                share: tier.share(entry),
                                model: entry
                                    .model_name_override
                                    .clone()
                                    .unwrap_or_else(|| "-".to_string()),
                            })
                        })
                        .collect();
                    ("weighted".to_string(), backends)
                }
                RuleTarget::Delegated { name, namespace } => {
                    (format!("inference pool {name}.{namespace}"), Vec::new())
                }
                RuleTarget::Unrouted => ("no backends".to_string(), Vec::new()),
            };
            RuleExplanation {
                index: rule.index,
                matches,
                request_timeout: rule
                    .timeouts
                    .request
                    .as_ref()
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_default(),
                models_owned_by: rule.models_owned_by.clone(),
                models_created_at: rule.models_created_at,
                target,
                backends,
            }
        })
        .collect();

    let matched_rule = if headers.is_empty() {
        None
    } else {
        route.select_rule(headers).map(|(index, _)| index)
    };

    Ok(RouteExplanation {
        route: key.to_string(),
        accepted: report.routes.get(&key).is_some_and(|r| r.is_accepted()),
        gateways: route.spec.target_refs.iter().map(|t| t.name.clone()).collect(),
        input_schema: effective.input_schema.to_string(),
        rules,
        matched_rule,
    })
}

fn print_text(explanations: &[RouteExplanation], matching: bool) {
    if explanations.is_empty() {
        output::info("No routes found");
        return;
    }

    for explanation in explanations {
        output::section(&format!("Route {}", explanation.route));
        output::object_status(
            "Status",
            explanation.accepted,
            if explanation.accepted { "Accepted" } else { "NotAccepted" },
        );
        output::key_value("Gateways", &explanation.gateways.join(", "));
        output::key_value("Input schema", &explanation.input_schema);

        for rule in &explanation.rules {
            println!();
            let conditions = if rule.matches.is_empty() {
                "every request".to_string()
            } else {
                rule.matches.join(" | ")
            };
            output::key_value(&format!("Rule {}", rule.index), &conditions);
            output::key_value("  Target", &rule.target);
            output::key_value("  Timeout", &rule.request_timeout);
            output::key_value("  Owned by", &rule.models_owned_by);
            output::key_value("  Created", &output::format_timestamp(&rule.models_created_at));
        }

        let shares: Vec<BackendShare> = explanation
            .rules
            .iter()
            .flat_map(|r| r.backends.iter().cloned())
            .collect();
        if !shares.is_empty() {
            println!();
            output::table(&shares);
        }

        if matching {
            match explanation.matched_rule {
                Some(index) => output::success(&format!("Request matches rule {index}")),
                None => output::warning("Request matches no rule"),
            }
        }
    }
}

fn display_share(share: &f64) -> String {
    output::format_share(*share)
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{fixtures, validator};

    fn explain(headers: &[(String, String)]) -> RouteExplanation {
        let dir = fixtures::valid_config();
        let snapshot = ConfigSource {
            config: dir.path().to_path_buf(),
        }
        .load()
        .unwrap();
        let report = validator(true).validate_snapshot(&snapshot);
        let route = snapshot.routes().next().unwrap();
        explain_route(route, &report, headers, Utc::now()).unwrap()
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("x-ai-eg-model=gpt-4o").unwrap(),
            ("x-ai-eg-model".to_string(), "gpt-4o".to_string())
        );
        assert!(parse_header("no-separator").is_err());
        assert!(parse_header("=value").is_err());
    }

    #[test]
    fn test_explain_shares() {
        let explanation = explain(&[]);
        assert_eq!(explanation.route, "ai/chat");
        assert!(explanation.accepted);
        assert_eq!(explanation.gateways, ["envoy-ai-gateway"]);
        assert_eq!(explanation.input_schema, "OpenAI@v1");

        let rule = &explanation.rules[0];
        assert_eq!(rule.matches, ["x-ai-eg-model=gpt-4o"]);
        assert_eq!(rule.request_timeout, "60s");
        assert_eq!(rule.models_owned_by, "Envoy AI Gateway");
        assert_eq!(rule.target, "weighted");

        let shares: Vec<_> = rule
            .backends
            .iter()
            .map(|b| (b.backend.as_str(), b.priority, b.share))
            .collect();
        assert_eq!(
            shares,
            [("openai.ai", 0, 0.75), ("azure.ai", 0, 0.25), ("bedrock.ai", 1, 1.0)]
        );
        assert_eq!(explanation.matched_rule, None);
    }

    #[test]
    fn test_explain_matching_rule() {
        let matched = explain(&[("X-AI-EG-Model".to_string(), "gpt-4o".to_string())]);
        assert_eq!(matched.matched_rule, Some(0));

        let unmatched = explain(&[("x-ai-eg-model".to_string(), "llama".to_string())]);
        assert_eq!(unmatched.matched_rule, None);
    }
}
