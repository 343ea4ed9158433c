//! Render command - compile the filter configuration of gateways.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use gateway_config::{
    compile_filter_config, http_route_name, AcceptedRoutes, ConfigSnapshot, FilterDocument,
    GatewayAttachment, IgnoredEntry, SnapshotReport, HOST_REWRITE_FILTER_NAME,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::ConfigSource;
use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the render command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Gateway to render (every referenced gateway when omitted)
    #[arg(short, long, env = "AIGW_GATEWAY")]
    pub gateway: Option<String>,

    /// Write the rendered YAML to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Generated resources of one gateway.
#[derive(Debug, Serialize)]
pub struct RenderedGateway {
    pub gateway: String,
    pub extension_policy: String,
    pub http_routes: Vec<String>,
    pub host_rewrite_filters: Vec<String>,
    pub ignored: Vec<IgnoredEntry>,
    pub filter: FilterDocument,
}

/// Execute the render command.
pub async fn execute(args: RenderArgs, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let snapshot = args.source.load()?;
    let report = super::validator(true).validate_snapshot(&snapshot);

    for (kind, key, object_report) in report.reports() {
        if !object_report.is_accepted() {
            output::warning(&format!("{kind} {key} not accepted: {}", object_report.errors));
        }
    }

    let gateways: Vec<String> = match args.gateway {
        Some(gateway) => vec![gateway],
        None => snapshot.gateways().into_iter().collect(),
    };
    let rendered = render(&snapshot, &report, &gateways);

    for gateway in &rendered {
        for ignored in &gateway.ignored {
            output::warning(&format!(
                "{}: {} from {} ignored in favour of {}",
                gateway.gateway, ignored.item, ignored.route, ignored.winner
            ));
        }
    }

    match format {
        OutputFormat::Json => CommandResult::success(rendered).print()?,
        OutputFormat::Text => {
            let yaml = to_yaml(&rendered)?;
            match args.output {
                Some(path) => {
                    std::fs::write(&path, yaml)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    output::success(&format!(
                        "Rendered {} gateway(s) to {}",
                        rendered.len(),
                        path.display()
                    ));
                }
                None => print!("{yaml}"),
            }
        }
    }
    Ok(())
}

/// Render the given gateways from the routes accepted in a snapshot.
pub fn render(
    snapshot: &ConfigSnapshot,
    report: &SnapshotReport,
    gateways: &[String],
) -> Vec<RenderedGateway> {
    let now = Utc::now();
    let mut accepted = AcceptedRoutes::new();
    accepted.apply(snapshot, report, now);

    gateways
        .iter()
        .map(|gateway| {
            let attachment = GatewayAttachment::resolve(gateway, accepted.active_routes());
            let filter = compile_filter_config(gateway, accepted.active_routes(), snapshot, now);
            let http_routes = attachment
                .routes
                .iter()
                .filter_map(|key| accepted.active(key))
                .map(|route| format!("{}/{}", route.namespace(), http_route_name(route)))
                .collect();
            let host_rewrite_filters = attachment
                .namespaces()
                .into_iter()
                .map(|ns| format!("{ns}/{HOST_REWRITE_FILTER_NAME}"))
                .collect();
            let mut ignored = attachment.ignored_costs.clone();
            ignored.extend(attachment.ignored_resources.iter().cloned());
            RenderedGateway {
                gateway: gateway.clone(),
                extension_policy: attachment.extension_policy.clone(),
                http_routes,
                host_rewrite_filters,
                ignored,
                filter,
            }
        })
        .collect()
}

/// Multi-document YAML with one filter configuration per gateway.
pub fn to_yaml(rendered: &[RenderedGateway]) -> Result<String> {
    let mut out = String::new();
    for (i, gateway) in rendered.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        writeln!(out, "# gateway: {}", gateway.gateway)?;
        writeln!(out, "# extension policy: {}", gateway.extension_policy)?;
        for route in &gateway.http_routes {
            writeln!(out, "# http route: {route}")?;
        }
        out.push_str(&gateway.filter.to_yaml()?);
    }
    Ok(out)
}
