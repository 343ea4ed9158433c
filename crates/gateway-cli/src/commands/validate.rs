//! Validate command - validate declarative configuration.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use gateway_config::{ConfigSnapshot, SnapshotReport};
use serde::Serialize;

use super::ConfigSource;
use crate::output::{self, CommandResult, OutputFormat, Severity};

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Skip compiling cost expressions
    #[arg(long)]
    pub skip_expressions: bool,

    /// Treat cross-namespace backend references as failures
    #[arg(long)]
    pub strict: bool,
}

/// Validation result.
#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub source: String,
    pub objects: Vec<ObjectResult>,
}

/// Outcome for one object or rejected document.
#[derive(Debug, Serialize)]
pub struct ObjectResult {
    pub kind: String,
    pub name: String,
    pub accepted: bool,
    pub reason: String,
    pub errors: Vec<ValidationMessage>,
    pub warnings: Vec<ValidationMessage>,
}

/// Validation message.
#[derive(Debug, Serialize)]
pub struct ValidationMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Execute the validate command.
pub async fn execute(args: ValidateArgs, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let snapshot = args.source.load()?;
    let report = super::validator(!args.skip_expressions).validate_snapshot(&snapshot);

    let result = summarize(
        args.source.config.display().to_string(),
        &snapshot,
        &report,
        args.strict,
    );
    let valid = result.valid;
    let failed = result.objects.iter().filter(|o| !o.accepted).count();
    print_result(result, format)?;

    if !valid {
        anyhow::bail!("{failed} object(s) not accepted");
    }
    Ok(())
}

/// Build the result for a validated snapshot.
pub fn summarize(
    source: String,
    snapshot: &ConfigSnapshot,
    report: &SnapshotReport,
    strict: bool,
) -> ValidationResult {
    let now = Utc::now();
    let mut objects = Vec::new();

    for rejected in snapshot.rejected() {
        let condition = rejected.condition(now);
        objects.push(ObjectResult {
            kind: rejected.kind.clone(),
            name: rejected.key.to_string(),
            accepted: false,
            reason: condition.reason,
            errors: vec![ValidationMessage {
                message: rejected.reason.clone(),
                path: None,
                code: None,
            }],
            warnings: Vec::new(),
        });
    }

    for (kind, key, object_report) in report.reports() {
        let condition = object_report.condition(0, now);
        let errors = object_report
            .errors
            .iter()
            .map(|e| ValidationMessage {
                message: e.to_string(),
                path: Some(e.field().to_string()).filter(|f| !f.is_empty()),
                code: Some(e.error_code().to_string()),
            })
            .collect();
        let warnings: Vec<_> = object_report
            .cross_namespace_refs
            .iter()
            .map(|r| ValidationMessage {
                message: format!("references backend {} in another namespace", r.target),
                path: Some(r.field.clone()),
                code: None,
            })
            .collect();
        let accepted = object_report.is_accepted() && !(strict && !warnings.is_empty());
        objects.push(ObjectResult {
            kind: kind.to_string(),
            name: key.to_string(),
            accepted,
            reason: condition.reason,
            errors,
            warnings,
        });
    }

    ValidationResult {
        valid: objects.iter().all(|o| o.accepted),
        source,
        objects,
    }
}

/// Print the validation result.
fn print_result(result: ValidationResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let cmd_result = if result.valid {
                CommandResult::success(result)
            } else {
                CommandResult::failure_with(result, "Validation failed")
            };
            cmd_result.print()?;
        }
        OutputFormat::Text => {
            if result.objects.is_empty() {
                output::warning(&format!("No objects found in {}", result.source));
                return Ok(());
            }

            output::section(&format!("Objects in {}", result.source));
            for object in &result.objects {
                output::object_status(
                    &format!("{} {}", object.kind, object.name),
                    object.accepted,
                    &object.reason,
                );
                for error in &object.errors {
                    output::finding(Severity::Error, error.path.as_deref(), &error.message);
                }
                for warning in &object.warnings {
                    output::finding(Severity::Warning, warning.path.as_deref(), &warning.message);
                }
            }

            let failed = result.objects.iter().filter(|o| !o.accepted).count();
            println!();
            if result.valid {
                output::success(&format!(
                    "All {} object(s) accepted",
                    result.objects.len()
                ));
            } else {
                output::error(&format!(
                    "{} of {} object(s) not accepted",
                    failed,
                    result.objects.len()
                ));
            }
        }
    }

    Ok(())
}
