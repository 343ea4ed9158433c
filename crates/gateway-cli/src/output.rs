//! Terminal and JSON rendering for command results.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored text for terminals.
    Text,
    /// A JSON envelope on stdout.
    Json,
}

impl OutputFormat {
    /// Pick the format from the global `--json` flag.
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The object is rejected.
    Error,
    /// The object is accepted but worth a look.
    Warning,
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print an indented `key: value` line.
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", key.bold(), value);
}

/// Print a section title preceded by a blank line.
pub fn section(title: &str) {
    println!("\n{}", title.bold().underline());
}

/// Print one object with its acceptance condition.
pub fn object_status(label: &str, accepted: bool, reason: &str) {
    let marker = if accepted { "●".green() } else { "●".red() };
    println!("  {} {} {}", marker, label, format!("({reason})").dimmed());
}

/// Print a finding below an object, with the field it points at.
pub fn finding(severity: Severity, field: Option<&str>, message: &str) {
    let line = match field {
        Some(field) if !field.is_empty() => format!("    {} {}", field.cyan(), message),
        _ => format!("    {message}"),
    };
    match severity {
        Severity::Error => eprintln!("{} {}", "✗".red(), line),
        Severity::Warning => eprintln!("{} {}", "⚠".yellow(), line),
    }
}

/// Print rows as a rounded table.
pub fn table<T: tabled::Tabled>(rows: &[T]) {
    use tabled::{settings::Style, Table};

    if rows.is_empty() {
        println!("  (none)");
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Format a timestamp for display.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format a traffic share as a percentage.
pub fn format_share(share: f64) -> String {
    format!("{:.1}%", share * 100.0)
}

/// JSON envelope shared by every command.
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
    /// Whether everything the command looked at was accepted.
    pub success: bool,
    /// Command payload.
    pub data: T,
    /// Summary of what went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// A failed result that still carries its payload.
    pub fn failure_with(data: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
        }
    }

    /// Write the envelope to stdout as pretty JSON.
    pub fn print(&self) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}
