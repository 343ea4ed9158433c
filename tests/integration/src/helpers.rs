//! Test helpers

use gateway_config::{load_snapshot, ConfigSnapshot, RouteValidator, SnapshotReport};
use gateway_telemetry::RhaiCostEvaluator;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary configuration directory.
pub struct ConfigDir {
    dir: TempDir,
}

impl ConfigDir {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write documents to a multi-document YAML file, replacing it.
    pub fn write(&self, file: &str, documents: &[Value]) {
        let content = documents
            .iter()
            .map(|d| serde_yaml::to_string(d).expect("Failed to render YAML"))
            .collect::<Vec<_>>()
            .join("---\n");
        std::fs::write(self.dir.path().join(file), content).expect("Failed to write file");
    }

    /// Remove a file.
    pub fn remove(&self, file: &str) {
        std::fs::remove_file(self.dir.path().join(file)).expect("Failed to remove file");
    }

    /// Load the directory.
    pub fn load(&self) -> ConfigSnapshot {
        load_snapshot(self.dir.path()).expect("Failed to load snapshot")
    }

    /// Load and validate the directory.
    pub fn load_and_validate(&self) -> (ConfigSnapshot, SnapshotReport) {
        let snapshot = self.load();
        let report = validator().validate_snapshot(&snapshot);
        (snapshot, report)
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Validator that also compiles cost expressions.
pub fn validator() -> RouteValidator {
    RouteValidator::new().with_evaluator(Arc::new(RhaiCostEvaluator::new()))
}

/// Messages of a report's errors.
pub fn error_messages(report: &gateway_config::ValidationReport) -> Vec<String> {
    report.errors.iter().map(ToString::to_string).collect()
}
