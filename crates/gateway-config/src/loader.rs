//! Reads declarative documents from disk into a snapshot.
//!
//! YAML files may hold several documents separated by `---`; JSON files hold
//! a single object or an array of objects. Documents of kinds this control
//! plane does not manage are skipped. A document that is well-formed but
//! cannot be converted (unknown schema tag, two credential variants, ...)
//! becomes a rejected object instead of failing the whole load.

use gateway_core::{ObjectKey, API_VERSION, DEFAULT_NAMESPACE};
use gateway_routing::{AiGatewayRoute, AiServiceBackend, BACKEND_KIND, INFERENCE_POOL_KIND, ROUTE_KIND};
use gateway_security::{BackendSecurityPolicy, SECURITY_POLICY_KIND};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::snapshot::{ConfigSnapshot, InferencePool, RejectedObject};

/// On-disk document encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// YAML, possibly multi-document.
    Yaml,
    /// JSON object or array of objects.
    Json,
}

impl DocumentFormat {
    /// Format implied by a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Accumulates documents into a snapshot.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: ConfigSnapshot,
    skipped: usize,
}

impl SnapshotBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, or every YAML/JSON file below a directory in path order.
    /// Returns the number of documents read.
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> ConfigResult<usize> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| ConfigError::io(path, e))?;
        if metadata.is_dir() {
            let mut files = Vec::new();
            collect_files(path, &mut files)?;
            let mut total = 0;
            for file in files {
                total += self.add_file(&file)?;
            }
            Ok(total)
        } else {
            self.add_file(path)
        }
    }

    fn add_file(&mut self, path: &Path) -> ConfigResult<usize> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let count = self
            .add_str(&content, format)
            .map_err(|message| ConfigError::parse(path, message))?;
        debug!(path = %path.display(), documents = count, "Loaded configuration file");
        Ok(count)
    }

    /// Add documents from a string. Fails only when the text is not
    /// well-formed; returns the number of documents read.
    pub fn add_str(&mut self, content: &str, format: DocumentFormat) -> Result<usize, String> {
        let values = match format {
            DocumentFormat::Yaml => {
                let mut values = Vec::new();
                for document in serde_yaml::Deserializer::from_str(content) {
                    let value = Value::deserialize(document).map_err(|e| e.to_string())?;
                    values.push(value);
                }
                values
            }
            DocumentFormat::Json => {
                let json: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| e.to_string())?;
                let items = match json {
                    serde_json::Value::Array(items) => items,
                    other => vec![other],
                };
                items
                    .iter()
                    .map(serde_yaml::to_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| e.to_string())?
            }
        };

        let mut count = 0;
        for value in values {
            if value.is_null() {
                continue;
            }
            self.add_value(value);
            count += 1;
        }
        Ok(count)
    }

    /// Add one parsed document. Returns whether its kind is managed here.
    pub fn add_value(&mut self, value: Value) -> bool {
        let Some(kind) = value.get("kind").and_then(Value::as_str).map(str::to_string) else {
            debug!("Skipping document without kind");
            self.skipped += 1;
            return false;
        };
        let key = object_key(&value);
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let managed = [ROUTE_KIND, BACKEND_KIND, SECURITY_POLICY_KIND].contains(&kind.as_str());
        if managed && !api_version.is_empty() && api_version != API_VERSION {
            self.reject(&kind, key, format!("unsupported apiVersion {api_version:?}"));
            return true;
        }

        let inserted = match kind.as_str() {
            ROUTE_KIND => self
                .convert::<AiGatewayRoute>(&kind, &key, value)
                .map(|route| self.snapshot.insert_route(route)),
            BACKEND_KIND => self
                .convert::<AiServiceBackend>(&kind, &key, value)
                .map(|backend| self.snapshot.insert_backend(backend)),
            SECURITY_POLICY_KIND => self
                .convert::<BackendSecurityPolicy>(&kind, &key, value)
                .map(|policy| self.snapshot.insert_security_policy(policy)),
            INFERENCE_POOL_KIND => self
                .convert::<InferencePool>(&kind, &key, value)
                .map(|pool| self.snapshot.insert_inference_pool(pool)),
            other => {
                debug!(kind = other, name = %key, "Skipping unmanaged document kind");
                self.skipped += 1;
                return false;
            }
        };

        if inserted == Some(false) {
            self.reject(&kind, key, "duplicate object; the first definition is kept");
        }
        true
    }

    fn convert<T: DeserializeOwned>(&mut self, kind: &str, key: &ObjectKey, value: Value) -> Option<T> {
        match serde_yaml::from_value(value) {
            Ok(object) => Some(object),
            Err(e) => {
                self.reject(kind, key.clone(), e.to_string());
                None
            }
        }
    }

    fn reject(&mut self, kind: &str, key: ObjectKey, reason: impl Into<String>) {
        let rejected = RejectedObject::new(kind, key, reason);
        warn!(
            kind = %rejected.kind,
            name = %rejected.key,
            reason = %rejected.reason,
            "Rejected configuration document"
        );
        self.snapshot.reject(rejected);
    }

    /// Number of documents skipped as unmanaged.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ConfigSnapshot {
        self.snapshot
    }
}

/// Load a file or directory into a fresh snapshot.
pub fn load_snapshot(path: impl AsRef<Path>) -> ConfigResult<ConfigSnapshot> {
    let path = path.as_ref();
    let mut builder = SnapshotBuilder::new();
    let documents = builder.add_path(path)?;
    let skipped = builder.skipped();
    let snapshot = builder.build();
    info!(
        path = %path.display(),
        documents,
        objects = snapshot.len(),
        rejected = snapshot.rejected().len(),
        skipped,
        "Configuration loaded"
    );
    Ok(snapshot)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> ConfigResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    for path in paths {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if DocumentFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    Ok(())
}

fn object_key(value: &Value) -> ObjectKey {
    let metadata = value.get("metadata");
    let field = |name: &str| {
        metadata
            .and_then(|m| m.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    ObjectKey::new(
        field("namespace").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        field("name").unwrap_or_default(),
    )
}
