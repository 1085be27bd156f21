//! CP-002: YAML parsing and validation.
//!
//! Parses capas.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Layer names must be unique, non-empty, and separator-free
//! - Every layer must declare at least one step
//! - Step kinds must be registered
//! - Dependency references must point at declared layers

use super::error::ConfigError;
use super::types::{CapasConfig, ID_SEPARATOR};
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn err(message: String) -> ValidationError {
    ValidationError { message }
}

/// Parse a capas.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<CapasConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_config(&content)
}

/// Parse a capas.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<CapasConfig, ConfigError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
///
/// This catches everything visible without building the graph; the graph
/// builder re-checks references at step granularity.
pub fn validate_config(config: &CapasConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(err(format!(
            "version must be \"1.0\", got \"{}\"",
            config.version
        )));
    }

    if config.name.is_empty() {
        errors.push(err("name must not be empty".to_string()));
    }

    if config.settings.workers == 0 {
        errors.push(err("settings.workers must be at least 1".to_string()));
    }

    let mut seen = std::collections::HashSet::new();
    for layer in &config.layers {
        if layer.name.is_empty() {
            errors.push(err("layer name must not be empty".to_string()));
            continue;
        }
        if layer.name.contains(ID_SEPARATOR) {
            errors.push(err(format!(
                "layer '{}' must not contain '{}'",
                layer.name, ID_SEPARATOR
            )));
        }
        if !seen.insert(layer.name.as_str()) {
            errors.push(err(format!("duplicate layer name '{}'", layer.name)));
        }
        if layer.steps.is_empty() {
            errors.push(err(format!("layer '{}' has no steps", layer.name)));
        }

        for step in &layer.steps {
            if !crate::steps::is_known_kind(&step.kind) {
                errors.push(err(format!(
                    "layer '{}' uses unknown step kind '{}'",
                    layer.name, step.kind
                )));
            }

            let refs = step
                .depends_on
                .input
                .iter()
                .chain(step.depends_on.named.values());
            for reference in refs {
                let layer_part = match reference.split_once(ID_SEPARATOR) {
                    Some((prefix, _)) => prefix,
                    None => reference.as_str(),
                };
                if !config.layers.iter().any(|l| l.name == layer_part) {
                    errors.push(err(format!(
                        "layer '{}' step '{}' depends on unknown layer '{}'",
                        layer.name, step.kind, layer_part
                    )));
                }
            }
        }
    }

    errors
}
