//! CP-008: Step registry — kind tag to transform factory.
//!
//! One explicit table, built at compile time. Adding a step kind means
//! adding a module and a match arm here; nothing is discovered at runtime.

pub mod add_zoom;
pub mod merge;
pub mod output;
pub mod read_file;
pub mod simplify;
pub mod stop;

use serde::de::DeserializeOwned;

use crate::core::error::ConfigError;
use crate::core::step::Transform;
use crate::core::types::{StepDecl, ID_SEPARATOR};

/// Registered kind tags, in registry order.
pub const KNOWN_KINDS: &[&str] = &[
    "read_file",
    "add_zoom",
    "merge",
    "simplify",
    "stop_processing",
    "output",
];

pub fn is_known_kind(kind: &str) -> bool {
    KNOWN_KINDS.contains(&kind)
}

/// Build the transform for one step descriptor. Unknown kinds and
/// undecodable parameters are configuration errors raised before any step
/// runs.
pub fn build_transform(layer: &str, decl: &StepDecl) -> Result<Box<dyn Transform>, ConfigError> {
    match decl.kind.as_str() {
        "read_file" => Ok(Box::new(read_file::ReadFile::from_decl(layer, decl)?)),
        "add_zoom" => Ok(Box::new(add_zoom::AddZoom::from_decl(layer, decl)?)),
        "merge" => Ok(Box::new(merge::Merge::from_decl(layer, decl)?)),
        "simplify" => Ok(Box::new(simplify::Simplify::from_decl(layer, decl)?)),
        "stop_processing" => Ok(Box::new(stop::StopProcessing::from_decl(layer, decl)?)),
        "output" => Ok(Box::new(output::Output::from_decl(layer, decl)?)),
        _ => Err(ConfigError::UnknownKind {
            layer: layer.to_string(),
            kind: decl.kind.clone(),
        }),
    }
}

/// Decode a step's raw parameter map into the kind's typed params.
pub(crate) fn decode_params<T: DeserializeOwned>(
    layer: &str,
    decl: &StepDecl,
) -> Result<T, ConfigError> {
    let value = serde_yaml_ng::to_value(&decl.params).map_err(|e| bad_params(layer, decl, e))?;
    serde_yaml_ng::from_value(value).map_err(|e| bad_params(layer, decl, e))
}

fn bad_params(layer: &str, decl: &StepDecl, e: serde_yaml_ng::Error) -> ConfigError {
    ConfigError::BadParams {
        step: format!("{}{}{}", layer, ID_SEPARATOR, decl.kind),
        message: e.to_string(),
    }
}
