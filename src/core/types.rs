//! CP-001: Declaration model for capas.yaml.
//!
//! Defines the YAML schema types for compile settings, layers, and step
//! descriptors. Declarations are parsed once at startup and immutable
//! afterwards; everything derives Serialize/Deserialize for roundtripping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Separator between layer name and step kind in a step id.
/// Layer names must not contain it, or bare references would be ambiguous.
pub const ID_SEPARATOR: char = '.';

/// Name of the primary input slot of a step.
pub const PRIMARY_INPUT: &str = "in";

// ============================================================================
// Top-level capas.yaml
// ============================================================================

/// Root declaration — the full set of layers to compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapasConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable map/project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Compile settings
    #[serde(default)]
    pub settings: Settings,

    /// Layer declarations, in compile order
    pub layers: Vec<Layer>,
}

// ============================================================================
// Settings
// ============================================================================

/// Compile-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Worker pool size for step execution
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Highest zoom level written into tile filter properties
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,

    /// Pretty-print written outputs
    #[serde(default)]
    pub pretty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_zoom: default_max_zoom(),
            pretty: false,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_zoom() -> u8 {
    10
}

// ============================================================================
// Layers and steps
// ============================================================================

/// A named layer: an ordered chain of steps producing one derived dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Layer name, unique across the config
    pub name: String,

    /// Ordered step descriptors
    pub steps: Vec<StepDecl>,
}

/// A single step descriptor. The kind tag selects a transform from the
/// registry; kind-specific parameters are captured as an ordered raw-value
/// map and decoded by the factory for that kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDecl {
    /// Step kind tag (registry discriminator)
    pub kind: String,

    /// Dependency references
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub depends_on: Dependencies,

    /// Kind-specific parameters (everything else in the step record)
    #[serde(flatten)]
    pub params: IndexMap<String, serde_yaml_ng::Value>,
}

/// Dependency references of a step. `in` is the primary input; any other
/// key declares an additional named input. A reference containing the id
/// separator is absolute; a bare name resolves to the last step of that
/// layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Primary input reference; replaces the implicit edge from the
    /// preceding step of the same layer
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Additional named input references
    #[serde(flatten)]
    pub named: IndexMap<String, String>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.named.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
