//! CP-009: GeoJSON document model.
//!
//! Typed known fields plus an ordered map of raw values for everything
//! else, so unrecognized feature data passes through steps untouched and in
//! order. Geometry is deliberately opaque: the engine never interprets it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GeoJSON feature collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub kind: String,

    #[serde(default)]
    pub features: Vec<Feature>,

    /// Unrecognized top-level members, preserved in order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self {
            kind: feature_collection_type(),
            features: Vec::new(),
            extra: IndexMap::new(),
        }
    }
}

/// A single feature. Geometry is carried as an opaque value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,

    #[serde(default)]
    pub properties: Properties,

    /// Unrecognized feature members (e.g. a tippecanoe object), preserved
    /// in order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

/// Feature properties the compiler understands, plus the passthrough bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Lowest zoom at which the feature is kept
    #[serde(
        rename = "filterMinzoom",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub filter_minzoom: Option<i64>,

    /// Highest zoom at which the feature is kept
    #[serde(
        rename = "filterMaxzoom",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub filter_maxzoom: Option<i64>,

    /// Unrecognized properties, preserved in order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}
