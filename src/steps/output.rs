//! CP-016: Terminal sink — write the layer's GeoJSON into the output
//! directory.
//!
//! Zoom filter properties become a per-feature `tippecanoe` object (min
//! clamped into `0..=settings.max_zoom`, max floored at 1), null properties
//! are dropped, and the written file is recorded in the run log with its
//! BLAKE3 hash.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::core::content::Content;
use crate::core::error::{ConfigError, StepError};
use crate::core::step::{StepContext, StepOutput, Transform};
use crate::core::types::StepDecl;
use crate::model::FeatureCollection;
use crate::trace::eventlog::CompileEvent;
use crate::trace::hasher;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {}

pub struct Output;

impl Output {
    pub fn from_decl(layer: &str, decl: &StepDecl) -> Result<Self, ConfigError> {
        let _params: Params = super::decode_params(layer, decl)?;
        Ok(Self)
    }
}

#[async_trait]
impl Transform for Output {
    async fn run(&self, step: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let mut fc: FeatureCollection = serde_json::from_value(step.input()?.to_doc()?)?;
        let max_zoom = i64::from(step.ctx().settings.max_zoom);

        for feature in &mut fc.features {
            let mut tippecanoe = serde_json::Map::new();
            if let Some(min) = feature.properties.filter_minzoom.take() {
                tippecanoe.insert("minzoom".to_string(), min.clamp(0, max_zoom).into());
            }
            if let Some(max) = feature.properties.filter_maxzoom.take() {
                tippecanoe.insert("maxzoom".to_string(), max.max(1).into());
            }
            if !tippecanoe.is_empty() {
                feature
                    .extra
                    .insert("tippecanoe".to_string(), Value::Object(tippecanoe));
            }
            feature.properties.extra.retain(|_, v| !v.is_null());
        }

        let value = serde_json::to_value(&fc)?;
        let bytes = if step.ctx().settings.pretty {
            serde_json::to_vec_pretty(&value)?
        } else {
            serde_json::to_vec(&value)?
        };

        std::fs::create_dir_all(&step.ctx().out_dir)?;
        let path = step.ctx().out_dir.join(format!("{}.geojson", step.layer()));
        std::fs::write(&path, &bytes)?;

        if let Some(log) = &step.ctx().events {
            let event = CompileEvent::OutputWritten {
                layer: step.layer().to_string(),
                path: path.display().to_string(),
                hash: hasher::hash_bytes(&bytes),
            };
            if let Err(e) = log.append(event) {
                eprintln!("warning: event log: {}", e);
            }
        }

        Ok(StepOutput::Content(Content::from_doc(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::CompileCtx;
    use crate::core::types::{Settings, PRIMARY_INPUT};
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;

    async fn run_output(settings: Settings, doc: Value) -> Value {
        let out = tempfile::tempdir().unwrap();
        let ctx = CompileCtx::new(settings, out.path().join("sources"), out.path().join("geo"));
        let mut inputs = IndexMap::new();
        inputs.insert(PRIMARY_INPUT.to_string(), Arc::new(Content::from_doc(doc)));
        let sc = StepContext::new("land.output", "land", &ctx, &inputs);

        let produced = match Output.run(&sc).await.unwrap() {
            StepOutput::Content(c) => c.to_doc().unwrap(),
            StepOutput::Stop => panic!("expected content"),
        };
        let path = ctx.out_dir.join("land.geojson");
        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(produced, written);
        written
    }

    #[tokio::test]
    async fn test_cp016_zoom_filters_become_tippecanoe() {
        let written = run_output(
            Settings {
                max_zoom: 6,
                ..Settings::default()
            },
            json!({"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"filterMinzoom": 9, "filterMaxzoom": 0, "name": "x"}}
            ]}),
        )
        .await;

        let f = &written["features"][0];
        // min clamped into 0..=max_zoom, max floored at 1
        assert_eq!(f["tippecanoe"]["minzoom"], 6);
        assert_eq!(f["tippecanoe"]["maxzoom"], 1);
        // filters no longer appear as properties
        assert!(f["properties"].get("filterMinzoom").is_none());
        assert!(f["properties"].get("filterMaxzoom").is_none());
        assert_eq!(f["properties"]["name"], "x");
    }

    #[tokio::test]
    async fn test_cp016_null_properties_dropped() {
        let written = run_output(
            Settings::default(),
            json!({"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"keep": 1, "drop": null}}
            ]}),
        )
        .await;
        let props = &written["features"][0]["properties"];
        assert_eq!(props["keep"], 1);
        assert!(props.get("drop").is_none());
    }

    #[tokio::test]
    async fn test_cp016_feature_without_filters_untouched() {
        let written = run_output(
            Settings::default(),
            json!({"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "plain"}}
            ]}),
        )
        .await;
        assert!(written["features"][0].get("tippecanoe").is_none());
    }
}
