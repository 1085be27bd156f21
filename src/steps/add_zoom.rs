//! CP-012: Stamp zoom filter properties onto every feature.

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::content::Content;
use crate::core::error::{ConfigError, StepError};
use crate::core::step::{StepContext, StepOutput, Transform};
use crate::core::types::StepDecl;
use crate::model::FeatureCollection;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    min_zoom: Option<i64>,
    max_zoom: Option<i64>,
}

pub struct AddZoom {
    min_zoom: Option<i64>,
    max_zoom: Option<i64>,
}

impl AddZoom {
    pub fn from_decl(layer: &str, decl: &StepDecl) -> Result<Self, ConfigError> {
        let params: Params = super::decode_params(layer, decl)?;
        Ok(Self {
            min_zoom: params.min_zoom,
            max_zoom: params.max_zoom,
        })
    }
}

#[async_trait]
impl Transform for AddZoom {
    async fn run(&self, step: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let doc = step.input()?.to_doc()?;
        let mut fc: FeatureCollection = serde_json::from_value(doc)?;
        for feature in &mut fc.features {
            if let Some(z) = self.min_zoom {
                feature.properties.filter_minzoom = Some(z);
            }
            if let Some(z) = self.max_zoom {
                feature.properties.filter_maxzoom = Some(z);
            }
        }
        Ok(StepOutput::Content(Content::from_doc(serde_json::to_value(
            fc,
        )?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::CompileCtx;
    use crate::core::types::{Settings, PRIMARY_INPUT};
    use indexmap::IndexMap;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn run_over(step: &AddZoom, doc: serde_json::Value) -> serde_json::Value {
        let ctx = CompileCtx::new(Settings::default(), PathBuf::from("s"), PathBuf::from("o"));
        let mut inputs = IndexMap::new();
        inputs.insert(
            PRIMARY_INPUT.to_string(),
            Arc::new(Content::from_doc(doc)),
        );
        let sc = StepContext::new("base.add_zoom", "base", &ctx, &inputs);
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        match rt.block_on(step.run(&sc)).unwrap() {
            StepOutput::Content(c) => c.to_doc().unwrap(),
            StepOutput::Stop => panic!("expected content"),
        }
    }

    #[test]
    fn test_cp012_sets_both_bounds() {
        let step = AddZoom {
            min_zoom: Some(2),
            max_zoom: Some(6),
        };
        let out = run_over(
            &step,
            json!({"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "a"}},
                {"type": "Feature", "properties": {}}
            ]}),
        );
        for f in out["features"].as_array().unwrap() {
            assert_eq!(f["properties"]["filterMinzoom"], 2);
            assert_eq!(f["properties"]["filterMaxzoom"], 6);
        }
        assert_eq!(out["features"][0]["properties"]["name"], "a");
    }

    #[test]
    fn test_cp012_unset_bound_left_alone() {
        let step = AddZoom {
            min_zoom: Some(4),
            max_zoom: None,
        };
        let out = run_over(
            &step,
            json!({"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"filterMaxzoom": 9}}
            ]}),
        );
        assert_eq!(out["features"][0]["properties"]["filterMinzoom"], 4);
        assert_eq!(out["features"][0]["properties"]["filterMaxzoom"], 9);
    }
}
