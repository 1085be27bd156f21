//! CP-013: Merge the feature collections of all inputs, in input order.

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::content::Content;
use crate::core::error::{ConfigError, StepError};
use crate::core::step::{StepContext, StepOutput, Transform};
use crate::core::types::StepDecl;
use crate::model::FeatureCollection;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {}

pub struct Merge;

impl Merge {
    pub fn from_decl(layer: &str, decl: &StepDecl) -> Result<Self, ConfigError> {
        let _params: Params = super::decode_params(layer, decl)?;
        Ok(Self)
    }
}

#[async_trait]
impl Transform for Merge {
    async fn run(&self, step: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let mut merged = FeatureCollection::default();
        for (_name, content) in step.inputs() {
            let fc: FeatureCollection = serde_json::from_value(content.to_doc()?)?;
            merged.features.extend(fc.features);
        }
        Ok(StepOutput::Content(Content::from_doc(serde_json::to_value(
            merged,
        )?)))
    }
}
