//! CP-014: Geometry simplification via mapshaper.

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::{ConfigError, StepError};
use crate::core::step::{StepContext, StepOutput, Transform};
use crate::core::types::StepDecl;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    /// Percentage of removable points to retain, 0-100
    percentage: f64,
}

pub struct Simplify {
    percentage: f64,
}

impl Simplify {
    pub fn from_decl(layer: &str, decl: &StepDecl) -> Result<Self, ConfigError> {
        let params: Params = super::decode_params(layer, decl)?;
        if !(0.0..=100.0).contains(&params.percentage) {
            return Err(ConfigError::BadParams {
                step: format!("{}.{}", layer, decl.kind),
                message: format!("percentage {} not in 0..=100", params.percentage),
            });
        }
        Ok(Self {
            percentage: params.percentage,
        })
    }
}

#[async_trait]
impl Transform for Simplify {
    async fn run(&self, step: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let simplified = crate::run::mapshaper(
            step.input()?,
            &[
                "-simplify",
                &format!("{}%", self.percentage),
                "keep-shapes",
            ],
        )
        .await?;
        Ok(StepOutput::Content(simplified))
    }
}
