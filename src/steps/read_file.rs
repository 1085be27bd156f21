//! CP-011: Source step — read a file from the sources directory.
//!
//! GeoPackage sources are converted through ogr2ogr; anything else is read
//! as raw bytes.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::content::Content;
use crate::core::error::{ConfigError, StepError};
use crate::core::step::{StepContext, StepOutput, Transform};
use crate::core::types::StepDecl;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {
    file: PathBuf,
}

pub struct ReadFile {
    file: PathBuf,
}

impl ReadFile {
    pub fn from_decl(layer: &str, decl: &StepDecl) -> Result<Self, ConfigError> {
        let params: Params = super::decode_params(layer, decl)?;
        Ok(Self { file: params.file })
    }
}

#[async_trait]
impl Transform for ReadFile {
    async fn run(&self, step: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let path = step.ctx().sources_dir.join(&self.file);

        let is_gpkg = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("gpkg"))
            .unwrap_or(false);
        if is_gpkg {
            let content = crate::run::ogr2ogr(&path).await?;
            return Ok(StepOutput::Content(content));
        }

        Ok(StepOutput::Content(Content::from_bytes(std::fs::read(
            &path,
        )?)))
    }
}
