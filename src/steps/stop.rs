//! CP-015: Halt the remainder of a layer's chain.

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::{ConfigError, StepError};
use crate::core::step::{StepContext, StepOutput, Transform};
use crate::core::types::StepDecl;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Params {}

pub struct StopProcessing;

impl StopProcessing {
    pub fn from_decl(layer: &str, decl: &StepDecl) -> Result<Self, ConfigError> {
        let _params: Params = super::decode_params(layer, decl)?;
        Ok(Self)
    }
}

#[async_trait]
impl Transform for StopProcessing {
    async fn run(&self, _step: &StepContext<'_>) -> Result<StepOutput, StepError> {
        Ok(StepOutput::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::CompileCtx;
    use crate::core::types::Settings;
    use indexmap::IndexMap;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_cp015_signals_stop() {
        let ctx = CompileCtx::new(Settings::default(), PathBuf::from("s"), PathBuf::from("o"));
        let inputs = IndexMap::new();
        let sc = StepContext::new("base.stop_processing", "base", &ctx, &inputs);
        assert!(matches!(
            StopProcessing.run(&sc).await.unwrap(),
            StepOutput::Stop
        ));
    }
}
