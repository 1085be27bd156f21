//! CP-005: Step execution contract.
//!
//! A step is one graph node: a transform with named inputs and one output.
//! Transforms receive their resolved inputs plus the compile-wide context
//! and return either a new content handle, the empty marker, or `Stop` to
//! halt the remainder of the layer's chain. The scheduler, not the
//! transform, settles the use tally of consumed inputs.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::content::Content;
use super::error::StepError;
use super::types::{Settings, PRIMARY_INPUT};
use crate::trace::eventlog::EventLog;

/// Compile-wide context handed to every transform.
#[derive(Debug)]
pub struct CompileCtx {
    pub settings: Settings,
    pub sources_dir: PathBuf,
    pub out_dir: PathBuf,
    pub events: Option<EventLog>,
}

impl CompileCtx {
    pub fn new(settings: Settings, sources_dir: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            settings,
            sources_dir,
            out_dir,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }
}

/// Everything a transform sees while running: its identity, the compile
/// context, and the completed producer results resolved by input name.
pub struct StepContext<'a> {
    id: &'a str,
    layer: &'a str,
    ctx: &'a CompileCtx,
    inputs: &'a IndexMap<String, Arc<Content>>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        id: &'a str,
        layer: &'a str,
        ctx: &'a CompileCtx,
        inputs: &'a IndexMap<String, Arc<Content>>,
    ) -> Self {
        Self {
            id,
            layer,
            ctx,
            inputs,
        }
    }

    /// Step id, `layer.kind` form.
    pub fn id(&self) -> &str {
        self.id
    }

    /// Owning layer name.
    pub fn layer(&self) -> &str {
        self.layer
    }

    pub fn ctx(&self) -> &CompileCtx {
        self.ctx
    }

    /// The primary input.
    pub fn input(&self) -> Result<&Content, StepError> {
        self.named_input(PRIMARY_INPUT)
    }

    /// An additional named input.
    pub fn named_input(&self, name: &str) -> Result<&Content, StepError> {
        self.inputs
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| StepError::MissingInput(name.to_string()))
    }

    /// All inputs in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Content)> {
        self.inputs.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

/// What a transform produced.
#[derive(Debug)]
pub enum StepOutput {
    /// A new content handle (possibly the empty marker for pure
    /// side-effecting steps)
    Content(Content),
    /// Halt the remainder of this chain without producing further work
    Stop,
}

/// A pluggable transform. Implementations are expected to be deterministic
/// given identical inputs, even when they invoke external programs, and to
/// access each input at most once.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn run(&self, step: &StepContext<'_>) -> Result<StepOutput, StepError>;
}
