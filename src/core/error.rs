//! CP-007: Error taxonomy.
//!
//! Three families with different blast radius:
//! - `ConfigError` is fatal and pre-execution; zero steps run.
//! - `UsageError` marks an engine or graph-construction bug and aborts the run.
//! - `StepError` is isolated to one step; its transitive dependents starve.

use thiserror::Error;

/// Fatal configuration error. Raised while parsing declarations or building
/// the step graph, always before any step executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("unknown step kind '{kind}' in layer '{layer}'")]
    UnknownKind { layer: String, kind: String },

    #[error("bad parameters for step '{step}': {message}")]
    BadParams { step: String, message: String },

    #[error("step '{step}' references unknown layer '{layer}'")]
    UnknownLayer { step: String, layer: String },

    #[error("step '{step}' references unknown step '{reference}'")]
    UnresolvedReference { step: String, reference: String },

    #[error("layer '{0}' has no steps to reference")]
    EmptyLayer(String),

    #[error("dependency cycle involving: {0}")]
    Cycle(String),
}

/// Violation of the content use budget. Budgets are computed from the graph,
/// so tripping one means the engine or graph construction is wrong, not the
/// step; the scheduler escalates these to a fatal run abort.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("content '{label}' was used {attempted} times but only allows {allowed} uses")]
    BudgetExceeded {
        label: String,
        allowed: u32,
        attempted: u32,
    },

    #[error("content '{label}' was finished {attempted} times for {allowed} declared consumers")]
    FinishExceeded {
        label: String,
        allowed: u32,
        attempted: u32,
    },

    #[error("content '{0}' was accessed after release")]
    AfterRelease(String),

    #[error("used empty content '{0}'")]
    Empty(String),
}

/// Failure of a single step's transform. Recorded against that step only;
/// sibling branches keep running and dependents are never scheduled.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("failed to invoke {program}: {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with code {code}: {stderr}")]
    Tool {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("{0}")]
    Invalid(String),
}

/// Terminal error of a whole compile run.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("engine usage fault at step '{step}': {source}")]
    Usage {
        step: String,
        #[source]
        source: UsageError,
    },

    #[error("internal scheduler error: {0}")]
    Internal(String),
}
