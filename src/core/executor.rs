//! CP-006: Executor — bounded-parallel scheduling of the step graph.
//!
//! Kahn's-algorithm-style topological scheduling with concurrent execution
//! of ready nodes: per-node pending-producer counters, a semaphore of K
//! permits bounding concurrent transforms, and JoinSet completion signals
//! (waiting is joining, never polling). On a node's completion its direct
//! dependents are re-checked for readiness; dependents of failed or stopped
//! nodes are never decremented, so they starve silently. Nothing is ever
//! cancelled: on failure, running and unrelated nodes finish, and the run
//! reports every root failure at the end.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::content::Content;
use super::error::{CompileError, StepError};
use super::graph::StepGraph;
use super::step::{CompileCtx, StepContext, StepOutput};
use crate::trace::eventlog::CompileEvent;

/// One root failure: the step's own transform errored (as opposed to a step
/// starved by an ancestor's failure).
#[derive(Debug)]
pub struct StepFailureReport {
    pub step_id: String,
    pub error: StepError,
}

/// Outcome of a whole compile run.
#[derive(Debug)]
pub struct CompileReport {
    /// Steps whose transform completed with an output
    pub succeeded: Vec<String>,

    /// Steps that halted their chain via the stop signal
    pub stopped: Vec<String>,

    /// Steps never scheduled because an ancestor failed or stopped
    pub starved: Vec<String>,

    /// Root failures, in completion order
    pub failed: Vec<StepFailureReport>,

    pub total_duration: std::time::Duration,
}

impl CompileReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Waiting,
    Running,
    Succeeded,
    Stopped,
    Failed,
}

/// Run the graph to completion under `workers` parallelism.
pub async fn compile(
    graph: &StepGraph,
    ctx: Arc<CompileCtx>,
    workers: usize,
) -> Result<CompileReport, CompileError> {
    let started = Instant::now();
    let n = graph.len();
    let workers = workers.max(1);

    // Per-node pending-producer counters and the reverse edge lists, one
    // entry per reference (a consumer referencing the same producer twice
    // appears twice).
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut pending: Vec<usize> = vec![0; n];
    for (i, node) in graph.nodes.iter().enumerate() {
        for producer in node.inputs.values() {
            let p = graph.index_of(producer).ok_or_else(|| {
                CompileError::Internal(format!("unwired input '{}' on '{}'", producer, node.id))
            })?;
            consumers[p].push(i);
            pending[i] += 1;
        }
    }

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut results: Vec<Option<Arc<Content>>> = vec![None; n];
    let mut status: Vec<NodeStatus> = vec![NodeStatus::Waiting; n];
    let mut failed: Vec<StepFailureReport> = Vec::new();
    let mut fatal: Option<CompileError> = None;
    let mut join_set: JoinSet<(usize, f64, Result<StepOutput, StepError>)> = JoinSet::new();

    for i in 0..n {
        if pending[i] == 0 {
            status[i] = NodeStatus::Running;
            emit(&ctx, CompileEvent::StepStarted {
                step: graph.nodes[i].id.clone(),
            });
            spawn_node(i, graph, &results, &ctx, &semaphore, &mut join_set);
        }
    }

    while let Some(joined) = join_set.join_next().await {
        let (i, elapsed, outcome) = match joined {
            Ok(v) => v,
            Err(e) => {
                fatal.get_or_insert(CompileError::Internal(format!("worker task failed: {}", e)));
                continue;
            }
        };
        let id = graph.nodes[i].id.clone();

        match outcome {
            Ok(StepOutput::Content(content)) => {
                status[i] = NodeStatus::Succeeded;
                emit(&ctx, CompileEvent::StepFinished {
                    step: id.clone(),
                    duration_seconds: elapsed,
                });

                let dependents = graph.nodes[i].dependents;
                content.bind(&id, dependents.max(1));
                let content = Arc::new(content);
                if dependents == 0 {
                    // Disposal path: a terminal output is consumed exactly
                    // once, right here.
                    if let Err(e) = content.finish_usage() {
                        fatal.get_or_insert(CompileError::Usage {
                            step: id.clone(),
                            source: e,
                        });
                    }
                }
                results[i] = Some(content);

                if fatal.is_none() {
                    for &c in &consumers[i] {
                        pending[c] -= 1;
                        if pending[c] == 0 && status[c] == NodeStatus::Waiting {
                            status[c] = NodeStatus::Running;
                            emit(&ctx, CompileEvent::StepStarted {
                                step: graph.nodes[c].id.clone(),
                            });
                            spawn_node(c, graph, &results, &ctx, &semaphore, &mut join_set);
                        }
                    }
                }
            }
            Ok(StepOutput::Stop) => {
                // Completed without an output; the rest of this chain is
                // never scheduled, and that is not a failure.
                status[i] = NodeStatus::Stopped;
                emit(&ctx, CompileEvent::StepStopped { step: id });
            }
            Err(StepError::Usage(u)) => {
                status[i] = NodeStatus::Failed;
                fatal.get_or_insert(CompileError::Usage { step: id, source: u });
            }
            Err(error) => {
                status[i] = NodeStatus::Failed;
                emit(&ctx, CompileEvent::StepFailed {
                    step: id.clone(),
                    error: error.to_string(),
                });
                failed.push(StepFailureReport { step_id: id, error });
            }
        }
    }

    if let Some(f) = fatal {
        return Err(f);
    }

    let mut succeeded = Vec::new();
    let mut stopped = Vec::new();
    let mut starved = Vec::new();
    for (i, node) in graph.nodes.iter().enumerate() {
        match status[i] {
            NodeStatus::Succeeded => succeeded.push(node.id.clone()),
            NodeStatus::Stopped => stopped.push(node.id.clone()),
            NodeStatus::Waiting => starved.push(node.id.clone()),
            NodeStatus::Running | NodeStatus::Failed => {}
        }
    }

    Ok(CompileReport {
        succeeded,
        stopped,
        starved,
        failed,
        total_duration: started.elapsed(),
    })
}

/// Spawn one ready node. Every producer has already published its result,
/// so the input map is resolved here and moved into the task.
fn spawn_node(
    i: usize,
    graph: &StepGraph,
    results: &[Option<Arc<Content>>],
    ctx: &Arc<CompileCtx>,
    semaphore: &Arc<Semaphore>,
    join_set: &mut JoinSet<(usize, f64, Result<StepOutput, StepError>)>,
) {
    let node = &graph.nodes[i];
    let mut inputs: IndexMap<String, Arc<Content>> = IndexMap::new();
    for (name, producer) in &node.inputs {
        if let Some(content) = graph.index_of(producer).and_then(|p| results[p].clone()) {
            inputs.insert(name.clone(), content);
        }
    }

    let id = node.id.clone();
    let layer = node.layer.clone();
    let transform = Arc::clone(&node.transform);
    let ctx = Arc::clone(ctx);
    let semaphore = Arc::clone(semaphore);

    join_set.spawn(async move {
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return (
                    i,
                    0.0,
                    Err(StepError::Invalid("worker pool closed".to_string())),
                )
            }
        };
        let started = Instant::now();
        let step = StepContext::new(&id, &layer, &ctx, &inputs);
        let result = transform.run(&step).await;
        let elapsed = started.elapsed().as_secs_f64();

        // The engine, not the transform, settles every consumed input
        // exactly once, success or failure. A settle error outranks the
        // transform's own result: it means the graph's budgets are wrong.
        for content in inputs.values() {
            if let Err(e) = content.finish_usage() {
                return (i, elapsed, Err(StepError::Usage(e)));
            }
        }

        (i, elapsed, result)
    });
}

fn emit(ctx: &CompileCtx, event: CompileEvent) {
    if let Some(log) = &ctx.events {
        if let Err(e) = log.append(event) {
            eprintln!("warning: event log: {}", e);
        }
    }
}
