//! CP-003: Step graph construction.
//!
//! Expands layer declarations into a step graph: one node per descriptor,
//! an implicit edge from each step to its predecessor within a layer
//! (replaced, not supplemented, by an explicit `in` reference), one edge per
//! additional named dependency, and a computed dependent count per node that
//! becomes its output's use budget. Cycles are rejected with Kahn's
//! algorithm, so the scheduler can never deadlock. Construction is
//! deterministic and the graph is frozen once built.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;

use super::error::ConfigError;
use super::step::Transform;
use super::types::{CapasConfig, Layer, StepDecl, ID_SEPARATOR, PRIMARY_INPUT};

/// One schedulable node of the step graph.
pub struct StepNode {
    /// Globally unique id, `layer.kind` (with `_N` when the kind repeats
    /// within the layer)
    pub id: String,

    /// Owning layer name
    pub layer: String,

    /// Kind tag
    pub kind: String,

    /// Resolved input map: input name -> producer step id
    pub inputs: IndexMap<String, String>,

    /// Number of input references to this node across the graph; its
    /// output's use budget (minimum 1)
    pub dependents: u32,

    /// The transform to run
    pub transform: Arc<dyn Transform>,
}

/// The frozen step graph.
pub struct StepGraph {
    pub nodes: Vec<StepNode>,
    index: HashMap<String, usize>,
    order: Vec<String>,
}

impl StepGraph {
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&StepNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A valid topological order with declaration-order tie-breaking.
    pub fn execution_order(&self) -> &[String] {
        &self.order
    }
}

/// Compute the id of step `index` within `layer`: `layer.kind`, suffixed
/// with `_N` (1-based among same-kind steps) when the kind occurs more than
/// once in the layer.
pub fn step_id(layer: &Layer, index: usize) -> String {
    let kind = &layer.steps[index].kind;
    let occurrences = layer.steps.iter().filter(|s| &s.kind == kind).count();
    if occurrences == 1 {
        format!("{}{}{}", layer.name, ID_SEPARATOR, kind)
    } else {
        let nth = layer.steps[..=index]
            .iter()
            .filter(|s| &s.kind == kind)
            .count();
        format!("{}{}{}_{}", layer.name, ID_SEPARATOR, kind, nth)
    }
}

/// Resolve a dependency reference: absolute if it contains the separator,
/// otherwise the last step id of the named layer.
fn resolve_reference(
    referrer: &str,
    reference: &str,
    layers: &[Layer],
) -> Result<String, ConfigError> {
    if reference.contains(ID_SEPARATOR) {
        return Ok(reference.to_string());
    }
    let layer = layers
        .iter()
        .find(|l| l.name == reference)
        .ok_or_else(|| ConfigError::UnknownLayer {
            step: referrer.to_string(),
            layer: reference.to_string(),
        })?;
    if layer.steps.is_empty() {
        return Err(ConfigError::EmptyLayer(layer.name.clone()));
    }
    Ok(step_id(layer, layer.steps.len() - 1))
}

/// Build the step graph using the static step registry.
pub fn build_graph(config: &CapasConfig) -> Result<StepGraph, ConfigError> {
    build_graph_with(config, crate::steps::build_transform)
}

/// Build the step graph with a custom transform factory (tests inject
/// counting/failing transforms through this).
pub fn build_graph_with<F>(config: &CapasConfig, factory: F) -> Result<StepGraph, ConfigError>
where
    F: Fn(&str, &StepDecl) -> Result<Box<dyn Transform>, ConfigError>,
{
    // Pass 1: instantiate nodes in declaration order, rejecting duplicates.
    let mut nodes: Vec<StepNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for layer in &config.layers {
        for (i, decl) in layer.steps.iter().enumerate() {
            let id = step_id(layer, i);
            if index.contains_key(&id) {
                return Err(ConfigError::DuplicateStepId(id));
            }
            let transform: Arc<dyn Transform> = Arc::from(factory(&layer.name, decl)?);
            index.insert(id.clone(), nodes.len());
            nodes.push(StepNode {
                id,
                layer: layer.name.clone(),
                kind: decl.kind.clone(),
                inputs: IndexMap::new(),
                dependents: 0,
                transform,
            });
        }
    }

    // Pass 2: wire edges. The implicit chain edge only exists when the step
    // declares no `in` of its own.
    let mut cursor = 0;
    for layer in &config.layers {
        for (i, decl) in layer.steps.iter().enumerate() {
            let node_id = nodes[cursor].id.clone();
            let mut inputs: IndexMap<String, String> = IndexMap::new();

            match &decl.depends_on.input {
                Some(reference) => {
                    let resolved = resolve_reference(&node_id, reference, &config.layers)?;
                    inputs.insert(PRIMARY_INPUT.to_string(), resolved);
                }
                None if i > 0 => {
                    inputs.insert(PRIMARY_INPUT.to_string(), step_id(layer, i - 1));
                }
                None => {}
            }

            for (name, reference) in &decl.depends_on.named {
                let resolved = resolve_reference(&node_id, reference, &config.layers)?;
                inputs.insert(name.clone(), resolved);
            }

            for producer in inputs.values() {
                if !index.contains_key(producer) {
                    return Err(ConfigError::UnresolvedReference {
                        step: node_id.clone(),
                        reference: producer.clone(),
                    });
                }
            }

            nodes[cursor].inputs = inputs;
            cursor += 1;
        }
    }

    // Pass 3: dependent counts, one per input reference.
    for i in 0..nodes.len() {
        let producers: Vec<usize> = nodes[i].inputs.values().map(|p| index[p]).collect();
        for p in producers {
            nodes[p].dependents += 1;
        }
    }

    let order = topo_order(&nodes, &index)?;

    Ok(StepGraph {
        nodes,
        index,
        order,
    })
}

/// Kahn's algorithm over the wired edges. Declaration-order tie-breaking
/// keeps the order deterministic; leftover nodes mean a cycle.
fn topo_order(nodes: &[StepNode], index: &HashMap<String, usize>) -> Result<Vec<String>, ConfigError> {
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.inputs.len()).collect();
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for producer in node.inputs.values() {
            consumers[index[producer]].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = queue.pop_front() {
        order.push(nodes[i].id.clone());
        for &c in &consumers[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                queue.push_back(c);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.id.as_str())
            .collect();
        return Err(ConfigError::Cycle(stuck.join(", ")));
    }

    Ok(order)
}
