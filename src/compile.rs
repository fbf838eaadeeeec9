//! Graph compiler: validated document → schedulable DAG (spec §4.5).

use std::collections::HashSet;

use rustc_hash::FxHashMap;

use crate::document::{Edge, WorkflowDocument};
use crate::errors::CompileError;
use crate::graph::{CompiledEdge, CompiledGraph, CompiledNode, CompiledNodeKind};
use crate::validate;

/// Validate `doc`, then compile it into a [`CompiledGraph`].
///
/// Nodes: the declared nodes plus synthetic `start`/`end` (spec §4.5).
/// Edges: the document's edges, with every `BranchEdge` flattened into its
/// constituent `SimpleEdge`s, declaration order preserved.
#[tracing::instrument(skip(doc, known_kinds), fields(workflow_id = %doc.id), err)]
pub fn compile(doc: &WorkflowDocument, known_kinds: &HashSet<&str>) -> Result<CompiledGraph, CompileError> {
    validate::validate(doc, known_kinds)?;

    let mut nodes: FxHashMap<String, CompiledNode> = FxHashMap::default();
    nodes.insert("start".to_string(), CompiledNode { id: "start".to_string(), kind: CompiledNodeKind::Start });
    nodes.insert("end".to_string(), CompiledNode { id: "end".to_string(), kind: CompiledNodeKind::End });
    let mut declared_order = Vec::with_capacity(doc.nodes.len());
    for node in &doc.nodes {
        declared_order.push(node.id.clone());
        nodes.insert(node.id.clone(), CompiledNode { id: node.id.clone(), kind: CompiledNodeKind::Declared(node.clone()) });
    }

    let edges: Vec<CompiledEdge> = doc
        .edges
        .iter()
        .cloned()
        .flat_map(Edge::flatten)
        .map(|e| CompiledEdge { from: e.from, to: e.to, when_label: e.when_label })
        .collect();

    let mut outgoing: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    let mut incoming: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from.clone()).or_default().push(i);
        incoming.entry(edge.to.clone()).or_default().push(i);
    }

    let graph = CompiledGraph { nodes, edges, outgoing, incoming, declared_order };
    reject_cycles(&graph)?;
    Ok(graph)
}

/// Kahn's algorithm: if topological sort cannot consume every node, a cycle
/// exists (spec §4.5: "the compiler rejects cycles").
fn reject_cycles(graph: &CompiledGraph) -> Result<(), CompileError> {
    let mut indegree: FxHashMap<&str, usize> = graph.nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for edge in &graph.edges {
        *indegree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut queue: Vec<&str> = indegree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
    queue.sort_unstable();
    let mut visited = 0usize;
    let mut queue: std::collections::VecDeque<&str> = queue.into();

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for edge in graph.outgoing_edges(id) {
            let d = indegree.get_mut(edge.to.as_str()).expect("edge target is a known node");
            *d -= 1;
            if *d == 0 {
                queue.push_back(&edge.to);
            }
        }
    }

    if visited == graph.nodes.len() {
        Ok(())
    } else {
        let stuck = indegree
            .iter()
            .find(|(_, &d)| d > 0)
            .map(|(&id, _)| id.to_string())
            .unwrap_or_default();
        Err(CompileError::Cycle(stuck))
    }
}
