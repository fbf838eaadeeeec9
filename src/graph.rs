//! Compiled graph representation (spec §4.5, §9).
//!
//! A tagged node record plus adjacency lists keyed by node id, the way
//! `weavegraph::graph` keeps `FxHashMap<NodeKind, ...>` registries instead of
//! a pointer graph. Edge pruning during execution is tracked by per-node
//! predecessor counters (see `crate::engine`), not by mutating this graph.

use rustc_hash::FxHashMap;

use crate::document::NodeDef;

/// `start` and `end` are synthesized; everything else carries its document definition.
#[derive(Debug, Clone)]
pub enum CompiledNodeKind {
    Start,
    End,
    Declared(NodeDef),
}

#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: String,
    pub kind: CompiledNodeKind,
}

impl CompiledNode {
    #[must_use]
    pub fn is_router(&self) -> bool {
        matches!(&self.kind, CompiledNodeKind::Declared(n) if n.is_router())
    }
}

/// A normalized edge: every `BranchEdge` has already been flattened (spec §3.3).
#[derive(Debug, Clone)]
pub struct CompiledEdge {
    pub from: String,
    pub to: String,
    pub when_label: Option<String>,
}

/// The schedulable DAG: nodes plus adjacency in both directions.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub nodes: FxHashMap<String, CompiledNode>,
    pub edges: Vec<CompiledEdge>,
    /// node id -> indices into `edges` of edges leaving that node.
    pub outgoing: FxHashMap<String, Vec<usize>>,
    /// node id -> indices into `edges` of edges entering that node.
    pub incoming: FxHashMap<String, Vec<usize>>,
    /// Declaration order of user-defined nodes (excludes start/end), kept so
    /// iteration order matches the document for deterministic diagnostics.
    pub declared_order: Vec<String>,
}

impl CompiledGraph {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn outgoing_edges(&self, id: &str) -> impl Iterator<Item = &CompiledEdge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    #[must_use]
    pub fn incoming_edges(&self, id: &str) -> impl Iterator<Item = &CompiledEdge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.edges[i])
    }

    #[must_use]
    pub fn predecessor_count(&self, id: &str) -> usize {
        self.incoming.get(id).map_or(0, Vec::len)
    }
}
