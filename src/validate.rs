//! Validator: document-level structural and semantic checks (spec §4.4).
//!
//! Runs before compilation. Problems are collected rather than
//! short-circuited, so a single call reports every issue found — mirroring
//! the batch-style validation other crates in the pack (and
//! `weavegraph::graphs::builder`) perform before accepting a graph.

use std::collections::{HashSet, VecDeque};

use rustc_hash::FxHashSet;

use crate::condition;
use crate::document::{Edge, SimpleEdge, WorkflowDocument};
use crate::errors::{ValidationError, ValidationErrors};
use crate::reference::{self, Root};
use crate::types::{is_reserved_node_id, is_valid_node_id_syntax};

/// Run every check from spec §4.4 against `doc`, given the set of kinds that
/// have a registered executor. Returns every problem found, not just the first.
#[tracing::instrument(skip(doc, known_kinds))]
pub fn validate(doc: &WorkflowDocument, known_kinds: &HashSet<&str>) -> Result<(), ValidationErrors> {
    let mut errs = Vec::new();

    if doc.id.trim().is_empty() {
        errs.push(ValidationError::MissingField("id"));
    }
    if doc.output.schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        errs.push(ValidationError::OutputSchemaNotObject);
    }

    let mut declared_ids: FxHashSet<String> = FxHashSet::default();
    for node in &doc.nodes {
        if !is_valid_node_id_syntax(&node.id) {
            errs.push(ValidationError::InvalidNodeId(node.id.clone()));
        }
        if is_reserved_node_id(&node.id) {
            errs.push(ValidationError::ReservedNodeId(node.id.clone()));
        }
        if !declared_ids.insert(node.id.clone()) {
            errs.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
        if !known_kinds.contains(node.kind.as_str()) {
            errs.push(ValidationError::UnregisteredKind(node.kind.clone()));
        }
    }

    let flattened: Vec<SimpleEdge> = doc.edges.iter().cloned().flat_map(Edge::flatten).collect();

    let mut valid_endpoints: FxHashSet<&str> = declared_ids.iter().map(String::as_str).collect();
    valid_endpoints.insert("start");
    valid_endpoints.insert("end");

    let routers: FxHashSet<&str> = doc
        .nodes
        .iter()
        .filter(|n| n.is_router())
        .map(|n| n.id.as_str())
        .collect();

    for edge in &flattened {
        if !valid_endpoints.contains(edge.from.as_str()) {
            errs.push(ValidationError::UnknownEdgeEndpoint(edge.from.clone()));
        }
        if !valid_endpoints.contains(edge.to.as_str()) {
            errs.push(ValidationError::UnknownEdgeEndpoint(edge.to.clone()));
        }
        if let Some(label) = &edge.when_label {
            if !routers.contains(edge.from.as_str()) {
                errs.push(ValidationError::ConditionalEdgeNotRouter {
                    from: edge.from.clone(),
                    label: label.clone(),
                });
            } else if let Some(router) = doc.nodes.iter().find(|n| n.id == edge.from) {
                let allowed = router.cases.contains_key(label) || router.default.as_deref() == Some(label.as_str());
                if !allowed {
                    errs.push(ValidationError::UnknownCaseLabel {
                        router: router.id.clone(),
                        label: label.clone(),
                    });
                }
            }
        }
    }

    for router_id in &routers {
        let missing_label = flattened
            .iter()
            .any(|e| e.from == *router_id && e.when_label.is_none());
        if missing_label {
            errs.push(ValidationError::RouterEdgeMissingWhenLabel((*router_id).to_string()));
        }
    }

    if !flattened.iter().any(|e| e.from == "start") {
        errs.push(ValidationError::NoStartEdge);
    }

    if !reaches_end(&flattened) {
        errs.push(ValidationError::NoPathToEnd);
    }

    check_mapping_references(&doc.output.input_mapping, "output.input_mapping", &declared_ids, &mut errs);
    for node in &doc.nodes {
        let context = format!("nodes.{}.input_mapping", node.id);
        check_mapping_references(&node.input_mapping, &context, &declared_ids, &mut errs);

        if node.is_router() {
            for (label, cond) in &node.cases {
                match condition::parse_condition(cond) {
                    Ok(_) => {
                        for reference_text in reference::scan_references(cond) {
                            check_one_reference(reference_text, &declared_ids, &mut errs);
                        }
                    }
                    Err(e) => errs.push(ValidationError::ForbiddenConditionSyntax {
                        label: label.clone(),
                        detail: e.to_string(),
                    }),
                }
            }
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errs))
    }
}

fn check_mapping_references(
    mapping: &indexmap::IndexMap<String, serde_json::Value>,
    context: &str,
    declared_ids: &FxHashSet<String>,
    errs: &mut Vec<ValidationError>,
) {
    for value in mapping.values() {
        let serde_json::Value::String(s) = value else { continue };
        if !reference::looks_like_reference(s) {
            continue;
        }
        match reference::parse(s) {
            Ok(r) => {
                if let Root::Node(id) = r.root {
                    if !declared_ids.contains(&id) {
                        errs.push(ValidationError::UnknownNodeReference(context.to_string(), id));
                    }
                }
            }
            Err(e) => errs.push(ValidationError::BadReferenceSyntax(s.clone(), e.to_string())),
        }
    }
}

fn check_one_reference(raw: &str, declared_ids: &FxHashSet<String>, errs: &mut Vec<ValidationError>) {
    match reference::parse(raw) {
        Ok(r) => {
            if let Root::Node(id) = r.root {
                if !declared_ids.contains(&id) {
                    errs.push(ValidationError::UnknownNodeReference("router condition".to_string(), id));
                }
            }
        }
        Err(e) => errs.push(ValidationError::BadReferenceSyntax(raw.to_string(), e.to_string())),
    }
}

/// BFS from `start` over the flattened edge list; `true` if `end` is reachable.
fn reaches_end(edges: &[SimpleEdge]) -> bool {
    let mut queue: VecDeque<String> = VecDeque::from(["start".to_string()]);
    let mut seen: FxHashSet<String> = FxHashSet::default();
    seen.insert("start".to_string());
    while let Some(node) = queue.pop_front() {
        if node == "end" {
            return true;
        }
        for edge in edges.iter().filter(|e| e.from == node) {
            if seen.insert(edge.to.clone()) {
                queue.push_back(edge.to.clone());
            }
        }
    }
    false
}
