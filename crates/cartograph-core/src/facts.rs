//! A complete snapshot of repository facts, ready for bulk ingestion.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CartographError;
use crate::types::{Edge, EdgeType, Node, NodeKey};

/// Nodes and edges produced for one repository snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FactBatch {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl FactBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.iter().any(|n| &n.key() == key)
    }

    /// Check the batch against the schema invariants before it is written.
    pub fn validate(&self) -> Result<(), CartographError> {
        let mut keys = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let key = node.key();
            if key.value.is_empty() {
                return Err(CartographError::InvalidFacts(format!(
                    "{} node with empty {}",
                    key.label,
                    key.property()
                )));
            }
            if !keys.insert(key.clone()) {
                return Err(CartographError::InvalidFacts(format!("duplicate node {key}")));
            }
        }

        let mut method_owner: HashMap<&NodeKey, &NodeKey> = HashMap::new();
        let mut seen_edges = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !keys.contains(endpoint) {
                    return Err(CartographError::InvalidFacts(format!(
                        "{} edge references unknown node {endpoint}",
                        edge.edge_type
                    )));
                }
            }
            if !edge.edge_type.permits(edge.source.label, edge.target.label) {
                return Err(CartographError::InvalidFacts(format!(
                    "{} not allowed from {} to {}",
                    edge.edge_type, edge.source.label, edge.target.label
                )));
            }
            if edge.edge_type == EdgeType::DefinesMethod {
                if let Some(owner) = method_owner.insert(&edge.target, &edge.source) {
                    if owner != &edge.source {
                        return Err(CartographError::InvalidFacts(format!(
                            "method {} owned by both {owner} and {}",
                            edge.target, edge.source
                        )));
                    }
                }
            }
            if !seen_edges.insert(edge) {
                return Err(CartographError::InvalidFacts(format!(
                    "duplicate edge {} -[{}]-> {}",
                    edge.source, edge.edge_type, edge.target
                )));
            }
        }

        Ok(())
    }
}
