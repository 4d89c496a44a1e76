//! Write operations for the code graph.
//!
//! Every node is MERGEd on its label's key property, and every edge is
//! MERGEd between two already-present endpoints, so re-writing the same
//! batch leaves the graph unchanged. A batch is written in one transaction,
//! as one `UNWIND` statement per label or edge shape and chunk.

use std::collections::BTreeMap;

use cartograph_core::{Edge, EdgeType, FactBatch, Node, NodeLabel, PropertyValue};
use neo4rs::{query, BoltList, BoltMap, BoltString, BoltType, Query, Txn};

use crate::client::{GraphClient, GraphError};
use crate::store::WriteSummary;

/// Rows bound to a single `UNWIND` statement.
pub const WRITE_CHUNK_ROWS: usize = 1000;

impl GraphClient {
    /// Create one uniqueness constraint and one lookup index per label on
    /// its key property.
    ///
    /// Stores that already hold them (or do not support the syntax) report
    /// an error, which is only logged.
    pub async fn ensure_constraints(&self) {
        for label in NodeLabel::ALL {
            for cypher in [constraint_cypher(label), index_cypher(label)] {
                if let Err(e) = self.run(query(&cypher)).await {
                    tracing::debug!(%label, error = %e, cypher, "Schema statement not applied");
                }
            }
        }
    }

    /// Write a full fact batch in one transaction.
    pub async fn write_batch(&self, batch: &FactBatch) -> Result<WriteSummary, GraphError> {
        batch
            .validate()
            .map_err(|e| GraphError::InvalidFacts(e.to_string()))?;

        self.ensure_constraints().await;

        let mut txn = self.start_txn().await?;
        match write_in_txn(&mut txn, batch).await {
            Ok(summary) => {
                txn.commit().await?;
                tracing::info!(
                    nodes = summary.nodes_written,
                    edges = summary.edges_written,
                    "Fact batch committed"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn write_in_txn(txn: &mut Txn, batch: &FactBatch) -> Result<WriteSummary, GraphError> {
    let mut summary = WriteSummary::default();
    for (label, nodes) in nodes_by_label(&batch.nodes) {
        let cypher = node_merge_cypher(label, nodes[0]);
        for chunk in nodes.chunks(WRITE_CHUNK_ROWS) {
            let rows: Vec<BoltType> = chunk.iter().map(|node| node_row(node)).collect();
            txn.run(rows_query(&cypher, rows)).await?;
            summary.nodes_written += chunk.len();
        }
    }
    for (shape, edges) in edges_by_shape(&batch.edges) {
        let cypher = edge_merge_cypher(shape);
        for chunk in edges.chunks(WRITE_CHUNK_ROWS) {
            let rows: Vec<BoltType> = chunk.iter().map(|edge| edge_row(edge)).collect();
            txn.run(rows_query(&cypher, rows)).await?;
            summary.edges_written += chunk.len();
        }
    }
    Ok(summary)
}

/// Source label, edge type and target label shared by one edge statement.
type EdgeShape = (NodeLabel, EdgeType, NodeLabel);

fn nodes_by_label(nodes: &[Node]) -> BTreeMap<NodeLabel, Vec<&Node>> {
    let mut groups: BTreeMap<NodeLabel, Vec<&Node>> = BTreeMap::new();
    for node in nodes {
        groups.entry(node.label()).or_default().push(node);
    }
    groups
}

fn edges_by_shape(edges: &[Edge]) -> BTreeMap<EdgeShape, Vec<&Edge>> {
    let mut groups: BTreeMap<EdgeShape, Vec<&Edge>> = BTreeMap::new();
    for edge in edges {
        let shape = (edge.source.label, edge.edge_type, edge.target.label);
        groups.entry(shape).or_default().push(edge);
    }
    groups
}

fn constraint_cypher(label: NodeLabel) -> String {
    format!(
        "CREATE CONSTRAINT ON (n:{label}) ASSERT n.{} IS UNIQUE",
        label.key_property()
    )
}

fn index_cypher(label: NodeLabel) -> String {
    format!("CREATE INDEX ON :{label}({})", label.key_property())
}

/// MERGE each row on the key property, then SET every other property.
/// `sample` supplies the property names shared by every node of `label`.
fn node_merge_cypher(label: NodeLabel, sample: &Node) -> String {
    let mut cypher = format!(
        "UNWIND $rows AS row MERGE (n:{label} {{{}: row.key}})",
        label.key_property()
    );
    let assignments: Vec<String> = sample
        .properties()
        .iter()
        .skip(1)
        .map(|(name, _)| format!("n.{name} = row.{name}"))
        .collect();
    if !assignments.is_empty() {
        cypher.push_str(" SET ");
        cypher.push_str(&assignments.join(", "));
    }
    cypher
}

fn edge_merge_cypher((source, edge_type, target): EdgeShape) -> String {
    format!(
        "UNWIND $rows AS row MATCH (a:{source} {{{}: row.source}}), (b:{target} {{{}: row.target}}) \
         MERGE (a)-[:{edge_type}]->(b)",
        source.key_property(),
        target.key_property(),
    )
}

fn node_row(node: &Node) -> BoltType {
    let mut row = BoltMap::new();
    row.put(BoltString::from("key"), BoltType::from(node.key_value().to_string()));
    for (name, value) in node.properties().into_iter().skip(1) {
        let value = match value {
            PropertyValue::Text(s) => BoltType::from(s),
            PropertyValue::List(items) => BoltType::from(items),
        };
        row.put(BoltString::from(name), value);
    }
    BoltType::Map(row)
}

fn edge_row(edge: &Edge) -> BoltType {
    let mut row = BoltMap::new();
    row.put(BoltString::from("source"), BoltType::from(edge.source.value.clone()));
    row.put(BoltString::from("target"), BoltType::from(edge.target.value.clone()));
    BoltType::Map(row)
}

fn rows_query(cypher: &str, rows: Vec<BoltType>) -> Query {
    let mut list = BoltList::new();
    for row in rows {
        list.push(row);
    }
    query(cypher).param("rows", BoltType::List(list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_core::types::{File, Function, Project};
    use cartograph_core::NodeKey;

    #[test]
    fn test_constraint_uses_key_property() {
        assert_eq!(
            constraint_cypher(NodeLabel::File),
            "CREATE CONSTRAINT ON (n:File) ASSERT n.path IS UNIQUE"
        );
        assert_eq!(
            constraint_cypher(NodeLabel::Method),
            "CREATE CONSTRAINT ON (n:Method) ASSERT n.qualified_name IS UNIQUE"
        );
    }

    #[test]
    fn test_node_merge_sets_non_key_properties() {
        let node = Node::File(File {
            path: "src/main.py".into(),
            name: "main.py".into(),
            extension: ".py".into(),
        });
        assert_eq!(
            node_merge_cypher(NodeLabel::File, &node),
            "UNWIND $rows AS row MERGE (n:File {path: row.key}) \
             SET n.name = row.name, n.extension = row.extension"
        );
    }

    #[test]
    fn test_key_only_node_has_no_set() {
        let node = Node::Project(Project {
            name: "demo".into(),
        });
        assert_eq!(
            node_merge_cypher(NodeLabel::Project, &node),
            "UNWIND $rows AS row MERGE (n:Project {name: row.key})"
        );
    }

    #[test]
    fn test_function_decorators_are_assigned() {
        let node = Node::Function(Function {
            qualified_name: "demo.app.run".into(),
            name: "run".into(),
            decorators: ["task".to_string()].into_iter().collect(),
        });
        assert!(node_merge_cypher(NodeLabel::Function, &node).contains("n.decorators = row.decorators"));
    }

    #[test]
    fn test_index_uses_key_property() {
        assert_eq!(index_cypher(NodeLabel::Folder), "CREATE INDEX ON :Folder(path)");
        assert_eq!(
            index_cypher(NodeLabel::ExternalPackage),
            "CREATE INDEX ON :ExternalPackage(name)"
        );
    }

    #[test]
    fn test_edge_merge_matches_both_endpoints() {
        assert_eq!(
            edge_merge_cypher((NodeLabel::Folder, EdgeType::ContainsFile, NodeLabel::File)),
            "UNWIND $rows AS row MATCH (a:Folder {path: row.source}), (b:File {path: row.target}) \
             MERGE (a)-[:CONTAINS_FILE]->(b)"
        );
    }

    #[test]
    fn test_writes_are_grouped_per_label_and_shape() {
        let folder = |path: &str| NodeKey::new(NodeLabel::Folder, path);
        let file = |path: &str| NodeKey::new(NodeLabel::File, path);
        let nodes = vec![
            Node::File(File {
                path: "a.py".into(),
                name: "a.py".into(),
                extension: ".py".into(),
            }),
            Node::Project(Project {
                name: "demo".into(),
            }),
            Node::File(File {
                path: "b.py".into(),
                name: "b.py".into(),
                extension: ".py".into(),
            }),
        ];
        let groups = nodes_by_label(&nodes);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&NodeLabel::File].len(), 2);

        let edges = vec![
            Edge::new(folder("src"), EdgeType::ContainsFile, file("src/a.py")),
            Edge::new(folder("src"), EdgeType::ContainsFolder, folder("src/pkg")),
            Edge::new(folder("lib"), EdgeType::ContainsFile, file("lib/b.py")),
        ];
        let shapes = edges_by_shape(&edges);
        assert_eq!(shapes.len(), 2);
        assert_eq!(
            shapes[&(NodeLabel::Folder, EdgeType::ContainsFile, NodeLabel::File)].len(),
            2
        );
    }
}
