//! The graph store seam.

use async_trait::async_trait;
use cartograph_core::FactBatch;
use serde::Serialize;

use crate::client::{GraphClient, GraphError};

/// One result row: column alias to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Probe used to decide whether the store already holds a graph.
pub const COUNT_ALL_QUERY: &str = "MATCH (n) RETURN count(n) AS count";

/// What a bulk write produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub nodes_written: usize,
    pub edges_written: usize,
}

/// Read and write access to the code graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a read query and collect every row.
    async fn fetch_all(&self, query: &str) -> Result<Vec<Record>, GraphError>;

    /// Write a validated batch. All-or-nothing.
    async fn write_facts(&self, batch: &FactBatch) -> Result<WriteSummary, GraphError>;

    /// Total node count, via [`COUNT_ALL_QUERY`].
    async fn count_nodes(&self) -> Result<i64, GraphError> {
        let rows = self.fetch_all(COUNT_ALL_QUERY).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn fetch_all(&self, query: &str) -> Result<Vec<Record>, GraphError> {
        self.fetch_records(query).await
    }

    async fn write_facts(&self, batch: &FactBatch) -> Result<WriteSummary, GraphError> {
        self.write_batch(batch).await
    }
}
