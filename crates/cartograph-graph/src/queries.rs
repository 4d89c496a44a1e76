//! Read operations against the live store.

use std::fmt::Display;

use neo4rs::query;
use serde_json::Value;

use crate::client::{GraphClient, GraphError};
use crate::cypher;
use crate::store::Record;

impl GraphClient {
    /// Validate a read query, run it and convert every row to a [`Record`]
    /// whose columns follow the RETURN aliases.
    pub async fn fetch_records(&self, text: &str) -> Result<Vec<Record>, GraphError> {
        let validated = cypher::validate(text)?;
        let rows = self.query_rows(query(&validated.text)).await?;
        rows.iter()
            .map(|row| project_columns(&validated.aliases, |column| row.get::<Value>(column)))
            .collect()
    }

    /// Count all relationships in the graph.
    pub async fn count_edges(&self) -> Result<i64, GraphError> {
        let row = self
            .query_one(query("MATCH ()-[r]->() RETURN count(r) AS count"))
            .await?;
        match row {
            Some(r) => Ok(r.get::<i64>("count").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

/// Build a record by reading `columns` in order.
fn project_columns<E: Display>(
    columns: &[String],
    mut get: impl FnMut(&str) -> Result<Value, E>,
) -> Result<Record, GraphError> {
    columns
        .iter()
        .map(|column| {
            get(column)
                .map(|value| (column.clone(), value))
                .map_err(|e| GraphError::Serialization(format!("column {column}: {e}")))
        })
        .collect()
}
