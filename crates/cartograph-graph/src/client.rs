//! Bolt connection management and shared graph client.

use std::time::Duration;

use cartograph_core::config::StoreSettings;
use neo4rs::{query, ConfigBuilder, Graph, Query};

use crate::cypher::GrammarViolation;

/// Handshake attempts made by [`GraphClient::connect`] before giving up.
pub const HANDSHAKE_ATTEMPTS: u32 = 10;

/// Pause between failed handshakes.
pub const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Graph store connection error: {0}")]
    Connection(String),

    #[error("Graph query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Query rejected: {0}")]
    Rejected(#[from] GrammarViolation),

    #[error("Unsupported by the in-memory store: {0}")]
    Unsupported(String),

    #[error("Invalid facts: {0}")]
    InvalidFacts(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration for connecting to the graph store.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl GraphConfig {
    pub fn uri(&self) -> String {
        format!("bolt://{}:{}", self.host, self.port)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&StoreSettings::default())
    }
}

impl From<&StoreSettings> for GraphConfig {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

/// Thread-safe Bolt graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect, retrying the handshake up to [`HANDSHAKE_ATTEMPTS`] times.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        Self::connect_with_retry(config, HANDSHAKE_ATTEMPTS, HANDSHAKE_RETRY_DELAY).await
    }

    pub async fn connect_with_retry(
        config: &GraphConfig,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, GraphError> {
        let mut last_error = GraphError::Connection("no connection attempt made".to_string());
        for attempt in 1..=attempts.max(1) {
            match Self::try_connect(config).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    tracing::warn!(
                        uri = %config.uri(),
                        attempt,
                        attempts,
                        error = %e,
                        "Graph store handshake failed, retrying"
                    );
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error)
    }

    async fn try_connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        // The pool connects lazily; force one round trip to surface handshake errors.
        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri(), "Connected to graph store");
        Ok(Self { graph })
    }

    /// Execute a statement without collecting results.
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<neo4rs::Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_from_settings() {
        let settings = StoreSettings {
            host: "memgraph".to_string(),
            port: 7688,
            ..Default::default()
        };
        let config = GraphConfig::from(&settings);
        assert_eq!(config.uri(), "bolt://memgraph:7688");
        assert_eq!(config.max_connections, 16);
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_bounded_attempts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = GraphConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let result =
            GraphClient::connect_with_retry(&config, 3, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(GraphError::Connection(_))));
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
