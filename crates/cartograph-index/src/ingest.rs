//! One-time population of the graph store.
//!
//! [`GraphIngestor::ensure_indexed`] holds a mutex over the ingestion state
//! for the whole probe-then-ingest sequence, so concurrent first callers
//! wait for one ingestion instead of racing into two.

use std::path::Path;
use std::sync::Arc;

use cartograph_graph::{GraphStore, WriteSummary};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{IndexError, Result};
use crate::producer::FactProducer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexState {
    Unindexed,
    /// An ingestion is running, or a previous one was interrupted.
    Indexing,
    Indexed { nodes: i64 },
    /// Ingestion failed; the store may be partially written and is not retried.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The store already held a graph.
    AlreadyIndexed { nodes: i64 },
    Ingested(WriteSummary),
}

pub struct GraphIngestor {
    store: Arc<dyn GraphStore>,
    producer: Arc<dyn FactProducer>,
    state: Mutex<IndexState>,
}

impl GraphIngestor {
    pub fn new(store: Arc<dyn GraphStore>, producer: Arc<dyn FactProducer>) -> Self {
        Self {
            store,
            producer,
            state: Mutex::new(IndexState::Unindexed),
        }
    }

    /// Current state without waiting on a running ingestion.
    pub fn state(&self) -> IndexState {
        match self.state.try_lock() {
            Ok(state) => state.clone(),
            Err(_) => IndexState::Indexing,
        }
    }

    /// Make sure the store holds a graph for `repo_path`.
    ///
    /// Probe failures leave the state untouched so a later call can retry
    /// once the store is up. Ingestion failures are fatal.
    pub async fn ensure_indexed(&self, repo_path: &Path) -> Result<IndexOutcome> {
        let mut state = self.state.lock().await;
        match &*state {
            IndexState::Indexed { nodes } => {
                return Ok(IndexOutcome::AlreadyIndexed { nodes: *nodes });
            }
            IndexState::Failed { reason } => return Err(IndexError::Failed(reason.clone())),
            IndexState::Unindexed | IndexState::Indexing => {}
        }

        let count = self.store.count_nodes().await?;
        if count > 0 {
            tracing::info!(nodes = count, "Graph already indexed, skipping ingestion");
            *state = IndexState::Indexed { nodes: count };
            return Ok(IndexOutcome::AlreadyIndexed { nodes: count });
        }

        *state = IndexState::Indexing;
        tracing::info!(repo = %repo_path.display(), "Graph is empty, indexing repository");
        match self.ingest(repo_path).await {
            Ok(summary) => {
                tracing::info!(
                    nodes = summary.nodes_written,
                    edges = summary.edges_written,
                    "Graph indexing complete"
                );
                *state = IndexState::Indexed {
                    nodes: summary.nodes_written as i64,
                };
                Ok(IndexOutcome::Ingested(summary))
            }
            Err(e) => {
                tracing::error!(error = %e, "Graph ingestion failed");
                *state = IndexState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn ingest(&self, repo_path: &Path) -> Result<WriteSummary> {
        let producer = Arc::clone(&self.producer);
        let path = repo_path.to_path_buf();
        let batch = tokio::task::spawn_blocking(move || producer.produce(&path))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))??;

        batch
            .validate()
            .map_err(|e| IndexError::Facts(e.to_string()))?;
        Ok(self.store.write_facts(&batch).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cartograph_core::types::{File, Project};
    use cartograph_core::{Edge, EdgeType, FactBatch, Node, NodeKey, NodeLabel};
    use cartograph_graph::{GraphError, MemoryGraphStore, Record};

    use crate::producer::RepositoryFactProducer;

    /// Emits a fixed batch and counts invocations.
    struct StaticProducer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticProducer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FactProducer for StaticProducer {
        fn produce(&self, _repo_path: &Path) -> Result<FactBatch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            if self.fail {
                return Err(IndexError::Walk("disk on fire".to_string()));
            }
            let mut batch = FactBatch::new();
            batch.push_node(Node::Project(Project {
                name: "demo".into(),
            }));
            batch.push_node(Node::File(File {
                path: "main.py".into(),
                name: "main.py".into(),
                extension: ".py".into(),
            }));
            batch.push_edge(Edge::new(
                NodeKey::new(NodeLabel::Project, "demo"),
                EdgeType::ContainsFile,
                NodeKey::new(NodeLabel::File, "main.py"),
            ));
            Ok(batch)
        }
    }

    /// A store that is not up yet.
    struct DownStore;

    #[async_trait]
    impl GraphStore for DownStore {
        async fn fetch_all(&self, _query: &str) -> std::result::Result<Vec<Record>, GraphError> {
            Err(GraphError::Connection("connection refused".to_string()))
        }

        async fn write_facts(
            &self,
            _batch: &FactBatch,
        ) -> std::result::Result<WriteSummary, GraphError> {
            Err(GraphError::Connection("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_second_call_does_not_reingest() {
        let store = Arc::new(MemoryGraphStore::new());
        let producer = StaticProducer::new(false);
        let ingestor = GraphIngestor::new(store.clone(), producer.clone());

        let first = ingestor.ensure_indexed(Path::new(".")).await.unwrap();
        assert_eq!(
            first,
            IndexOutcome::Ingested(WriteSummary {
                nodes_written: 2,
                edges_written: 1
            })
        );
        let (nodes, edges) = (store.node_count().await, store.edge_count().await);

        let second = ingestor.ensure_indexed(Path::new(".")).await.unwrap();
        assert_eq!(second, IndexOutcome::AlreadyIndexed { nodes: 2 });
        assert_eq!(store.node_count().await, nodes);
        assert_eq!(store.edge_count().await, edges);
        assert_eq!(producer.calls(), 1);
        assert_eq!(ingestor.state(), IndexState::Indexed { nodes: 2 });
    }

    #[tokio::test]
    async fn test_populated_store_is_detected_by_probe() {
        let store = Arc::new(MemoryGraphStore::new());
        let seed = StaticProducer::new(false);
        store
            .write_facts(&seed.produce(Path::new(".")).unwrap())
            .await
            .unwrap();

        let producer = StaticProducer::new(false);
        let ingestor = GraphIngestor::new(store, producer.clone());
        let outcome = ingestor.ensure_indexed(Path::new(".")).await.unwrap();
        assert_eq!(outcome, IndexOutcome::AlreadyIndexed { nodes: 2 });
        assert_eq!(producer.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_ingest_once() {
        let store = Arc::new(MemoryGraphStore::new());
        let producer = StaticProducer::new(false);
        let ingestor = Arc::new(GraphIngestor::new(store.clone(), producer.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let ingestor = Arc::clone(&ingestor);
                tokio::spawn(async move { ingestor.ensure_indexed(Path::new(".")).await })
            })
            .collect();
        let mut ingested = 0;
        for task in tasks {
            if let IndexOutcome::Ingested(_) = task.await.unwrap().unwrap() {
                ingested += 1;
            }
        }
        assert_eq!(ingested, 1);
        assert_eq!(producer.calls(), 1);
        assert_eq!(store.node_count().await, 2);
    }

    #[tokio::test]
    async fn test_ingestion_failure_is_not_retried() {
        let store = Arc::new(MemoryGraphStore::new());
        let producer = StaticProducer::new(true);
        let ingestor = GraphIngestor::new(store.clone(), producer.clone());

        let err = ingestor.ensure_indexed(Path::new(".")).await.unwrap_err();
        assert!(matches!(err, IndexError::Walk(_)));
        assert!(matches!(ingestor.state(), IndexState::Failed { .. }));

        let err = ingestor.ensure_indexed(Path::new(".")).await.unwrap_err();
        assert!(matches!(err, IndexError::Failed(_)));
        assert_eq!(producer.calls(), 1);
        assert_eq!(store.node_count().await, 0);
    }

    #[tokio::test]
    async fn test_probe_failure_can_be_retried() {
        let producer = StaticProducer::new(false);
        let ingestor = GraphIngestor::new(Arc::new(DownStore), producer.clone());

        let err = ingestor.ensure_indexed(Path::new(".")).await.unwrap_err();
        assert!(matches!(err, IndexError::Graph(GraphError::Connection(_))));
        assert_eq!(ingestor.state(), IndexState::Unindexed);
        assert_eq!(producer.calls(), 0);
    }

    #[tokio::test]
    async fn test_repository_ingestion_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/__init__.py"), "").unwrap();
        std::fs::write(
            dir.path().join("pkg/core.py"),
            "def a():\n    b()\n\ndef b():\n    pass\n",
        )
        .unwrap();

        let store = Arc::new(MemoryGraphStore::new());
        let producer = Arc::new(RepositoryFactProducer::default());

        GraphIngestor::new(store.clone(), producer.clone())
            .ensure_indexed(dir.path())
            .await
            .unwrap();
        let once = (store.node_count().await, store.edge_count().await);

        // a fresh process-level ingestor against the same store
        let outcome = GraphIngestor::new(store.clone(), producer)
            .ensure_indexed(dir.path())
            .await
            .unwrap();
        assert!(matches!(outcome, IndexOutcome::AlreadyIndexed { .. }));
        assert_eq!((store.node_count().await, store.edge_count().await), once);
        assert!(once.0 > 0 && once.1 > 0);
    }
}
