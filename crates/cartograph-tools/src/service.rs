//! Process warm-up: store availability, connection, one-time indexing.

use std::path::Path;
use std::sync::Arc;

use cartograph_core::CartographConfig;
use cartograph_graph::{ensure_available, Availability, Bootstrap, GraphClient, GraphConfig, GraphStore};
use cartograph_index::{FactProducer, GraphIngestor, IndexOutcome, IndexState, RepositoryFactProducer};

use crate::error::Result;
use crate::llm::{ChatClient, TextGenerator};
use crate::tool::{GraphData, QueryTool};
use crate::translator::Translator;

/// A query tool over an indexed graph.
pub struct CodeGraphService {
    ingestor: GraphIngestor,
    query_tool: QueryTool,
    outcome: IndexOutcome,
}

impl CodeGraphService {
    /// Wait for the store, connect, index the repository if the store is
    /// empty and build the query tool.
    pub async fn warm_up(config: &CartographConfig) -> Result<Self> {
        let store = connect_store(config).await?;
        let generator: Arc<dyn TextGenerator> = Arc::new(ChatClient::new(&config.llm)?);
        let producer = Arc::new(RepositoryFactProducer::new(&config.index.ignore_file));
        Self::from_parts(config, store, generator, producer).await
    }

    /// Warm up over an already connected store.
    pub async fn from_parts(
        config: &CartographConfig,
        store: Arc<dyn GraphStore>,
        generator: Arc<dyn TextGenerator>,
        producer: Arc<dyn FactProducer>,
    ) -> Result<Self> {
        let ingestor = GraphIngestor::new(Arc::clone(&store), producer);
        let outcome = ingestor.ensure_indexed(&config.repo_path()).await?;
        let translator = Arc::new(Translator::new(generator));
        let query_tool = QueryTool::new(translator, store, &config.tool);
        Ok(Self {
            ingestor,
            query_tool,
            outcome,
        })
    }

    pub async fn answer(&self, question: &str) -> GraphData {
        self.query_tool.answer(question).await
    }

    pub fn index_state(&self) -> IndexState {
        self.ingestor.state()
    }

    /// What warm-up did to the store.
    pub fn index_outcome(&self) -> &IndexOutcome {
        &self.outcome
    }
}

/// Best-effort availability wait, then a connection with handshake retry.
pub async fn connect_store(config: &CartographConfig) -> Result<Arc<dyn GraphStore>> {
    let settings = &config.store;
    let bootstrap = settings
        .compose_file
        .as_ref()
        .map(|file| Bootstrap::new(file, &settings.bootstrap_program));
    let availability = ensure_available(&settings.host, settings.port, bootstrap.as_ref()).await;
    if availability == Availability::Unreachable {
        tracing::warn!(host = %settings.host, port = settings.port, "Connecting to an unreachable graph store");
    }

    let client = GraphClient::connect(&GraphConfig::from(settings)).await?;
    tracing::info!(host = %settings.host, port = settings.port, "Connected to graph store");
    Ok(Arc::new(client))
}

/// Index `repo_path` into the configured store once.
pub async fn index_repository(config: &CartographConfig, repo_path: &Path) -> Result<IndexOutcome> {
    let store = connect_store(config).await?;
    let producer = Arc::new(RepositoryFactProducer::new(&config.index.ignore_file));
    Ok(GraphIngestor::new(store, producer).ensure_indexed(repo_path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cartograph_graph::MemoryGraphStore;

    use crate::error::LlmError;
    use crate::llm::Attachment;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _system: &str, _prompt: &str) -> std::result::Result<String, LlmError> {
            Ok(self.0.to_string())
        }

        async fn generate_with_attachment(
            &self,
            _system: &str,
            _prompt: &str,
            _attachment: &Attachment,
        ) -> std::result::Result<String, LlmError> {
            Err(LlmError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn test_warm_up_indexes_and_answers() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("src")).unwrap();
        std::fs::write(repo.path().join("src/main.py"), "def main():\n    pass\n").unwrap();
        std::fs::write(repo.path().join("README.md"), "# demo\n").unwrap();

        let mut config = CartographConfig::default();
        config.index.repo_path = Some(repo.path().to_path_buf());
        let store = Arc::new(MemoryGraphStore::new());
        let generator = Arc::new(FixedGenerator(
            "```cypher\nMATCH (f:File) WHERE f.extension = '.py' RETURN f.path AS path, f.name AS name, labels(f) AS type\n```",
        ));

        let service = CodeGraphService::from_parts(
            &config,
            store.clone(),
            generator,
            Arc::new(RepositoryFactProducer::default()),
        )
        .await
        .unwrap();
        assert!(matches!(service.index_outcome(), IndexOutcome::Ingested(_)));
        assert!(matches!(service.index_state(), IndexState::Indexed { .. }));

        let data = service.answer("Find all python files").await;
        assert_eq!(data.summary, "Successfully retrieved 1 item(s) from the graph.");
        assert_eq!(data.results[0]["path"], "src/main.py");
        assert_eq!(data.results[0]["type"], serde_json::json!(["File"]));
    }
}
