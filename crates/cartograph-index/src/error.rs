use cartograph_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Repository walk failed: {0}")]
    Walk(String),

    #[error("Parser setup failed: {0}")]
    Parser(String),

    #[error("Invalid facts: {0}")]
    Facts(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Fact production task failed: {0}")]
    Task(String),

    #[error("Ingestion previously failed and is not retried: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
