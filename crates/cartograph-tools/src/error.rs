use cartograph_graph::GraphError;
use cartograph_index::IndexError;
use thiserror::Error;

/// Failures talking to the language-model provider.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no completion")]
    EmptyResponse,
}

/// Failures while bringing the service up.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Indexing error: {0}")]
    Index(#[from] IndexError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, ToolError>;
