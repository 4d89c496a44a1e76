//! The graph question tool exposed to the orchestrating agent.

use std::sync::Arc;
use std::time::Duration;

use cartograph_core::config::ToolSettings;
use cartograph_graph::{GraphStore, Record};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::translator::QueryTranslator;

/// `query_used` when no query was produced.
pub const NO_QUERY: &str = "N/A";

pub const QUERY_TOOL_NAME: &str = "query_codebase_knowledge_graph";
pub const ANALYZE_TOOL_NAME: &str = "analyze_document";

/// Result of one graph question. Always produced, whatever failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub query_used: String,
    pub results: Vec<Record>,
    pub summary: String,
}

impl GraphData {
    fn translation_failure(error: impl std::fmt::Display) -> Self {
        Self {
            query_used: NO_QUERY.to_string(),
            results: Vec::new(),
            summary: format!(
                "I couldn't translate your request into a database query. Error: {error}"
            ),
        }
    }

    fn execution_failure(query: String, error: impl std::fmt::Display) -> Self {
        Self {
            query_used: query,
            results: Vec::new(),
            summary: format!("There was an error querying the database: {error}"),
        }
    }
}

pub struct QueryTool {
    translator: Arc<dyn QueryTranslator>,
    store: Arc<dyn GraphStore>,
    translate_timeout: Duration,
    execute_timeout: Duration,
}

impl QueryTool {
    pub fn new(
        translator: Arc<dyn QueryTranslator>,
        store: Arc<dyn GraphStore>,
        settings: &ToolSettings,
    ) -> Self {
        Self {
            translator,
            store,
            translate_timeout: Duration::from_secs(settings.translate_timeout_secs),
            execute_timeout: Duration::from_secs(settings.execute_timeout_secs),
        }
    }

    pub fn with_timeouts(mut self, translate: Duration, execute: Duration) -> Self {
        self.translate_timeout = translate;
        self.execute_timeout = execute;
        self
    }

    /// Translate `question`, run the query and report the outcome.
    pub async fn answer(&self, question: &str) -> GraphData {
        tracing::info!(question, "Received graph question");

        let translated =
            tokio::time::timeout(self.translate_timeout, self.translator.translate(question)).await;
        let query = match translated {
            Ok(Ok(query)) => query,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Query translation failed");
                return GraphData::translation_failure(e);
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.translate_timeout.as_secs_f64(), "Query translation timed out");
                return GraphData::translation_failure(format!(
                    "translation timed out after {:?}",
                    self.translate_timeout
                ));
            }
        };

        let executed = tokio::time::timeout(self.execute_timeout, self.store.fetch_all(&query)).await;
        match executed {
            Ok(Ok(results)) => {
                let summary = format!(
                    "Successfully retrieved {} item(s) from the graph.",
                    results.len()
                );
                tracing::info!(query = %query, rows = results.len(), "Graph query complete");
                GraphData {
                    query_used: query,
                    results,
                    summary,
                }
            }
            Ok(Err(e)) => {
                tracing::error!(query = %query, error = %e, "Graph query failed");
                GraphData::execution_failure(query, e)
            }
            Err(_) => {
                tracing::error!(query = %query, "Graph query timed out");
                let reason = format!("query timed out after {:?}", self.execute_timeout);
                GraphData::execution_failure(query, reason)
            }
        }
    }
}

/// Tool descriptor consumed by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: QUERY_TOOL_NAME,
            description: "Query the codebase knowledge graph using natural language questions. \
                Ask in plain English about classes, functions, methods, dependencies, or code \
                structure, e.g. 'Find all functions that call each other' or 'What classes are \
                in the user module'. Never pass a database query.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "natural_language_query": {
                        "type": "string",
                        "description": "The question about the codebase, in plain English."
                    }
                },
                "required": ["natural_language_query"]
            }),
        },
        ToolSpec {
            name: ANALYZE_TOOL_NAME,
            description: "Analyzes a document (such as a PDF, an image or a text file) to answer \
                a question about its content. Use for non-source-code files.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the document, relative to the project root or absolute."
                    },
                    "question": {
                        "type": "string",
                        "description": "The question to answer from the document."
                    }
                },
                "required": ["file_path", "question"]
            }),
        },
    ]
}
