//! Cartograph Tools — the agent-facing surface of the code graph.
//!
//! - [`QueryTool`] answers natural-language questions with graph rows and
//!   never fails past its boundary.
//! - [`Translator`] turns a question into one validated query.
//! - [`DocumentAnalyzer`] answers questions about one file inside a sandbox.
//! - [`CodeGraphService`] runs the warm-up sequence for a process.

pub mod analyzer;
pub mod error;
pub mod llm;
pub mod schema;
pub mod service;
pub mod tool;
pub mod translator;

pub use analyzer::DocumentAnalyzer;
pub use error::{LlmError, Result, ToolError};
pub use llm::{Attachment, ChatClient, TextGenerator};
pub use service::CodeGraphService;
pub use tool::{tool_specs, GraphData, QueryTool, ToolSpec};
pub use translator::{QueryTranslator, TranslationError, Translator};
