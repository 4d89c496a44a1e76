//! Question answering over a single document.
//!
//! Relative paths are confined to the project root. Absolute paths are
//! copied into the scratch directory under a random name and read from
//! there. [`DocumentAnalyzer::analyze`] never fails; every problem comes
//! back as a sentence.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use cartograph_core::config::{AnalyzerMode, AnalyzerSettings};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::error::LlmError;
use crate::llm::{Attachment, TextGenerator};

const SYSTEM_PROMPT: &str = "You analyze documents.";

/// Extensions read as text even when their MIME type is not `text/*`.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rst", "py", "json", "toml", "yaml", "yml", "ini", "cfg", "csv",
];

#[derive(Error, Debug)]
enum AnalyzeError {
    #[error("file not found")]
    NotFound,

    #[error("outside of project root")]
    OutsideRoot,

    #[error("document type needs a multimodal provider")]
    NeedsMultimodal,

    #[error("document is {size} bytes, above the {limit} byte attachment limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Llm(#[from] LlmError),
}

pub struct DocumentAnalyzer {
    root: PathBuf,
    scratch_dir: PathBuf,
    mode: AnalyzerMode,
    max_chars: usize,
    max_attachment_bytes: u64,
    generator: Arc<dyn TextGenerator>,
}

impl DocumentAnalyzer {
    /// `project_root` must exist; it is canonicalized once here.
    pub fn new(
        project_root: &Path,
        scratch_dir: PathBuf,
        settings: &AnalyzerSettings,
        generator: Arc<dyn TextGenerator>,
    ) -> std::io::Result<Self> {
        let root = project_root.canonicalize()?;
        tracing::info!(root = %root.display(), mode = ?settings.mode, "Document analyzer initialized");
        Ok(Self {
            root,
            scratch_dir,
            mode: settings.mode,
            max_chars: settings.max_chars,
            max_attachment_bytes: settings.max_attachment_bytes,
            generator,
        })
    }

    pub async fn analyze(&self, file_path: &str, question: &str) -> String {
        tracing::info!(file_path, question, "Analyzing document");
        match self.try_analyze(file_path, question).await {
            Ok(answer) => {
                tracing::info!(file_path, "Document analysis complete");
                answer
            }
            Err(AnalyzeError::NotFound) => format!("Error: File not found at '{file_path}'."),
            Err(AnalyzeError::OutsideRoot) => {
                let message = format!(
                    "Security risk: Attempted to access file outside of project root: {file_path}"
                );
                tracing::error!(file_path, "Rejected document path outside of project root");
                format!("Error: {message}")
            }
            Err(AnalyzeError::NeedsMultimodal) => "Error: This document type requires a \
                multimodal provider. Please use a text file or set analyzer.mode to multimodal."
                .to_string(),
            Err(e @ AnalyzeError::TooLarge { .. }) => {
                tracing::warn!(file_path, error = %e, "Document refused");
                format!("Error: The document is too large to analyze ({e}).")
            }
            Err(e) => {
                tracing::error!(file_path, error = %e, "Document analysis failed");
                format!("An error occurred during analysis: {e}")
            }
        }
    }

    async fn try_analyze(&self, file_path: &str, question: &str) -> Result<String, AnalyzeError> {
        let path = self.resolve(file_path).await?;
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        match self.mode {
            AnalyzerMode::Multimodal => {
                let size = tokio::fs::metadata(&path).await?.len();
                if size > self.max_attachment_bytes {
                    return Err(AnalyzeError::TooLarge {
                        size,
                        limit: self.max_attachment_bytes,
                    });
                }
                let bytes = tokio::fs::read(&path).await?;
                let prompt = format!(
                    "Based on the document provided, please answer the following question: {question}"
                );
                let attachment = Attachment { mime_type, bytes };
                Ok(self
                    .generator
                    .generate_with_attachment(SYSTEM_PROMPT, &prompt, &attachment)
                    .await?)
            }
            AnalyzerMode::Text => {
                if !is_text_like(&path, &mime_type) {
                    return Err(AnalyzeError::NeedsMultimodal);
                }
                // a char is at most four UTF-8 bytes
                let limit = self.max_chars.saturating_mul(4) as u64;
                let bytes = read_prefix(&path, limit).await?;
                let content = String::from_utf8_lossy(&bytes);
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let prompt = format!(
                    "You are given a document and a question. Answer the question using the \
                     document content.\n\nQuestion: {question}\n\nDocument ({name}):\n{}",
                    truncate_chars(&content, self.max_chars)
                );
                Ok(self.generator.generate(SYSTEM_PROMPT, &prompt).await?)
            }
        }
    }

    /// The file to read for `file_path`.
    async fn resolve(&self, file_path: &str) -> Result<PathBuf, AnalyzeError> {
        let requested = Path::new(file_path);
        if requested.is_absolute() {
            return self.copy_to_scratch(requested).await;
        }

        if escapes_lexically(requested) {
            return Err(AnalyzeError::OutsideRoot);
        }
        let full = match tokio::fs::canonicalize(self.root.join(requested)).await {
            Ok(p) => p,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AnalyzeError::NotFound),
            Err(e) => return Err(e.into()),
        };
        // symlinks may still point elsewhere
        if !full.starts_with(&self.root) {
            return Err(AnalyzeError::OutsideRoot);
        }
        if !full.is_file() {
            return Err(AnalyzeError::NotFound);
        }
        Ok(full)
    }

    async fn copy_to_scratch(&self, source: &Path) -> Result<PathBuf, AnalyzeError> {
        if !tokio::fs::metadata(source).await.is_ok_and(|m| m.is_file()) {
            return Err(AnalyzeError::NotFound);
        }
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let copy = self.scratch_dir.join(format!("{}-{name}", Uuid::new_v4()));
        tokio::fs::copy(source, &copy).await?;
        tracing::info!(source = %source.display(), copy = %copy.display(), "Copied external document");
        Ok(copy)
    }
}

/// The first `limit` bytes of the file at `path`.
async fn read_prefix(path: &Path, limit: u64) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut bytes = Vec::new();
    file.take(limit).read_to_end(&mut bytes).await?;
    Ok(bytes)
}

/// Whether `..` components climb above the starting directory.
fn escapes_lexically(path: &Path) -> bool {
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return true,
            },
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

fn is_text_like(path: &Path, mime_type: &str) -> bool {
    mime_type.starts_with("text/")
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// At most `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
