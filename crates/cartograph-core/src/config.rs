//! Configuration management for Cartograph services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`CARTOGRAPH__` prefix, `__` between sections)
//! 2. Config file (`cartograph.toml`, or any format the `config` crate reads)
//! 3. Defaults

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CartographError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartographConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub analyzer: AnalyzerSettings,
    #[serde(default)]
    pub tool: ToolSettings,
}

/// Connection to the Bolt graph store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Compose descriptor used to start the store when it is unreachable.
    #[serde(default)]
    pub compose_file: Option<PathBuf>,
    #[serde(default = "default_bootstrap_program")]
    pub bootstrap_program: String,
}

/// Repository ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    /// Repository to index (default: current directory).
    #[serde(default)]
    pub repo_path: Option<PathBuf>,
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,
}

/// OpenAI-compatible generation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

/// Which provider class the document analyzer talks to.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerMode {
    /// Text-only provider; non-text documents are refused, content truncated.
    #[default]
    Text,
    /// Provider accepting binary attachments (PDFs, images).
    Multimodal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerSettings {
    /// Sandbox root for relative paths (default: the repository path).
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// Scratch directory for copied absolute paths (default: `<root>/.tmp`).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub mode: AnalyzerMode,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Largest file sent as an attachment in multimodal mode.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

/// Timeouts applied at the query tool boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_translate_timeout")]
    pub translate_timeout_secs: u64,
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    7687
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_bootstrap_program() -> String {
    "docker".to_string()
}

fn default_ignore_file() -> String {
    ".cartographignore".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    512
}

fn default_max_chars() -> usize {
    20_000
}

fn default_max_attachment_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_translate_timeout() -> u64 {
    120
}

fn default_execute_timeout() -> u64 {
    60
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
            compose_file: None,
            bootstrap_program: default_bootstrap_program(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            repo_path: None,
            ignore_file: default_ignore_file(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            project_root: None,
            scratch_dir: None,
            mode: AnalyzerMode::default(),
            max_chars: default_max_chars(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            translate_timeout_secs: default_translate_timeout(),
            execute_timeout_secs: default_execute_timeout(),
        }
    }
}

impl CartographConfig {
    /// Load configuration from `<file_prefix>.{toml,json,yaml,...}` and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, CartographError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("CARTOGRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize::<CartographConfig>()?)
    }

    /// Like [`load`](Self::load), but falls back to defaults on any error.
    pub fn load_or_default(file_prefix: &str) -> Self {
        match Self::load(file_prefix) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    /// The repository to index, defaulting to the working directory.
    pub fn repo_path(&self) -> PathBuf {
        self.index
            .repo_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Sandbox root for the document analyzer.
    pub fn analyzer_root(&self) -> PathBuf {
        self.analyzer
            .project_root
            .clone()
            .unwrap_or_else(|| self.repo_path())
    }

    /// Scratch directory for copied external documents.
    pub fn scratch_dir(&self, root: &Path) -> PathBuf {
        self.analyzer
            .scratch_dir
            .clone()
            .unwrap_or_else(|| root.join(".tmp"))
    }
}
