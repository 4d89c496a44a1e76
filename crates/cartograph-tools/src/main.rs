//! CLI entry point for the Cartograph code graph tools.
//!
//! Every command prints one JSON document to stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use cartograph_core::CartographConfig;
use cartograph_graph::availability::{is_reachable, REACHABILITY_PROBE_TIMEOUT};
use cartograph_graph::{GraphClient, GraphConfig, GraphStore};
use cartograph_tools::schema::SCHEMA_VERSION;
use cartograph_tools::service::{self, CodeGraphService};
use cartograph_tools::{tool_specs, ChatClient, DocumentAnalyzer};

#[derive(Parser)]
#[command(name = "cartograph")]
#[command(about = "Query a codebase knowledge graph in plain English")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: cartograph).
    #[arg(short, long, default_value = "cartograph", global = true)]
    config: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question about the indexed repository.
    Ask {
        question: String,
        /// Repository to index if the graph is empty.
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Ask a question about one document.
    Analyze { file: String, question: String },
    /// Index a repository into an empty graph store.
    Index {
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Report graph store reachability and size.
    Status,
    /// Print the tool descriptors for an orchestrator.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let mut config = CartographConfig::load_or_default(&cli.config);

    match cli.command {
        Command::Ask { question, repo } => {
            if repo.is_some() {
                config.index.repo_path = repo;
            }
            let service = CodeGraphService::warm_up(&config).await?;
            let data = service.answer(&question).await;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::Analyze { file, question } => {
            let generator = Arc::new(ChatClient::new(&config.llm)?);
            let root = config.analyzer_root();
            let analyzer = DocumentAnalyzer::new(
                &root,
                config.scratch_dir(&root),
                &config.analyzer,
                generator,
            )?;
            let answer = analyzer.analyze(&file, &question).await;
            let result = json!({ "file_path": file, "question": question, "answer": answer });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Index { repo } => {
            let repo = repo.unwrap_or_else(|| config.repo_path());
            let outcome = service::index_repository(&config, &repo).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Status => {
            let status = status(&config).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_specs())?);
        }
    }

    Ok(())
}

/// Probe without bootstrapping or indexing anything.
async fn status(config: &CartographConfig) -> serde_json::Value {
    let store = &config.store;
    let reachable = is_reachable(&store.host, store.port, REACHABILITY_PROBE_TIMEOUT).await;

    let mut nodes = None;
    let mut error = None;
    if reachable {
        let graph_config = GraphConfig::from(store);
        match GraphClient::connect_with_retry(&graph_config, 1, Duration::ZERO).await {
            Ok(client) => match client.count_nodes().await {
                Ok(count) => nodes = Some(count),
                Err(e) => error = Some(e.to_string()),
            },
            Err(e) => error = Some(e.to_string()),
        }
    }

    json!({
        "host": store.host,
        "port": store.port,
        "reachable": reachable,
        "nodes": nodes,
        "indexed": nodes.is_some_and(|n| n > 0),
        "error": error,
        "schema_version": SCHEMA_VERSION,
        "checked_at": chrono::Utc::now().to_rfc3339(),
    })
}
