//! Best-effort wait for the graph store to accept connections.
//!
//! A TCP probe decides reachability. When the store is down and a compose
//! descriptor is configured, the store is started with
//! `<program> compose -f <descriptor> up -d` and polled for a bounded
//! window. Nothing here fails: callers get an [`Availability`] and later
//! operations surface their own connection errors.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::client::GraphError;

pub const AVAILABILITY_POLL_ATTEMPTS: u32 = 60;
pub const AVAILABILITY_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const REACHABILITY_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Reachable on the first probe.
    Reachable,
    /// Became reachable after bootstrapping.
    Started,
    Unreachable,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        !matches!(self, Availability::Unreachable)
    }
}

/// How to start the store when it is not running.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub compose_file: PathBuf,
    pub program: String,
}

impl Bootstrap {
    pub fn new(compose_file: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            compose_file: compose_file.into(),
            program: program.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: AVAILABILITY_POLL_ATTEMPTS,
            interval: AVAILABILITY_POLL_INTERVAL,
            probe_timeout: REACHABILITY_PROBE_TIMEOUT,
        }
    }
}

/// Whether a TCP connection to `host:port` opens within `timeout`.
pub async fn is_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Wait for the store with the default poll bounds.
pub async fn ensure_available(host: &str, port: u16, bootstrap: Option<&Bootstrap>) -> Availability {
    ensure_available_with(host, port, bootstrap, &PollPolicy::default()).await
}

pub async fn ensure_available_with(
    host: &str,
    port: u16,
    bootstrap: Option<&Bootstrap>,
    policy: &PollPolicy,
) -> Availability {
    if is_reachable(host, port, policy.probe_timeout).await {
        tracing::debug!(host, port, "Graph store reachable");
        return Availability::Reachable;
    }

    let Some(bootstrap) = bootstrap else {
        tracing::warn!(host, port, "Graph store unreachable and no bootstrap descriptor configured");
        return Availability::Unreachable;
    };
    if !bootstrap.compose_file.is_file() {
        tracing::warn!(
            descriptor = %bootstrap.compose_file.display(),
            "Graph store unreachable and bootstrap descriptor not found"
        );
        return Availability::Unreachable;
    }

    tracing::info!(
        host,
        port,
        descriptor = %bootstrap.compose_file.display(),
        "Graph store unreachable, starting it"
    );
    if let Err(e) = run_bootstrap(bootstrap).await {
        tracing::error!(error = %e, "Failed to start graph store");
        return Availability::Unreachable;
    }

    for attempt in 1..=policy.attempts {
        if is_reachable(host, port, policy.probe_timeout).await {
            tracing::info!(host, port, attempt, "Graph store is up");
            return Availability::Started;
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::error!(
        host,
        port,
        attempts = policy.attempts,
        "Graph store did not become reachable, continuing without it"
    );
    Availability::Unreachable
}

async fn run_bootstrap(bootstrap: &Bootstrap) -> Result<(), GraphError> {
    let output = Command::new(&bootstrap.program)
        .arg("compose")
        .arg("-f")
        .arg(&bootstrap.compose_file)
        .args(["up", "-d"])
        .output()
        .await
        .map_err(|e| GraphError::Connection(format!("could not run {}: {e}", bootstrap.program)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GraphError::Connection(format!(
            "{} compose exited with {}: {}",
            bootstrap.program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}
