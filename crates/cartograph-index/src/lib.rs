//! Cartograph Index — turns a repository into graph facts and loads them.
//!
//! The [`RepositoryFactProducer`] walks a source tree and emits a
//! [`FactBatch`](cartograph_core::FactBatch). The [`GraphIngestor`] writes
//! that batch into a [`GraphStore`](cartograph_graph::GraphStore) once per
//! process, behind a single-writer gate.

pub mod error;
pub mod ingest;
pub mod manifest;
pub mod producer;
pub mod python;
pub mod walker;

pub use error::{IndexError, Result};
pub use ingest::{GraphIngestor, IndexOutcome, IndexState};
pub use producer::{FactProducer, RepositoryFactProducer};
