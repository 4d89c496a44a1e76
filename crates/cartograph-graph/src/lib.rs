//! Cartograph Graph — store client for the codebase knowledge graph.
//!
//! This crate is the single access point for the graph store. All reads and
//! writes flow through the [`GraphStore`] seam, whether backed by a Bolt
//! connection ([`GraphClient`]) or the in-process [`MemoryGraphStore`].
//! It also owns the grammar that generated queries must satisfy.

pub mod availability;
pub mod client;
pub mod cypher;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use availability::{ensure_available, Availability, Bootstrap};
pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraphStore;
pub use store::{GraphStore, Record, WriteSummary, COUNT_ALL_QUERY};
